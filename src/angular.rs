//! Generated AngularJS modules: the `$templateCache` bundle and the
//! per-environment constants module.

use std::fmt::Write;

use serde_json::{Map, Value};

/// URL under which a partial is registered in `$templateCache`.
pub fn template_url(module: &str, relative: &str) -> String {
    format!("/{}/{}", module, relative.trim_start_matches('/'))
}

/// Wraps one HTML partial into a script registering it in the
/// `$templateCache` of `module`. The module is created when missing, so the
/// bundle can be loaded before or after the application module.
pub fn template_module(module: &str, url: &str, html: &str) -> String {
    let module = escape(module);
    let url = escape(url);

    let mut out = String::new();
    let _ = write!(
        out,
        "(function(module) {{\n\
         try {{\n  module = angular.module('{module}');\n\
         }} catch (e) {{\n  module = angular.module('{module}', []);\n}}\n\
         module.run(['$templateCache', function($templateCache) {{\n  \
         $templateCache.put('{url}',\n"
    );

    for line in html.split_inclusive('\n') {
        let (text, newline) = match line.strip_suffix('\n') {
            Some(text) => (text, "\\n"),
            None => (line, ""),
        };
        let _ = writeln!(out, "    '{}{}' +", escape(text), newline);
    }

    out.push_str("    '');\n}]);\n})();\n");
    out
}

/// Renders the constants module for a JSON settings object, one `.constant`
/// per top-level key in file order.
pub fn constants_module(module: &str, constants: &Map<String, Value>) -> String {
    let mut out = format!("angular.module('{}', [])\n\n", escape(module));

    for (key, value) in constants {
        let _ = writeln!(out, ".constant('{}', {})\n", escape(key), value);
    }

    out.push_str(";\n");
    out
}

/// Escapes text for a single-quoted JavaScript string literal.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(ch),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_url() {
        assert_eq!(template_url("app", "users/list.html"), "/app/users/list.html");
    }

    #[test]
    fn test_template_module() {
        let js = template_module("app", "/app/a.html", "<p>It's</p>\n<b>\\</b>");

        assert_eq!(
            js,
            "(function(module) {\n\
             try {\n  module = angular.module('app');\n\
             } catch (e) {\n  module = angular.module('app', []);\n}\n\
             module.run(['$templateCache', function($templateCache) {\n  \
             $templateCache.put('/app/a.html',\n\
             \x20   '<p>It\\'s</p>\\n' +\n\
             \x20   '<b>\\\\</b>' +\n\
             \x20   '');\n}]);\n})();\n"
        );
    }

    #[test]
    fn test_constants_module() {
        let constants: Map<String, Value> =
            serde_json::from_str(r#"{"apiUrl": "http://x", "flags": {"b": 1, "a": [true]}}"#)
                .unwrap();

        assert_eq!(
            constants_module("app.config", &constants),
            "angular.module('app.config', [])\n\n\
             .constant('apiUrl', \"http://x\")\n\n\
             .constant('flags', {\"b\":1,\"a\":[true]})\n\n\
             ;\n"
        );
    }

    #[test]
    fn test_empty_constants() {
        assert_eq!(
            constants_module("app.config", &Map::new()),
            "angular.module('app.config', [])\n\n;\n"
        );
    }
}
