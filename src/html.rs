//! Small HTML rewrites: minification and snippet embedding.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Which reductions [`minify_html`] applies.
#[derive(Debug, Clone, Copy)]
pub struct HtmlMinOptions {
    pub remove_comments: bool,
    pub collapse_whitespace: bool,
    pub collapse_boolean_attributes: bool,
    pub remove_redundant_attributes: bool,
}

impl Default for HtmlMinOptions {
    fn default() -> Self {
        Self {
            remove_comments: true,
            collapse_whitespace: true,
            collapse_boolean_attributes: true,
            remove_redundant_attributes: true,
        }
    }
}

// Contents of these elements are kept verbatim.
static RE_RAW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<pre\b.*?</pre\s*>|<textarea\b.*?</textarea\s*>|<script\b.*?</script\s*>|<style\b.*?</style\s*>")
        .expect("invalid raw element regex")
});

static RE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--(.*?)-->").expect("invalid comment regex"));

static RE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([a-zA-Z][a-zA-Z0-9-]*)((?:"[^"]*"|'[^']*'|[^"'>])*)>"#).expect("invalid tag regex"));

static RE_BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">(\s+)<").expect("invalid whitespace regex"));

static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

// One attribute: leading space, name, then an optional `=` and value.
static RE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\s*)([^\s"'>/=]+)(?:(\s*=\s*)("[^"]*"|'[^']*'|[^\s"'=<>`]+))?"#)
        .expect("invalid attribute regex")
});

const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "allowfullscreen", "async", "autofocus", "autoplay", "checked", "compact", "controls",
    "declare", "default", "defer", "disabled", "formnovalidate", "hidden", "inert", "ismap",
    "itemscope", "loop", "multiple", "muted", "nohref", "noresize", "noshade", "novalidate",
    "nowrap", "open", "readonly", "required", "reversed", "scoped", "seamless", "selected",
    "sortable", "truespeed", "typemustmatch", "visible",
];

/// Whether `name="value"` on `tag` only restates the default.
fn is_redundant(tag: &str, name: &str, value: &str) -> bool {
    let default = match (tag, name) {
        ("script", "type") => "text/javascript",
        ("style" | "link", "type") => "text/css",
        ("input", "type") => "text",
        ("form", "method") => "get",
        _ => return false,
    };
    value.trim_matches(['"', '\'']).eq_ignore_ascii_case(default)
}

/// Minifies an HTML document.
///
/// Whitespace made only of indentation between two tags is dropped, any other
/// run of whitespace collapses to one space. `pre`, `textarea`, `script` and
/// `style` bodies are never touched.
pub fn minify_html(source: &str, opts: &HtmlMinOptions) -> String {
    let mut raws = Vec::new();

    // raw elements are parked behind placeholder tags while the rest is rewritten
    let parked = RE_RAW.replace_all(source, |caps: &Captures| {
        let body = &caps[0];
        let open_end = body.find('>').map_or(body.len(), |i| i + 1);
        raws.push(format!("{}{}", rewrite_tags(&body[..open_end], opts), &body[open_end..]));
        format!("<{}{}>", PLACEHOLDER, raws.len() - 1)
    });

    let text = minify_text(&parked, opts);
    let text = RE_PLACEHOLDER.replace_all(&text, |caps: &Captures| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|index| raws.get(index))
            .cloned()
            .unwrap_or_default()
    });

    if opts.collapse_whitespace {
        text.trim().to_string()
    } else {
        text.into_owned()
    }
}

const PLACEHOLDER: &str = "tsumiki-raw-";

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<tsumiki-raw-(\d+)>").expect("invalid placeholder regex"));

fn minify_text(text: &str, opts: &HtmlMinOptions) -> String {
    let mut text = rewrite_tags(text, opts);

    if opts.remove_comments {
        text = RE_COMMENT
            .replace_all(&text, |caps: &Captures| {
                // conditional comments carry markup for old browsers
                if caps[1].starts_with("[if") || caps[1].starts_with("<![endif") {
                    caps[0].to_string()
                } else {
                    String::new()
                }
            })
            .into_owned();
    }

    if opts.collapse_whitespace {
        text = RE_BETWEEN_TAGS
            .replace_all(&text, |caps: &Captures| {
                if caps[1].contains('\n') { "><" } else { "> <" }.to_string()
            })
            .into_owned();
        text = RE_WHITESPACE.replace_all(&text, " ").into_owned();
    }

    text
}

fn rewrite_tags(text: &str, opts: &HtmlMinOptions) -> String {
    if !opts.collapse_boolean_attributes && !opts.remove_redundant_attributes {
        return text.to_string();
    }

    RE_TAG
        .replace_all(text, |caps: &Captures| {
            let name = caps[1].to_ascii_lowercase();
            let attrs = rewrite_attrs(&name, &caps[2], opts);
            format!("<{}{}>", &caps[1], attrs)
        })
        .into_owned()
}

/// Walks the attributes of one tag, dropping values of boolean attributes
/// and attributes holding their default. Anything between attributes is
/// copied through.
fn rewrite_attrs(tag: &str, attrs: &str, opts: &HtmlMinOptions) -> String {
    let mut out = String::with_capacity(attrs.len());
    let mut last = 0;

    for caps in RE_ATTR.captures_iter(attrs) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&attrs[last..whole.start()]);
        last = whole.end();

        let name = caps[2].to_ascii_lowercase();
        let value = caps.get(4).map(|m| m.as_str());

        if opts.remove_redundant_attributes
            && value.is_some_and(|value| is_redundant(tag, &name, value))
        {
            continue;
        }

        out.push_str(&caps[1]);
        out.push_str(&caps[2]);

        if let Some(value) = value {
            if opts.collapse_boolean_attributes && BOOLEAN_ATTRIBUTES.contains(&name.as_str()) {
                continue;
            }
            out.push_str(&caps[3]);
            out.push_str(value);
        }
    }

    out.push_str(&attrs[last..]);
    out
}

/// Inserts `snippet` right before `</body>`, or appends it when the document
/// has no body end tag.
pub fn embed_before_body_end(html: &str, snippet: &str) -> String {
    match html.rfind("</body>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + snippet.len() + 1);
            out.push_str(&html[..index]);
            out.push_str(snippet);
            out.push('\n');
            out.push_str(&html[index..]);
            out
        }
        None => format!("{html}{snippet}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_comments_and_indentation() {
        let html = "<div>\n  <!-- note -->\n  <p>Hello   world</p>\n</div>\n";
        assert_eq!(
            minify_html(html, &HtmlMinOptions::default()),
            "<div><p>Hello world</p></div>"
        );
    }

    #[test]
    fn test_keeps_inline_space() {
        let html = "<p><b>a</b> <i>b</i></p>";
        assert_eq!(minify_html(html, &HtmlMinOptions::default()), html);
    }

    #[test]
    fn test_preserves_raw_elements() {
        let html = "<pre>\n  keep   this\n</pre>\n<script type=\"text/javascript\">\n  var a  =  1;\n</script>";
        assert_eq!(
            minify_html(html, &HtmlMinOptions::default()),
            "<pre>\n  keep   this\n</pre><script>\n  var a  =  1;\n</script>"
        );
    }

    #[test]
    fn test_attributes() {
        let html = r#"<input type="text" disabled="disabled" ng-disabled="x"><form method="get" action="/"></form><link rel="stylesheet" type="text/css" href="a.css">"#;
        assert_eq!(
            minify_html(html, &HtmlMinOptions::default()),
            r#"<input disabled ng-disabled="x"><form action="/"></form><link rel="stylesheet" href="a.css">"#
        );
    }

    #[test]
    fn test_expressions_in_values_kept() {
        let opts = HtmlMinOptions::default();

        let html = r#"<a ng-click="reset(); open = !open">x</a>"#;
        assert_eq!(minify_html(html, &opts), html);

        let html = r#"<span title="set hidden=yes">x</span>"#;
        assert_eq!(minify_html(html, &opts), html);

        let html = r#"<div ng-if="count > 0" hidden="hidden" type='text'>x</div>"#;
        assert_eq!(
            minify_html(html, &opts),
            r#"<div ng-if="count > 0" hidden type='text'>x</div>"#
        );
    }

    #[test]
    fn test_conditional_comment_kept() {
        let html = "<!--[if lt IE 9]><script src=\"x.js\"></script><![endif]-->";
        assert_eq!(minify_html(html, &HtmlMinOptions::default()), html);
    }

    #[test]
    fn test_embed() {
        assert_eq!(
            embed_before_body_end("<body><p></p></body>", "<script></script>"),
            "<body><p></p><script></script>\n</body>"
        );
        assert_eq!(embed_before_body_end("<p></p>", "<x>"), "<p></p><x>\n");
    }
}
