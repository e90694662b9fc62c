//! Bindings to the external transforms: the stylesheet compiler, the
//! minifiers, the annotation tool, the linters and the test runner.
//!
//! Stylesheets are handled in process by `grass`. Everything else is a child
//! process speaking stdin/stdout, configured as an argv array so that any
//! compatible tool can be substituted.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Tools;
use crate::core::Hash32;
use crate::error::ToolError;

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub js_minifier: Vec<String>,
    pub annotate: Vec<String>,
    pub jshint: Vec<String>,
    pub csslint: Vec<String>,
    pub karma: Vec<String>,
}

impl Toolchain {
    pub fn from_config(tools: &Tools) -> Self {
        Self {
            js_minifier: tools.js_minifier.clone(),
            annotate: tools.annotate.clone(),
            jshint: tools.jshint.clone(),
            csslint: tools.csslint.clone(),
            karma: tools.karma.clone(),
        }
    }

    pub fn minify_js(&self, source: &[u8]) -> Result<Vec<u8>, ToolError> {
        filter(&self.js_minifier, "js_minifier", source)
    }

    pub fn annotate(&self, source: &[u8]) -> Result<Vec<u8>, ToolError> {
        filter(&self.annotate, "annotate", source)
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::from_config(&Tools::default())
    }
}

/// Pipes `input` through the command `argv` and returns its stdout.
pub(crate) fn filter(argv: &[String], what: &'static str, input: &[u8]) -> Result<Vec<u8>, ToolError> {
    let (program, args) = argv.split_first().ok_or(ToolError::Unconfigured(what))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ToolError::Spawn(program.clone(), e))?;

    let mut stdin = child.stdin.take().ok_or_else(|| {
        ToolError::Io(std::io::Error::other("child process has no stdin"))
    })?;

    // Writing from another thread keeps a chatty tool from filling its stdout
    // pipe while we are still feeding it. A tool exiting early closes the pipe,
    // its exit status tells the rest.
    let output = std::thread::scope(|s| {
        s.spawn(move || stdin.write_all(input));
        child.wait_with_output()
    })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: program.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output.stdout)
}

/// Runs `argv` in `root` with the terminal attached, failing on a non-zero
/// exit status.
pub fn run(argv: &[String], what: &'static str, root: &Utf8Path) -> Result<(), ToolError> {
    let (program, args) = argv.split_first().ok_or(ToolError::Unconfigured(what))?;

    let status = Command::new(program)
        .args(args)
        .current_dir(root)
        .status()
        .map_err(|e| ToolError::Spawn(program.clone(), e))?;

    if !status.success() {
        return Err(ToolError::Failed {
            tool: program.clone(),
            status,
            stderr: String::new(),
        });
    }

    Ok(())
}

/// Compiles a SCSS entry file to CSS. Imports are looked up next to the file
/// and in `load_paths`.
pub fn compile_scss(path: &Utf8Path, load_paths: &[Utf8PathBuf]) -> Result<String, ToolError> {
    let options = load_paths
        .iter()
        .fold(grass::Options::default(), |options, load_path| {
            options.load_path(load_path.as_std_path())
        });

    Ok(grass::from_path(path.as_std_path(), &options)?)
}

/// Compresses CSS. Plain CSS is valid SCSS, so the stylesheet compiler doubles
/// as a minifier.
pub fn minify_css(source: &str) -> Result<String, ToolError> {
    let options = grass::Options::default().style(grass::OutputStyle::Compressed);
    Ok(grass::from_string(source.to_owned(), &options)?)
}

/// Outcome of running a linter over a set of files.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LintReport {
    pub checked: usize,
    pub findings: Vec<String>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Runs a linter over `files`. Findings never fail the build: they are
/// reported through tracing and returned. A missing linter binary is skipped.
pub fn lint(
    argv: &[String],
    root: &Utf8Path,
    extra: &[String],
    files: &[Utf8PathBuf],
) -> Result<LintReport, ToolError> {
    if files.is_empty() {
        return Ok(LintReport::default());
    }

    let (program, args) = argv.split_first().ok_or(ToolError::Unconfigured("linter"))?;

    let output = match Command::new(program)
        .args(args)
        .args(extra)
        .args(files.iter().map(|file| file.as_str()))
        .current_dir(root)
        .stdin(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(linter = %program, "linter is not installed, skipping");
            return Ok(LintReport::default());
        }
        Err(e) => return Err(ToolError::Spawn(program.clone(), e)),
    };

    let findings: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .chain(String::from_utf8_lossy(&output.stderr).lines())
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    for finding in &findings {
        tracing::warn!(linter = %program, "{finding}");
    }

    if output.status.success() && findings.is_empty() {
        tracing::info!(linter = %program, files = files.len(), "no lint findings");
    }

    Ok(LintReport {
        checked: files.len(),
        findings,
    })
}

/// Remembers the content hash of every file a linter has already seen, so
/// that only changed files are linted again within one process.
#[derive(Debug, Default)]
pub struct LintCache {
    seen: Mutex<HashMap<(String, Utf8PathBuf), Hash32>>,
}

impl LintCache {
    /// Filters `files` down to those whose content changed since `linter` last
    /// saw them. Unreadable files are kept, the linter will report them.
    pub fn changed(&self, linter: &str, root: &Utf8Path, files: &[Utf8PathBuf]) -> Vec<Utf8PathBuf> {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        files
            .iter()
            .filter(|file| {
                let Ok(data) = std::fs::read(root.join(file)) else {
                    return true;
                };
                let hash = Hash32::hash(&data);
                let key = (linter.to_string(), (*file).clone());
                seen.insert(key, hash) != Some(hash)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_css() {
        let css = minify_css("a {\n  color: red;\n}\n\nb { margin: 0 }\n").unwrap();
        assert!(css.starts_with("a{color:red}b{margin:0}"));
        assert!(!css.trim_end().contains('\n'));
    }

    #[test]
    fn test_compile_scss_with_load_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("vendor")).unwrap();
        std::fs::write(root.join("vendor/_colors.scss"), "$primary: #123456;").unwrap();
        std::fs::write(
            root.join("main.scss"),
            "@import 'colors';\n.a { .b { color: $primary; } }\n",
        )
        .unwrap();

        let css = compile_scss(&root.join("main.scss"), &[root.join("vendor")]).unwrap();
        assert!(css.contains(".a .b"));
        assert!(css.contains("#123456"));
    }

    #[test]
    fn test_scss_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join("broken.scss"), ".a { color: $undefined; }").unwrap();

        let err = compile_scss(&root.join("broken.scss"), &[]).unwrap_err();
        assert!(matches!(err, ToolError::Sass(_)));
    }

    #[test]
    fn test_unconfigured_filter() {
        let err = filter(&[], "annotate", b"x").unwrap_err();
        assert!(matches!(err, ToolError::Unconfigured("annotate")));
    }

    #[cfg(unix)]
    #[test]
    fn test_filter_pipes_through() {
        let argv = vec!["tr".to_string(), "a-z".to_string(), "A-Z".to_string()];
        let out = filter(&argv, "test", b"hello").unwrap();
        assert_eq!(out, b"HELLO");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_status() {
        run(&["true".to_string()], "karma", Utf8Path::new(".")).unwrap();

        let err = run(&["false".to_string()], "karma", Utf8Path::new(".")).unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_filter_reports_failure() {
        let argv = vec!["false".to_string()];
        let err = filter(&argv, "test", b"").unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
    }

    #[test]
    fn test_missing_linter_is_skipped() {
        let argv = vec!["tsumiki-no-such-linter".to_string()];
        let report = lint(&argv, Utf8Path::new("."), &[], &[Utf8PathBuf::from("a.js")]).unwrap();
        assert_eq!(report, LintReport::default());
    }

    #[test]
    fn test_lint_cache_only_changed() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join("a.js"), "var a;").unwrap();
        std::fs::write(root.join("b.js"), "var b;").unwrap();

        let cache = LintCache::default();
        let files = vec![Utf8PathBuf::from("a.js"), Utf8PathBuf::from("b.js")];

        assert_eq!(cache.changed("jshint", &root, &files), files);
        assert!(cache.changed("jshint", &root, &files).is_empty());

        std::fs::write(root.join("b.js"), "var b = 2;").unwrap();
        assert_eq!(cache.changed("jshint", &root, &files), vec![Utf8PathBuf::from("b.js")]);

        // other linters keep their own memory
        assert_eq!(cache.changed("csslint", &root, &files), files);
    }
}
