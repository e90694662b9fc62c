//! Reference injection into HTML (or any text) documents.
//!
//! A document carries marker comment pairs:
//!
//! ```html
//! <!-- inject:js -->
//! <!-- endinject -->
//! ```
//!
//! Injection replaces whatever sits between a start marker and the first end
//! marker after it with one rendered tag per file, so running it again over
//! its own output yields the same document.

use regex::Regex;

use crate::fileset::FileSet;

const EXT: &str = "{{ext}}";

/// How paths are rendered inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
    /// `<script>` / `<link>` tags chosen by extension.
    Html,
    /// Quoted, comma separated entries of a karma `files` array, nested one
    /// level deeper than the marker line.
    KarmaList,
}

#[derive(Debug, Clone)]
pub struct Injection {
    /// Start marker template, `{{ext}}` stands for the file extension.
    pub start: String,
    pub end: String,
    /// Prefixes removed from rendered paths, the first match wins.
    pub ignore_path: Vec<String>,
    pub add_root_slash: bool,
    pub renderer: Renderer,
}

impl Default for Injection {
    fn default() -> Self {
        Self {
            start: String::from("<!-- inject:{{ext}} -->"),
            end: String::from("<!-- endinject -->"),
            ignore_path: Vec::new(),
            add_root_slash: true,
            renderer: Renderer::Html,
        }
    }
}

impl Injection {
    /// Markers reserved for vendor references.
    pub fn vendor() -> Self {
        Self {
            start: String::from("<!-- inject:vendor:{{ext}} -->"),
            ..Self::default()
        }
    }

    /// The `files: [ ... ]` array of a karma configuration.
    pub fn karma() -> Self {
        Self {
            start: String::from("files: ["),
            end: String::from("]"),
            add_root_slash: false,
            renderer: Renderer::KarmaList,
            ..Self::default()
        }
    }

    pub fn ignore_path<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_path = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_root_slash(mut self, add: bool) -> Self {
        self.add_root_slash = add;
        self
    }

    fn render_path(&self, path: &str) -> String {
        let stripped = self
            .ignore_path
            .iter()
            .map(|prefix| prefix.trim_matches('/'))
            .filter(|prefix| !prefix.is_empty())
            .find_map(|prefix| {
                path.strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('/'))
            })
            .unwrap_or(path)
            .trim_start_matches('/');

        if self.add_root_slash {
            format!("/{stripped}")
        } else {
            stripped.to_string()
        }
    }

    fn render(&self, ext: &str, paths: &[&str]) -> Vec<String> {
        match self.renderer {
            Renderer::Html => paths
                .iter()
                .filter_map(|path| {
                    let path = self.render_path(path);
                    match ext {
                        "js" => Some(format!(r#"<script src="{path}"></script>"#)),
                        "css" => Some(format!(r#"<link rel="stylesheet" href="{path}">"#)),
                        "html" => Some(format!(r#"<link rel="import" href="{path}">"#)),
                        _ => None,
                    }
                })
                .collect(),
            Renderer::KarmaList => {
                let last = paths.len().saturating_sub(1);
                paths
                    .iter()
                    .enumerate()
                    .map(|(i, path)| {
                        let comma = if i < last { "," } else { "" };
                        format!("  '{}'{}", self.render_path(path), comma)
                    })
                    .collect()
            }
        }
    }

    /// Extensions named by start markers already present in `document`.
    fn marker_extensions(&self, document: &str) -> Vec<String> {
        let Some((head, tail)) = self.start.split_once(EXT) else {
            return Vec::new();
        };

        let pattern = format!("{}([A-Za-z0-9]+){}", regex::escape(head), regex::escape(tail));
        match Regex::new(&pattern) {
            Ok(re) => re
                .captures_iter(document)
                .map(|caps| caps[1].to_string())
                .collect(),
            Err(e) => {
                tracing::debug!("unusable start marker '{}': {e}", self.start);
                Vec::new()
            }
        }
    }
}

/// Replaces the marked regions of `document` with references to `files`.
///
/// Every extension of `files` is injected between its own pair of markers.
/// Regions whose extension has no files are emptied. A marker that isn't
/// found leaves the document as it is.
pub fn inject(document: &str, injection: &Injection, files: &FileSet) -> String {
    let paths: Vec<&str> = files.iter().map(|path| path.as_str()).collect();

    // one region for everything when the marker doesn't vary by extension
    if !injection.start.contains(EXT) {
        let tags = injection.render("", &paths);
        return replace_region(document, &injection.start, &injection.end, &tags);
    }

    let mut extensions: Vec<String> = files.extensions().into_iter().map(str::to_string).collect();
    for ext in injection.marker_extensions(document) {
        if !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }

    let mut out = document.to_string();

    for ext in &extensions {
        let selected: Vec<&str> = paths
            .iter()
            .copied()
            .filter(|path| path.rsplit_once('.').map(|(_, e)| e) == Some(ext.as_str()))
            .collect();

        let start = injection.start.replace(EXT, ext);
        let tags = injection.render(ext, &selected);
        out = replace_region(&out, &start, &injection.end, &tags);
    }

    out
}

fn replace_region(document: &str, start: &str, end: &str, tags: &[String]) -> String {
    let Some(start_at) = document.find(start) else {
        tracing::debug!(marker = start, "start marker not found, nothing injected");
        return document.to_string();
    };

    let content_at = start_at + start.len();
    let Some(end_offset) = document[content_at..].find(end) else {
        tracing::debug!(marker = end, "end marker not found, nothing injected");
        return document.to_string();
    };
    let end_at = content_at + end_offset;

    let line_start = document[..start_at].rfind('\n').map_or(0, |i| i + 1);
    let indent: String = document[line_start..start_at]
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();

    let mut region = String::new();
    if !tags.is_empty() {
        for tag in tags {
            region.push('\n');
            region.push_str(&indent);
            region.push_str(tag);
        }
        region.push('\n');
        region.push_str(&indent);
    }

    let mut out = String::with_capacity(document.len() + region.len());
    out.push_str(&document[..content_at]);
    out.push_str(&region);
    out.push_str(&document[end_at..]);
    out
}
