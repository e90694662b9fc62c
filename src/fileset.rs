//! Ordered file sets resolved from glob patterns.
//!
//! A [`FileSet`] is the unit every task works on: the list of files a
//! pipeline consumes, the list of references the injector renders, the list
//! of files handed to a linter. Order is significant everywhere, so the
//! resolver never reorders what the glob engine produces, except when asked
//! to sort application scripts by their module dependencies.

mod modules;

use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};

use crate::error::ResolveError;

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// An ordered, duplicate-free list of root-relative file paths, together with
/// the patterns which produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    patterns: Vec<String>,
    files: Vec<Utf8PathBuf>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from already known paths, dropping duplicates.
    pub fn from_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        let mut set = Self::new();
        set.extend(files);
        set
    }

    /// Expands `patterns` below `root`.
    ///
    /// Patterns starting with `!` exclude files. Inclusions are expanded first,
    /// in declaration order, then every exclusion is applied to the result. A
    /// root which doesn't exist or can't be read simply contributes nothing.
    pub fn resolve<I, S>(root: &Utf8Path, patterns: I) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();

        let mut set = FileSet::new();
        let mut excludes = Vec::new();

        for pattern in &patterns {
            if let Some(negated) = pattern.strip_prefix('!') {
                let compiled = Pattern::new(clean(negated))
                    .map_err(|e| ResolveError::Pattern(pattern.clone(), e))?;
                excludes.push(compiled);
                continue;
            }

            let full = anchor(root, clean(pattern));
            let entries = glob::glob_with(&full, OPTIONS)
                .map_err(|e| ResolveError::Pattern(pattern.clone(), e))?;

            for entry in entries {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        tracing::debug!("skipping unreadable path: {e}");
                        continue;
                    }
                };

                if !path.is_file() {
                    continue;
                }

                let Ok(path) = Utf8PathBuf::try_from(path) else {
                    tracing::debug!("skipping non UTF-8 path");
                    continue;
                };

                set.push(relative_to(root, &path));
            }
        }

        set.files.retain(|file| {
            !excludes
                .iter()
                .any(|exclude| exclude.matches_with(file.as_str(), OPTIONS))
        });
        set.patterns = patterns;

        Ok(set)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Utf8PathBuf> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Appends a path unless it is already present.
    pub fn push(&mut self, path: impl Into<Utf8PathBuf>) {
        let path = path.into();
        if !self.files.contains(&path) {
            self.files.push(path);
        }
    }

    pub fn extend<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        for path in paths {
            self.push(path);
        }
    }

    /// Concatenates two sets, keeping the first occurrence of any path.
    pub fn chain(mut self, other: FileSet) -> FileSet {
        self.patterns.extend(other.patterns);
        self.extend(other.files);
        self
    }

    /// The subset of files with extension `ext`, in the original order.
    pub fn by_extension(&self, ext: &str) -> FileSet {
        FileSet {
            patterns: self.patterns.clone(),
            files: self
                .files
                .iter()
                .filter(|file| file.extension() == Some(ext))
                .cloned()
                .collect(),
        }
    }

    /// Distinct file extensions, in order of first appearance.
    pub fn extensions(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.files
            .iter()
            .filter_map(|file| file.extension())
            .filter(|ext| seen.insert(*ext))
            .collect()
    }

    /// Reorders AngularJS sources so that every file defining a module comes
    /// before the files using it. Files with no relation keep their order.
    pub fn sort_modules(self, root: &Utf8Path) -> FileSet {
        let order = modules::sort(&self.files, |path| fs::read_to_string(root.join(path)).ok());

        let mut slots: Vec<Option<Utf8PathBuf>> = self.files.into_iter().map(Some).collect();
        let files = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();

        FileSet {
            patterns: self.patterns,
            files,
        }
    }
}

impl IntoIterator for FileSet {
    type Item = Utf8PathBuf;
    type IntoIter = std::vec::IntoIter<Utf8PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a Utf8PathBuf;
    type IntoIter = std::slice::Iter<'a, Utf8PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Drops a leading `./`, which carries no meaning for matching.
fn clean(pattern: &str) -> &str {
    pattern.trim_start_matches("./")
}

fn anchor(root: &Utf8Path, pattern: &str) -> String {
    if root.as_str().is_empty() || root == "." {
        pattern.to_string()
    } else {
        format!(
            "{}/{}",
            Pattern::escape(root.as_str().trim_end_matches('/')),
            pattern
        )
    }
}

fn relative_to(root: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let relative = relative.strip_prefix(".").unwrap_or(relative);
    Utf8PathBuf::from(relative.as_str().replace('\\', "/"))
}
