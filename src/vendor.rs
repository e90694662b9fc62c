//! Vendor packages installed by bower.
//!
//! The project manifest (`bower.json`) lists the packages the application
//! depends on. Each installed package carries its own manifest naming its
//! `main` files and its own dependencies. The resolved list is ordered so that
//! every package's files come after the files of the packages it depends on.

use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::Map;

use crate::error::{ConfigError, VendorError};
use crate::fileset::FileSet;

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    main: Main,
    #[serde(default)]
    dependencies: Map<String, serde_json::Value>,
    #[serde(default)]
    overrides: Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum Main {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl Main {
    fn patterns(&self) -> Vec<&str> {
        match self {
            Main::None => vec![],
            Main::One(one) => vec![one.as_str()],
            Main::Many(many) => many.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Override {
    main: Option<Main>,
    dependencies: Option<Map<String, serde_json::Value>>,
}

/// Resolves the main files of every installed vendor package, dependencies
/// first, as root-relative paths below `vendor_dir`.
pub fn main_files(root: &Utf8Path, vendor_dir: &Utf8Path) -> Result<FileSet, VendorError> {
    let project = root.join("bower.json");

    if !project.exists() {
        tracing::debug!("no bower.json, no vendor files");
        return Ok(FileSet::new());
    }

    let manifest = read_manifest(&project)?;
    let overrides = manifest
        .overrides
        .iter()
        .filter_map(|(name, value)| {
            serde_json::from_value::<Override>(value.clone())
                .ok()
                .map(|o| (name.clone(), o))
        })
        .collect();

    let mut walker = Walker {
        root,
        vendor_dir,
        overrides,
        visited: HashSet::new(),
        files: FileSet::new(),
    };

    for name in manifest.dependencies.keys() {
        walker.visit(name)?;
    }

    Ok(walker.files)
}

struct Walker<'a> {
    root: &'a Utf8Path,
    vendor_dir: &'a Utf8Path,
    overrides: std::collections::HashMap<String, Override>,
    visited: HashSet<String>,
    files: FileSet,
}

impl Walker<'_> {
    fn visit(&mut self, name: &str) -> Result<(), VendorError> {
        if !self.visited.insert(name.to_string()) {
            return Ok(());
        }

        let package = self.vendor_dir.join(name);
        let Some(manifest) = self.package_manifest(&package)? else {
            tracing::warn!(package = name, "vendor package is not installed, skipping");
            return Ok(());
        };

        let (main, dependencies) = match self.overrides.remove(name) {
            Some(Override { main, dependencies }) => (
                main.unwrap_or(manifest.main),
                dependencies.unwrap_or(manifest.dependencies),
            ),
            None => (manifest.main, manifest.dependencies),
        };

        for dependency in dependencies.keys() {
            self.visit(dependency)?;
        }

        let patterns: Vec<String> = main
            .patterns()
            .into_iter()
            .map(|pattern| package.join(pattern.trim_start_matches("./")).to_string())
            .collect();

        let resolved = FileSet::resolve(self.root, patterns)?;
        self.files.extend(resolved);

        Ok(())
    }

    fn package_manifest(&self, package: &Utf8Path) -> Result<Option<Manifest>, VendorError> {
        for candidate in [".bower.json", "bower.json"] {
            let path = self.root.join(package).join(candidate);
            if path.exists() {
                return Ok(Some(read_manifest(&path)?));
            }
        }

        if self.root.join(package).is_dir() {
            return Ok(Some(Manifest::default()));
        }

        Ok(None)
    }
}

fn read_manifest(path: &Utf8PathBuf) -> Result<Manifest, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.clone(), e))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Json(path.clone(), e))
}
