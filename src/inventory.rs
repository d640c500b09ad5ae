//! Workspace package discovery
//!
//! Enumerates the packages of a multi-package workspace from its manifests:
//! `package.json` `workspaces` globs, a `lerna.json` `packages` list, or the
//! conventional `packages/` directory when neither is declared.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::types::{Package, PackageState};

/// Errors that make the workspace unusable. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("cannot resolve workspace root {root}: {source}")]
    Root {
        root: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot read workspace manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("workspace manifest {path} is not valid JSON: {source}")]
    ManifestParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid workspace pattern \"{pattern}\": {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("no packages found under {root}")]
    NoPackages { root: PathBuf },
}

/// A package manifest, reduced to the fields the daemon cares about.
#[derive(Debug, Deserialize)]
struct PackageManifest {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    private: bool,
    workspaces: Option<WorkspacesField>,
}

/// `workspaces` comes in two shapes: a bare glob list or `{ "packages": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkspacesField {
    Patterns(Vec<String>),
    Detailed { packages: Vec<String> },
}

impl WorkspacesField {
    fn into_patterns(self) -> Vec<String> {
        match self {
            WorkspacesField::Patterns(patterns) => patterns,
            WorkspacesField::Detailed { packages } => packages,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LernaManifest {
    packages: Option<Vec<String>>,
}

/// Loads and holds the workspace package list.
#[derive(Debug)]
pub struct PackageInventory {
    root: PathBuf,
    packages: Vec<Package>,
}

impl PackageInventory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            packages: Vec::new(),
        }
    }

    /// Enumerate the workspace packages. Must succeed before anything else
    /// runs; every error here is fatal to the process.
    pub fn init(&mut self) -> Result<(), InventoryError> {
        let root = fs::canonicalize(&self.root).map_err(|source| InventoryError::Root {
            root: self.root.clone(),
            source,
        })?;

        let manifest = read_manifest(&root.join("package.json"))?;
        let candidates = match workspace_patterns(&root, manifest) {
            Some(patterns) => expand_patterns(&root, &patterns)?,
            None => conventional_package_dirs(&root),
        };

        let mut packages = Vec::new();
        for dir in candidates {
            if let Some(package) = load_package(&dir) {
                debug!(
                    "found {}@{} at {}",
                    package.name,
                    package.version,
                    package.path.display()
                );
                packages.push(package);
            }
        }

        if packages.is_empty() {
            return Err(InventoryError::NoPackages { root });
        }

        packages.sort_by(|a, b| a.name.cmp(&b.name));
        self.packages = packages;
        Ok(())
    }

    /// The loaded package list, optionally without private packages.
    pub fn packages(&self, include_private: bool) -> Vec<Package> {
        self.packages
            .iter()
            .filter(|p| include_private || !p.private)
            .cloned()
            .collect()
    }
}

/// Resolve the path of a changed file to the index of its owning package.
/// Nested packages resolve to the deepest match.
pub fn owning_package_index(packages: &[Package], path: &Path) -> Option<usize> {
    packages
        .iter()
        .enumerate()
        .filter(|(_, p)| path.starts_with(&p.path))
        .max_by_key(|(_, p)| p.path.components().count())
        .map(|(index, _)| index)
}

fn read_manifest(path: &Path) -> Result<PackageManifest, InventoryError> {
    let content = fs::read_to_string(path).map_err(|source| InventoryError::ManifestRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| InventoryError::ManifestParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Workspace globs from the root manifest, falling back to `lerna.json`.
fn workspace_patterns(root: &Path, manifest: PackageManifest) -> Option<Vec<String>> {
    if let Some(workspaces) = manifest.workspaces {
        return Some(workspaces.into_patterns());
    }

    let lerna: Option<LernaManifest> = fs::read_to_string(root.join("lerna.json"))
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok());
    lerna.and_then(|l| l.packages)
}

fn expand_patterns(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, InventoryError> {
    let mut dirs = Vec::new();
    for pattern in patterns {
        let full = root.join(pattern);
        let matches =
            glob::glob(&full.to_string_lossy()).map_err(|source| InventoryError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        for entry in matches.flatten() {
            if entry.is_dir() {
                dirs.push(entry);
            }
        }
    }
    Ok(dirs)
}

/// No declared workspaces: scan the conventional `packages/` directory.
fn conventional_package_dirs(root: &Path) -> Vec<PathBuf> {
    let packages_dir = root.join("packages");
    if !packages_dir.is_dir() {
        return Vec::new();
    }

    WalkDir::new(&packages_dir)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().join("package.json").is_file())
        .map(|e| e.path().to_path_buf())
        .collect()
}

/// Parse one member directory into a Package. Directories without a usable
/// manifest are skipped, not fatal.
fn load_package(dir: &Path) -> Option<Package> {
    let manifest_path = dir.join("package.json");
    if !manifest_path.is_file() {
        return None;
    }

    let manifest = match read_manifest(&manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!("❌ skipping {}: {err}", dir.display());
            return None;
        }
    };

    let name = manifest.name?;
    let path = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());

    Some(Package {
        name,
        version: manifest.version.unwrap_or_else(|| "0.0.0".to_string()),
        path,
        private: manifest.private,
        state: PackageState::Idle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn member(root: &Path, dir: &str, name: &str, private: bool) {
        write(
            &root.join(dir).join("package.json"),
            &format!(
                r#"{{"name": "{name}", "version": "1.2.3", "private": {private}}}"#
            ),
        );
    }

    #[test]
    fn fails_without_a_root_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut inventory = PackageInventory::new(dir.path());
        assert!(matches!(
            inventory.init(),
            Err(InventoryError::ManifestRead { .. })
        ));
    }

    #[test]
    fn fails_when_the_workspace_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("package.json"),
            r#"{"name": "root", "workspaces": ["packages/*"]}"#,
        );
        let mut inventory = PackageInventory::new(dir.path());
        assert!(matches!(
            inventory.init(),
            Err(InventoryError::NoPackages { .. })
        ));
    }

    #[test]
    fn discovers_packages_from_workspace_globs() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("package.json"),
            r#"{"name": "root", "workspaces": ["packages/*"]}"#,
        );
        member(dir.path(), "packages/core", "@ws/core", false);
        member(dir.path(), "packages/server", "@ws/server", false);
        member(dir.path(), "packages/internal", "@ws/internal", true);

        let mut inventory = PackageInventory::new(dir.path());
        inventory.init().unwrap();

        let public: Vec<_> = inventory
            .packages(false)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(public, vec!["@ws/core", "@ws/server"]);
        assert_eq!(inventory.packages(true).len(), 3);
    }

    #[test]
    fn understands_the_detailed_workspaces_form() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("package.json"),
            r#"{"name": "root", "workspaces": {"packages": ["libs/*"]}}"#,
        );
        member(dir.path(), "libs/one", "one", false);

        let mut inventory = PackageInventory::new(dir.path());
        inventory.init().unwrap();
        assert_eq!(inventory.packages(true).len(), 1);
    }

    #[test]
    fn falls_back_to_lerna_json() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("package.json"), r#"{"name": "root"}"#);
        write(
            &dir.path().join("lerna.json"),
            r#"{"packages": ["modules/*"]}"#,
        );
        member(dir.path(), "modules/a", "a", false);

        let mut inventory = PackageInventory::new(dir.path());
        inventory.init().unwrap();
        assert_eq!(inventory.packages(true)[0].name, "a");
    }

    #[test]
    fn falls_back_to_the_packages_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("package.json"), r#"{"name": "root"}"#);
        member(dir.path(), "packages/plain", "plain", false);

        let mut inventory = PackageInventory::new(dir.path());
        inventory.init().unwrap();
        assert_eq!(inventory.packages(true)[0].name, "plain");
    }

    #[test]
    fn skips_members_without_a_name() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("package.json"),
            r#"{"name": "root", "workspaces": ["packages/*"]}"#,
        );
        write(
            &dir.path().join("packages/anon/package.json"),
            r#"{"version": "0.1.0"}"#,
        );
        member(dir.path(), "packages/named", "named", false);

        let mut inventory = PackageInventory::new(dir.path());
        inventory.init().unwrap();
        assert_eq!(inventory.packages(true).len(), 1);
    }

    fn synthetic(name: &str, path: &str) -> Package {
        Package {
            name: name.to_string(),
            version: "0.0.0".to_string(),
            path: PathBuf::from(path),
            private: false,
            state: PackageState::Idle,
        }
    }

    #[test]
    fn resolves_a_path_to_its_owning_package() {
        let packages = vec![synthetic("a", "/ws/a"), synthetic("b", "/ws/b")];

        let index = owning_package_index(&packages, Path::new("/ws/a/src/index.ts"));
        assert_eq!(index, Some(0));
        assert_eq!(
            owning_package_index(&packages, Path::new("/elsewhere/file.ts")),
            None
        );
    }

    #[test]
    fn prefers_the_deepest_package_for_nested_layouts() {
        let packages = vec![synthetic("a", "/ws/a"), synthetic("nested", "/ws/a/nested")];

        let index = owning_package_index(&packages, Path::new("/ws/a/nested/src/x.ts"));
        assert_eq!(index, Some(1));
    }
}
