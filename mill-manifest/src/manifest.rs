use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directory where a project vendors its dependencies.
pub const VENDOR_DIR: &str = "vendor";

/// Declared dependencies of a mill project (`Mill.toml`).
///
/// Version constraints are kept verbatim; the loader only cares that a
/// name is declared, never what range it carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManifest {
    pub dependencies: BTreeMap<String, String>,
    #[serde(rename = "dev-dependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
}

/// Which dependency tables participate in capability resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyScope {
    Runtime,
    RuntimeAndDev,
}

impl PackageManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Dependency names visible under the given scope, in a stable order.
    pub fn names(&self, scope: DependencyScope) -> impl Iterator<Item = &str> {
        let dev = match scope {
            DependencyScope::Runtime => None,
            DependencyScope::RuntimeAndDev => Some(self.dev_dependencies.keys()),
        };
        self.dependencies
            .keys()
            .chain(dev.into_iter().flatten())
            .map(String::as_str)
    }

    /// Whether the manifest declares `name` in either table.
    pub fn declares(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }
}

/// Walk up from `start` looking for a file called `file_name`.
pub fn find_up(start: &Path, file_name: &str) -> Option<PathBuf> {
    start.ancestors().map(|dir| dir.join(file_name)).find(|p| p.is_file())
}

/// Whether the dev dependency table should participate in resolution.
///
/// Mirrors a production-vs-development install probe: dev dependencies are
/// only considered when the first one is actually vendored on disk.
pub fn dev_install_present(root: &Path, manifest: &PackageManifest) -> bool {
    match manifest.dev_dependencies.keys().next() {
        Some(name) => root.join(VENDOR_DIR).join(name).is_dir(),
        None => false,
    }
}

/// Errors produced while locating or parsing a project manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read manifest {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse manifest {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
