pub mod discover;
pub mod manifest;
pub mod naming;

// Re-export key types for convenience.
pub use discover::{discover, DiscoverError, DiscoveredRecipe};
pub use manifest::{
    dev_install_present, find_up, DependencyScope, ManifestError, PackageManifest, VENDOR_DIR,
};
pub use naming::{camelize, capability_name};
