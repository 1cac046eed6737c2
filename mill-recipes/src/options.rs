use std::collections::BTreeMap;
use std::path::PathBuf;

use mill_pipeline::SourcesConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// File name of a mill project manifest.
pub const MANIFEST_FILE: &str = "Mill.toml";

/// Where local recipes live by default: any top-level descriptor, or a
/// directory's `main` descriptor.
pub const DEFAULT_RECIPES_PATTERN: &str = "mill-recipes/{*/main.toml,*.toml}";

/// Loader options.
///
/// `tasks`, `paths` and `order` are opaque to the loader; recipes give
/// them meaning. Every recipe receives its own deep copy of the whole
/// structure, so nothing a recipe does to its configuration can leak into
/// another recipe or back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    pub tasks: Value,
    pub paths: Value,
    pub order: Value,
    pub sources: Option<SourcesConfig>,
    pub recipes_pattern: String,
    pub rename: BTreeMap<String, String>,
    /// Explicit manifest path; when unset the loader walks up from the
    /// project root.
    pub package: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tasks: empty_object(),
            paths: empty_object(),
            order: empty_object(),
            sources: Some(SourcesConfig {
                default_base: Some(PathBuf::from(".")),
                entries: BTreeMap::new(),
            }),
            recipes_pattern: DEFAULT_RECIPES_PATTERN.to_string(),
            rename: BTreeMap::new(),
            package: None,
        }
    }
}

/// The configuration value a recipe receives: a deep copy of the options.
pub type Config = Options;

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}
