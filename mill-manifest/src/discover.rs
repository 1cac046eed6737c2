use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use walkdir::WalkDir;

/// A local recipe candidate found on disk.
///
/// Discovery only names candidates; turning one into a recipe descriptor
/// is the host's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRecipe {
    pub name: String,
    pub path: PathBuf,
}

/// Errors produced while scanning for local recipes.
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("invalid recipes pattern: {0}")]
    Pattern(#[from] globset::Error),
}

/// Scan `root` for files matching `pattern` (relative glob, `{a,b}`
/// alternation supported) and derive recipe names from them.
///
/// A file called `main.*` names its recipe after the parent directory;
/// any other file uses its own stem. Results are sorted by path so
/// registration order is reproducible.
pub fn discover(root: &Path, pattern: &str) -> Result<Vec<DiscoveredRecipe>, DiscoverError> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();

    let mut found: Vec<DiscoveredRecipe> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(root).ok()?;
            if !matcher.is_match(rel) {
                return None;
            }
            let name = recipe_name(rel)?;
            Some(DiscoveredRecipe {
                name,
                path: entry.path().to_path_buf(),
            })
        })
        .collect();

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

fn recipe_name(rel: &Path) -> Option<String> {
    let stem = rel.file_stem()?.to_str()?;
    if stem == "main" {
        let dir = rel.parent()?.file_name()?.to_str()?;
        Some(dir.to_string())
    } else {
        Some(stem.to_string())
    }
}
