use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use globset::{GlobBuilder, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::lazypipe::{Entry, LazyPipe, Stream};

/// Declarative source-selection configuration carried inside a recipe's
/// options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourcesConfig {
    pub default_base: Option<PathBuf>,
    #[serde(flatten)]
    pub entries: BTreeMap<String, SourceSpec>,
}

/// Glob selection for one named source, with an optional per-source base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Globs(GlobList),
    Detailed {
        globs: GlobList,
        #[serde(default)]
        base: Option<PathBuf>,
    },
}

impl SourceSpec {
    fn globs(&self) -> &GlobList {
        match self {
            SourceSpec::Globs(globs) => globs,
            SourceSpec::Detailed { globs, .. } => globs,
        }
    }

    fn base(&self) -> Option<&Path> {
        match self {
            SourceSpec::Globs(_) => None,
            SourceSpec::Detailed { base, .. } => base.as_deref(),
        }
    }
}

/// One glob or several.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GlobList {
    One(String),
    Many(Vec<String>),
}

impl GlobList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice = match self {
            GlobList::One(glob) => std::slice::from_ref(glob),
            GlobList::Many(globs) => globs.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

/// Produces the downstream pipe a spawned source feeds into.
///
/// Evaluated when a stream is spawned, never when the source is declared.
pub type SourceHook = Rc<dyn Fn() -> Result<LazyPipe, Box<dyn Error>>>;

/// The named source pipes handed to a recipe body.
#[derive(Debug, Default)]
pub struct Sources {
    pipes: BTreeMap<String, SourcePipe>,
}

impl Sources {
    pub fn get(&self, name: &str) -> Option<&SourcePipe> {
        self.pipes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }
}

/// A reusable source: glob selection plus the deferred downstream hook.
pub struct SourcePipe {
    name: String,
    globs: Vec<String>,
    base: PathBuf,
    hook: SourceHook,
}

impl std::fmt::Debug for SourcePipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePipe")
            .field("name", &self.name)
            .field("globs", &self.globs)
            .field("base", &self.base)
            .finish()
    }
}

impl SourcePipe {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn globs(&self) -> &[String] {
        &self.globs
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Expand the globs and run the matching entries through the
    /// downstream hook's pipe. Each call produces an independent stream.
    pub fn spawn(&self) -> Result<Stream, SourceError> {
        let pipe = (self.hook)().map_err(|source| SourceError::Hook {
            name: self.name.clone(),
            source,
        })?;
        let matched = expand(&self.globs, &self.base)?;
        Ok(pipe.spawn(Box::new(matched.into_iter())))
    }
}

/// Build the named source pipes for a recipe from its configuration.
pub fn make_sources(config: &SourcesConfig, hook: SourceHook) -> Sources {
    let default_base = config
        .default_base
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let pipes = config
        .entries
        .iter()
        .map(|(name, spec)| {
            let pipe = SourcePipe {
                name: name.clone(),
                globs: spec.globs().iter().map(str::to_string).collect(),
                base: spec.base().map(Path::to_path_buf).unwrap_or_else(|| default_base.clone()),
                hook: Rc::clone(&hook),
            };
            (name.clone(), pipe)
        })
        .collect();

    Sources { pipes }
}

fn expand(globs: &[String], base: &Path) -> Result<Vec<Entry>, SourceError> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        builder.add(GlobBuilder::new(glob).literal_separator(true).build()?);
    }
    let set = builder.build()?;

    let mut matched: Vec<Entry> = WalkDir::new(base)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(base).ok()?;
            set.is_match(rel)
                .then(|| Entry::new(entry.path(), base))
        })
        .collect();

    matched.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(matched)
}

/// Errors produced while expanding or spawning a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("invalid source glob: {0}")]
    Pattern(#[from] globset::Error),

    #[error("source '{name}' cannot reach its pipeline: {source}")]
    Hook {
        name: String,
        #[source]
        source: Box<dyn Error>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;

    fn passthrough_hook() -> SourceHook {
        Rc::new(|| Ok(LazyPipe::new()))
    }

    fn config(json: &str) -> SourcesConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn config_accepts_single_glob_or_list() {
        let cfg = config(
            r#"{
                "defaultBase": "assets",
                "scripts": ["js/**/*.js", "vendor/*.js"],
                "styles": "css/*.scss"
            }"#,
        );

        assert_eq!(cfg.default_base.as_deref(), Some(Path::new("assets")));
        assert_eq!(cfg.entries.len(), 2);

        let scripts: Vec<&str> = cfg.entries["scripts"].globs().iter().collect();
        assert_eq!(scripts, vec!["js/**/*.js", "vendor/*.js"]);
        let styles: Vec<&str> = cfg.entries["styles"].globs().iter().collect();
        assert_eq!(styles, vec!["css/*.scss"]);
    }

    #[test]
    fn per_source_base_overrides_default() {
        let cfg = config(
            r#"{
                "defaultBase": "src",
                "images": { "globs": "**/*.png", "base": "art" },
                "scripts": "**/*.js"
            }"#,
        );
        let sources = make_sources(&cfg, passthrough_hook());

        assert_eq!(sources.get("images").unwrap().base(), Path::new("art"));
        assert_eq!(sources.get("scripts").unwrap().base(), Path::new("src"));
    }

    #[test]
    fn missing_default_base_falls_back_to_cwd() {
        let cfg = config(r#"{ "scripts": "**/*.js" }"#);
        let sources = make_sources(&cfg, passthrough_hook());
        assert_eq!(sources.get("scripts").unwrap().base(), Path::new("."));
    }

    #[test]
    fn spawn_expands_globs_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();
        fs::write(dir.path().join("js/zeta.js"), "").unwrap();
        fs::write(dir.path().join("js/alpha.js"), "").unwrap();
        fs::write(dir.path().join("js/readme.md"), "").unwrap();

        let mut cfg = SourcesConfig::default();
        cfg.default_base = Some(dir.path().to_path_buf());
        cfg.entries.insert(
            "scripts".into(),
            SourceSpec::Globs(GlobList::One("js/*.js".into())),
        );

        let sources = make_sources(&cfg, passthrough_hook());
        let names: Vec<PathBuf> = sources
            .get("scripts")
            .unwrap()
            .spawn()
            .unwrap()
            .map(|e| e.relative().to_path_buf())
            .collect();

        assert_eq!(names, vec![PathBuf::from("js/alpha.js"), PathBuf::from("js/zeta.js")]);
    }

    #[test]
    fn hook_runs_at_spawn_time_only() {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let hook: SourceHook = Rc::new(move || {
            seen.set(seen.get() + 1);
            Ok(LazyPipe::new())
        });

        let dir = tempfile::tempdir().unwrap();
        let mut cfg = SourcesConfig::default();
        cfg.default_base = Some(dir.path().to_path_buf());
        cfg.entries.insert(
            "scripts".into(),
            SourceSpec::Globs(GlobList::One("*.js".into())),
        );

        let sources = make_sources(&cfg, hook);
        assert_eq!(calls.get(), 0);

        let pipe = sources.get("scripts").unwrap();
        let _ = pipe.spawn().unwrap();
        let _ = pipe.spawn().unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn hook_failure_names_the_source() {
        let hook: SourceHook = Rc::new(|| Err("not ready".into()));
        let mut cfg = SourcesConfig::default();
        cfg.entries.insert(
            "styles".into(),
            SourceSpec::Globs(GlobList::One("*.css".into())),
        );

        let sources = make_sources(&cfg, hook);
        // `Stream` is `Box<dyn Iterator>` and cannot implement `Debug`, so
        // `.unwrap_err()` won't type-check here; match to extract the error
        // with identical semantics.
        let err = match sources.get("styles").unwrap().spawn() {
            Ok(_) => panic!("expected spawn to fail"),
            Err(e) => e,
        };
        let msg = err.to_string();
        assert!(msg.contains("styles"));
        assert!(msg.contains("not ready"));
    }
}
