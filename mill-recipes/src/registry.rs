use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use mill_manifest::{camelize, capability_name, DependencyScope, PackageManifest};

use crate::error::ResolveError;
use crate::lazy::Lazy;
use crate::resolve::{CapValue, Resolve};

/// Helper capabilities the loader publishes on its own when the project
/// manifest does not claim their names: a streaming helper, a collection
/// utility, a transform helper, and the file watcher.
pub const BUILTIN_CAPS: &[&str] = &["streams", "collections", "transform", "mill-watch"];

pub(crate) type CapCell = Lazy<CapValue, ResolveError>;

/// Name policy for building a registry from a manifest.
pub struct RegistrySpec<'a> {
    pub strip_prefix: &'a str,
    pub skip_exact: &'a [&'a str],
    pub skip_prefixes: &'a [&'a str],
    pub rename: &'a BTreeMap<String, String>,
}

/// Lazily resolved capability lookup, built once per loader invocation.
///
/// Every entry resolves on first read and is cached for the process
/// lifetime; nothing is loaded at construction time.
pub struct CapabilityRegistry {
    fixed: HashMap<String, CapValue>,
    entries: HashMap<String, CapCell>,
}

impl CapabilityRegistry {
    pub fn from_manifest(
        manifest: &PackageManifest,
        scope: DependencyScope,
        spec: &RegistrySpec<'_>,
        resolver: &Rc<dyn Resolve>,
    ) -> Self {
        let mut entries = HashMap::new();
        for raw in manifest.names(scope) {
            if spec.skip_exact.contains(&raw)
                || spec.skip_prefixes.iter().any(|p| raw.starts_with(p))
            {
                continue;
            }
            let key = capability_name(raw, spec.strip_prefix, spec.rename);
            entries.insert(key, lazy_entry(raw.to_string(), resolver));
        }
        tracing::debug!(capabilities = entries.len(), "capability registry built");
        Self {
            fixed: HashMap::new(),
            entries,
        }
    }

    /// Publish a non-lazy constant binding, replacing any lazy entry of
    /// the same name. Used for the single shared runner instance.
    pub fn define_fixed(&mut self, name: impl Into<String>, value: CapValue) {
        let name = name.into();
        self.entries.remove(&name);
        self.fixed.insert(name, value);
    }

    /// Publish the builtin helper set, skipping any name the manifest
    /// already provided. The entries stay one-shot lazy like everything
    /// else.
    pub fn publish_builtins(&mut self, strip_prefix: &str, resolver: &Rc<dyn Resolve>) {
        for &raw in BUILTIN_CAPS {
            let key = camelize(raw.strip_prefix(strip_prefix).unwrap_or(raw));
            if self.contains(&key) {
                continue;
            }
            self.entries.insert(key, lazy_entry(raw.to_string(), resolver));
        }
    }

    pub fn get(&self, name: &str) -> Result<CapValue, ResolveError> {
        if let Some(value) = self.fixed.get(name) {
            return Ok(Rc::clone(value));
        }
        match self.entries.get(name) {
            Some(cell) => cell.force(|| {
                ResolveError::load(name, "circular capability resolution")
            }),
            None => Err(ResolveError::NotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fixed.contains_key(name) || self.entries.contains_key(name)
    }

    /// All published capability keys, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .fixed
            .keys()
            .chain(self.entries.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }
}

fn lazy_entry(raw: String, resolver: &Rc<dyn Resolve>) -> CapCell {
    let resolver = Rc::clone(resolver);
    Lazy::new(move || {
        tracing::trace!(module = %raw, "resolving capability");
        resolver.resolve(&raw)
    })
}
