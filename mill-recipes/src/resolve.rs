use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::ResolveError;

/// An opaque, shared capability value. Memoization guarantees the same
/// `Rc` on every lookup, so identity checks use `Rc::ptr_eq`.
pub type CapValue = Rc<dyn Any>;

/// How the host turns a dependency name into a value.
///
/// The loader never touches the filesystem for module resolution itself;
/// everything behind this seam is host policy.
pub trait Resolve {
    fn resolve(&self, name: &str) -> Result<CapValue, ResolveError>;

    /// Directory-scoped lookup for vendored installs. Hosts without a
    /// directory-aware strategy report a miss.
    fn resolve_in(&self, dir: &Path, name: &str) -> Result<CapValue, ResolveError> {
        let _ = dir;
        Err(ResolveError::NotFound(name.to_string()))
    }
}

/// Chains a primary strategy with a fallback for linked development
/// installs: the fallback runs only on a not-found miss, and when it also
/// fails the *primary* strategy's error is the one surfaced.
pub struct FallbackResolver {
    primary: Rc<dyn Resolve>,
    fallback: Rc<dyn Resolve>,
}

impl FallbackResolver {
    pub fn new(primary: Rc<dyn Resolve>, fallback: Rc<dyn Resolve>) -> Self {
        Self { primary, fallback }
    }
}

impl Resolve for FallbackResolver {
    fn resolve(&self, name: &str) -> Result<CapValue, ResolveError> {
        match self.primary.resolve(name) {
            Err(original) if original.is_not_found() => {
                self.fallback.resolve(name).map_err(|_| original)
            }
            other => other,
        }
    }

    fn resolve_in(&self, dir: &Path, name: &str) -> Result<CapValue, ResolveError> {
        match self.primary.resolve_in(dir, name) {
            Err(original) if original.is_not_found() => {
                self.fallback.resolve_in(dir, name).map_err(|_| original)
            }
            other => other,
        }
    }
}

/// Vendored-directory-first resolution for a recipe's private
/// dependencies: the recipe's own install wins, the shared strategy backs
/// it up, and a double miss reports the first failure.
pub fn resolve_scoped(
    resolver: &Rc<dyn Resolve>,
    dir: &Path,
    name: &str,
) -> Result<CapValue, ResolveError> {
    match resolver.resolve_in(dir, name) {
        Err(original) if original.is_not_found() => {
            resolver.resolve(name).map_err(|_| original)
        }
        other => other,
    }
}

type Factory = Rc<dyn Fn() -> Result<CapValue, ResolveError>>;

/// An in-memory resolver populated up front. Hosts with statically linked
/// extensions register them here; tests do the same.
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, Factory>,
    scoped: HashMap<(PathBuf, String), Factory>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready value under `name`.
    pub fn provide(&mut self, name: impl Into<String>, value: CapValue) {
        self.provide_with(name, move || Ok(Rc::clone(&value)));
    }

    /// Register a factory under `name`; it runs on every resolver call,
    /// so laziness and memoization stay the registry's business.
    pub fn provide_with(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Result<CapValue, ResolveError> + 'static,
    ) {
        self.entries.insert(name.into(), Rc::new(factory));
    }

    /// Register a value visible only to directory-scoped lookups.
    pub fn provide_in(&mut self, dir: impl Into<PathBuf>, name: impl Into<String>, value: CapValue) {
        self.scoped
            .insert((dir.into(), name.into()), Rc::new(move || Ok(Rc::clone(&value))));
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, name: &str) -> Result<CapValue, ResolveError> {
        match self.entries.get(name) {
            Some(factory) => factory(),
            None => Err(ResolveError::NotFound(name.to_string())),
        }
    }

    fn resolve_in(&self, dir: &Path, name: &str) -> Result<CapValue, ResolveError> {
        match self.scoped.get(&(dir.to_path_buf(), name.to_string())) {
            Some(factory) => factory(),
            None => Err(ResolveError::NotFound(name.to_string())),
        }
    }
}
