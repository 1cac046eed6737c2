use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use mill_manifest::{capability_name, PackageManifest};

use crate::error::{BoxError, ResolveError};
use crate::lazy::Lazy;
use crate::loader::Namespace;
use crate::options::MANIFEST_FILE;
use crate::recipe::{InitContext, RecipeSet};
use crate::registry::CapCell;
use crate::resolve::{resolve_scoped, CapValue};
use crate::session::Utils;

/// A recipe's private view of the shared namespace.
///
/// Reads check the recipe's own lazily resolved entries first and fall
/// through to the shared namespace for everything else. No base entry is
/// ever copied, so a scope with no overrides is observationally identical
/// to the namespace itself, and nothing a scope defines can leak back.
pub struct Scope {
    locals: HashMap<String, CapCell>,
    ns: Rc<Namespace>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Result<CapValue, ResolveError> {
        match self.locals.get(name) {
            Some(cell) => cell.force(|| {
                ResolveError::load(name, "circular capability resolution")
            }),
            None => self.ns.get(name),
        }
    }

    pub fn has_override(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    /// The shared recipe accessors, for cross-recipe references.
    pub fn recipes(&self) -> &RecipeSet {
        self.ns.recipes()
    }

    pub fn utils(&self) -> &Utils {
        self.ns.utils()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.locals.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Scope").field("locals", &names).finish()
    }
}

/// Build a recipe's scope from its vendored installation directory.
///
/// When the directory carries its own manifest, every dependency it
/// declares becomes a lazy local override resolved against that directory
/// first and the shared strategy second. Without a directory or manifest
/// the scope is pure delegation.
pub(crate) fn local_scope(
    ns: &Rc<Namespace>,
    ctx: &InitContext,
    dir: Option<&Path>,
) -> Result<Scope, BoxError> {
    let mut locals = HashMap::new();

    if let Some(dir) = dir {
        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.is_file() {
            let manifest = PackageManifest::load(&manifest_path)?;
            for raw in manifest.names(ctx.dep_scope) {
                let key = capability_name(raw, &ctx.strip_prefix, &ctx.rename);
                let resolver = Rc::clone(&ctx.resolver);
                let dir = dir.to_path_buf();
                let raw = raw.to_string();
                locals.insert(
                    key,
                    Lazy::new(move || resolve_scoped(&resolver, &dir, &raw)),
                );
            }
        }
    }

    Ok(Scope {
        locals,
        ns: Rc::clone(ns),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::InitContext;
    use crate::registry::{CapabilityRegistry, RegistrySpec};
    use crate::resolve::{Resolve, StaticResolver};
    use crate::session::Session;
    use mill_manifest::DependencyScope;
    use std::collections::BTreeMap;
    use std::fs;

    fn namespace(resolver: &Rc<dyn Resolve>) -> Rc<Namespace> {
        let manifest: PackageManifest = toml::from_str(
            r#"[dependencies]
"mill-coffee" = "1""#,
        )
        .unwrap();
        let rename = BTreeMap::new();
        let registry = CapabilityRegistry::from_manifest(
            &manifest,
            DependencyScope::Runtime,
            &RegistrySpec {
                strip_prefix: "mill-",
                skip_exact: &[],
                skip_prefixes: &[],
                rename: &rename,
            },
            resolver,
        );
        Namespace::new(registry, Rc::new(Session::default()))
    }

    fn context(resolver: Rc<dyn Resolve>) -> InitContext {
        InitContext {
            resolver,
            strip_prefix: "mill-".to_string(),
            dep_scope: DependencyScope::Runtime,
            rename: BTreeMap::new(),
            options: crate::options::Options::default(),
        }
    }

    #[test]
    fn override_free_scope_matches_the_base() {
        let mut resolver = StaticResolver::new();
        resolver.provide("mill-coffee", Rc::new("shared brew") as CapValue);
        let resolver: Rc<dyn Resolve> = Rc::new(resolver);

        let ns = namespace(&resolver);
        let scope = local_scope(&ns, &context(Rc::clone(&resolver)), None).unwrap();

        let via_scope = scope.get("coffee").unwrap();
        let via_ns = ns.get("coffee").unwrap();
        assert!(Rc::ptr_eq(&via_scope, &via_ns));
        assert!(!scope.has_override("coffee"));
    }

    #[test]
    fn vendored_manifest_shadows_the_shared_entry() {
        let vendor = tempfile::tempdir().unwrap();
        fs::write(
            vendor.path().join("Mill.toml"),
            "[dependencies]\n\"mill-coffee\" = \"2\"\n",
        )
        .unwrap();

        let mut resolver = StaticResolver::new();
        resolver.provide("mill-coffee", Rc::new("shared brew") as CapValue);
        resolver.provide_in(vendor.path(), "mill-coffee", Rc::new("pinned brew") as CapValue);
        let resolver: Rc<dyn Resolve> = Rc::new(resolver);

        let ns = namespace(&resolver);
        let scope =
            local_scope(&ns, &context(Rc::clone(&resolver)), Some(vendor.path())).unwrap();

        assert!(scope.has_override("coffee"));
        let pinned = scope.get("coffee").unwrap();
        assert_eq!(*pinned.downcast::<&str>().unwrap(), "pinned brew");

        // The shared namespace still sees its own entry.
        let shared = ns.get("coffee").unwrap();
        assert_eq!(*shared.downcast::<&str>().unwrap(), "shared brew");
    }

    #[test]
    fn local_entry_falls_back_to_the_shared_strategy() {
        let vendor = tempfile::tempdir().unwrap();
        fs::write(
            vendor.path().join("Mill.toml"),
            "[dependencies]\n\"mill-sass\" = \"1\"\n",
        )
        .unwrap();

        // Nothing vendored for mill-sass; only the shared strategy knows it.
        let mut resolver = StaticResolver::new();
        resolver.provide("mill-sass", Rc::new("shared sass") as CapValue);
        let resolver: Rc<dyn Resolve> = Rc::new(resolver);

        let ns = namespace(&resolver);
        let scope =
            local_scope(&ns, &context(Rc::clone(&resolver)), Some(vendor.path())).unwrap();

        let value = scope.get("sass").unwrap();
        assert_eq!(*value.downcast::<&str>().unwrap(), "shared sass");
    }

    #[test]
    fn missing_vendored_manifest_means_pure_delegation() {
        let vendor = tempfile::tempdir().unwrap();
        let resolver: Rc<dyn Resolve> = Rc::new(StaticResolver::new());

        let ns = namespace(&resolver);
        let scope =
            local_scope(&ns, &context(Rc::clone(&resolver)), Some(vendor.path())).unwrap();
        assert!(!scope.has_override("coffee"));
    }

    #[test]
    fn broken_vendored_manifest_is_an_error() {
        let vendor = tempfile::tempdir().unwrap();
        fs::write(vendor.path().join("Mill.toml"), "not [valid toml").unwrap();
        let resolver: Rc<dyn Resolve> = Rc::new(StaticResolver::new());

        let ns = namespace(&resolver);
        assert!(local_scope(&ns, &context(Rc::clone(&resolver)), Some(vendor.path())).is_err());
    }
}
