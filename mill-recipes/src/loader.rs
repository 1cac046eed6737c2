use std::path::PathBuf;
use std::rc::Rc;

use mill_manifest::{
    capability_name, dev_install_present, discover, find_up, DependencyScope, DiscoveredRecipe,
    PackageManifest, VENDOR_DIR,
};

use crate::error::{BoxError, LoadError, ResolveError};
use crate::options::{Options, MANIFEST_FILE};
use crate::recipe::{normalize, recipe_cell, InitContext, RecipeDef, RecipeSet};
use crate::registry::{CapabilityRegistry, RegistrySpec};
use crate::resolve::{CapValue, Resolve};
use crate::session::{Session, Utils};

/// Capability key of the shared task-runner instance.
pub const RUNNER_CAP: &str = "mill";

/// The runner's own package name; never published as a capability.
const RUNNER_PKG: &str = "mill";

/// Prefix stripped from plugin dependency names.
const PLUGIN_PREFIX: &str = "mill-";

/// Dependencies carrying this prefix are recipes, not plugins.
const RECIPE_PREFIX: &str = "mill-recipe-";

/// This loader, as seen from a project manifest. Excluded from recipe
/// registration.
const LOADER_PKG: &str = "mill-recipe-loader";

/// Turns a discovered local recipe candidate into a descriptor. How a
/// candidate file maps to runnable code is entirely host policy.
pub trait RecipeSource {
    fn open(&self, candidate: &DiscoveredRecipe) -> Result<RecipeDef, BoxError>;
}

/// The host environment the loader runs in.
pub struct Host {
    /// Project root; the manifest walk-up and local discovery start here.
    pub root: PathBuf,
    pub resolver: Rc<dyn Resolve>,
    pub recipe_source: Option<Rc<dyn RecipeSource>>,
}

/// The namespace returned to the caller: every capability, the recipe
/// results, and the utility surface.
pub struct Namespace {
    registry: CapabilityRegistry,
    recipes: RecipeSet,
    utils: Utils,
    session: Rc<Session>,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace").finish_non_exhaustive()
    }
}

impl Namespace {
    pub(crate) fn new(registry: CapabilityRegistry, session: Rc<Session>) -> Rc<Self> {
        Rc::new(Self {
            registry,
            recipes: RecipeSet::default(),
            utils: Utils::new(Rc::clone(&session)),
            session,
        })
    }

    pub fn get(&self, name: &str) -> Result<CapValue, ResolveError> {
        self.registry.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn capability_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    pub fn recipes(&self) -> &RecipeSet {
        &self.recipes
    }

    pub fn utils(&self) -> &Utils {
        &self.utils
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Wire the namespace for one loader invocation.
///
/// Registration is cheap and lazy; the forced pass at the end triggers
/// every recipe accessor in registration order so construction failures
/// surface now, deterministically, instead of at some unrelated later
/// read. The first failure aborts the pass.
pub fn load(runner: CapValue, options: Options, host: &Host) -> Result<Rc<Namespace>, LoadError> {
    let manifest_path = match &options.package {
        Some(path) => path.clone(),
        None => find_up(&host.root, MANIFEST_FILE)
            .ok_or_else(|| LoadError::ManifestNotFound(host.root.clone()))?,
    };
    let manifest = PackageManifest::load(&manifest_path)?;

    let dep_scope = if dev_install_present(&host.root, &manifest) {
        DependencyScope::RuntimeAndDev
    } else {
        DependencyScope::Runtime
    };

    let spec = RegistrySpec {
        strip_prefix: PLUGIN_PREFIX,
        skip_exact: &[RUNNER_PKG],
        skip_prefixes: &[RECIPE_PREFIX],
        rename: &options.rename,
    };
    let mut registry =
        CapabilityRegistry::from_manifest(&manifest, dep_scope, &spec, &host.resolver);
    registry.define_fixed(RUNNER_CAP, runner);
    registry.publish_builtins(PLUGIN_PREFIX, &host.resolver);

    // Recipes declared in the manifest, resolved now so a missing recipe
    // dependency fails before anything initializes.
    let mut merged: Vec<(String, Rc<RecipeDef>, Option<PathBuf>)> = Vec::new();
    for raw in manifest.names(dep_scope) {
        if !raw.starts_with(RECIPE_PREFIX) || raw == LOADER_PKG {
            continue;
        }
        let name = capability_name(raw, RECIPE_PREFIX, &options.rename);
        let dir = host.root.join(VENDOR_DIR).join(raw);
        let def = normalize(&name, host.resolver.resolve(raw)?)?;
        merged.push((name, def, Some(dir)));
    }

    // Locally discovered recipes; a name collision replaces the external
    // entry in place, so the local recipe wins but keeps its slot in the
    // registration order.
    if let Some(source) = &host.recipe_source {
        for candidate in discover(&host.root, &options.recipes_pattern)? {
            let def = source.open(&candidate).map_err(|e| LoadError::LocalRecipe {
                name: candidate.name.clone(),
                detail: e.to_string(),
            })?;
            let entry = (candidate.name.clone(), Rc::new(def), None);
            match merged.iter_mut().find(|(name, ..)| *name == candidate.name) {
                Some(slot) => *slot = entry,
                None => merged.push(entry),
            }
        }
    }

    let session = Rc::new(Session::default());
    let ctx = Rc::new(InitContext {
        resolver: Rc::clone(&host.resolver),
        strip_prefix: PLUGIN_PREFIX.to_string(),
        dep_scope,
        rename: options.rename.clone(),
        options,
    });
    let ns = Namespace::new(registry, Rc::clone(&session));

    tracing::debug!(recipes = merged.len(), "registering recipe accessors");
    for (name, def, dir) in merged {
        let cell = recipe_cell(name.clone(), def, dir, Rc::downgrade(&ns), Rc::clone(&ctx));
        ns.recipes.register(name, cell);
    }

    // Forced pass: every accessor, in registration order.
    for name in ns.recipes.names() {
        ns.recipes.get(&name)?;
    }
    session.finish_initialization();

    Ok(ns)
}

/// `load`, but fatal: print the formatted diagnostic and terminate the
/// process with status 1 on any error.
pub fn load_or_exit(runner: CapValue, options: Options, host: &Host) -> Rc<Namespace> {
    match load(runner, options, host) {
        Ok(ns) => ns,
        Err(err) => {
            let rendered = err.render();
            tracing::error!("{rendered}");
            eprintln!("{rendered}");
            std::process::exit(1);
        }
    }
}
