use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use mill_manifest::DependencyScope;
use mill_pipeline::Sources;

use crate::error::{BoxError, NamedRecipeError};
use crate::lazy::Lazy;
use crate::loader::Namespace;
use crate::options::{Config, Options};
use crate::resolve::{CapValue, Resolve};
use crate::scope::{local_scope, Scope};

/// A recipe body: capabilities, configuration and sources in, cached
/// result out. Runs at most once per loader invocation.
pub type RecipeFn = Rc<dyn Fn(&Scope, Config, Option<Sources>) -> Result<CapValue, BoxError>>;

/// Rewrites the recipe's deep-copied configuration before the body runs.
pub type ConfigFn = Rc<dyn Fn(&Scope, Config) -> Result<Config, BoxError>>;

/// What a recipe declares: a runnable body plus an optional
/// configuration transform.
pub struct RecipeDef {
    pub body: RecipeFn,
    pub config_transform: Option<ConfigFn>,
}

impl RecipeDef {
    pub fn new(
        body: impl Fn(&Scope, Config, Option<Sources>) -> Result<CapValue, BoxError> + 'static,
    ) -> Self {
        Self {
            body: Rc::new(body),
            config_transform: None,
        }
    }

    pub fn with_config_transform(
        mut self,
        transform: impl Fn(&Scope, Config) -> Result<Config, BoxError> + 'static,
    ) -> Self {
        self.config_transform = Some(Rc::new(transform));
        self
    }
}

impl fmt::Debug for RecipeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipeDef")
            .field("config_transform", &self.config_transform.is_some())
            .finish()
    }
}

/// Normalize a resolver-produced value into a recipe descriptor: either a
/// full descriptor, or a bare body.
pub(crate) fn normalize(name: &str, value: CapValue) -> Result<Rc<RecipeDef>, NamedRecipeError> {
    let value = match value.downcast::<RecipeDef>() {
        Ok(def) => return Ok(def),
        Err(value) => value,
    };
    match value.downcast::<RecipeFn>() {
        Ok(body) => Ok(Rc::new(RecipeDef {
            body: (*body).clone(),
            config_transform: None,
        })),
        Err(_) => Err(NamedRecipeError::contract(
            name,
            "dependency does not provide a recipe",
        )),
    }
}

type RecipeCell = Lazy<CapValue, NamedRecipeError>;

/// Ordered recipe accessors. Each entry memoizes its recipe's one-shot
/// construction; iteration order is registration order.
#[derive(Default)]
pub struct RecipeSet {
    cells: RefCell<Vec<(String, Rc<RecipeCell>)>>,
}

impl RecipeSet {
    pub(crate) fn register(&self, name: String, cell: RecipeCell) {
        self.cells.borrow_mut().push((name, Rc::new(cell)));
    }

    /// Resolve a recipe, constructing it on first access.
    pub fn get(&self, name: &str) -> Result<CapValue, NamedRecipeError> {
        let cell = self
            .cells
            .borrow()
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, cell)| Rc::clone(cell));
        match cell {
            Some(cell) => {
                cell.force(|| NamedRecipeError::contract(name, "circular recipe reference"))
            }
            None => Err(NamedRecipeError::contract(name, "unknown recipe")),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cells.borrow().iter().any(|(candidate, _)| candidate == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.cells.borrow().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.cells.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.borrow().is_empty()
    }
}

impl fmt::Debug for RecipeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipeSet").field("recipes", &self.names()).finish()
    }
}

/// Everything a recipe accessor needs to run its one-shot construction.
pub(crate) struct InitContext {
    pub resolver: Rc<dyn Resolve>,
    pub strip_prefix: String,
    pub dep_scope: DependencyScope,
    pub rename: BTreeMap<String, String>,
    pub options: Options,
}

/// The lazy accessor for one recipe.
///
/// Construction failures are tagged with the recipe's name; a deliberate
/// contract violation keeps its minimal display while anything else is
/// flagged as a crash. Panics are normalized into crashes so a misbehaving
/// recipe cannot take down the loader without a name attached.
pub(crate) fn recipe_cell(
    name: String,
    def: Rc<RecipeDef>,
    dir: Option<PathBuf>,
    ns: Weak<Namespace>,
    ctx: Rc<InitContext>,
) -> RecipeCell {
    Lazy::new(move || {
        tracing::debug!(recipe = %name, "initializing recipe");
        let ns = ns.upgrade().ok_or_else(|| {
            NamedRecipeError::contract(&name, "loader namespace dropped during initialization")
        })?;
        let attempt =
            catch_unwind(AssertUnwindSafe(|| init_recipe(&def, dir.as_deref(), &ns, &ctx)));
        match attempt {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(NamedRecipeError::classify(&name, &err)),
            Err(payload) => Err(NamedRecipeError::panic(&name, panic_text(payload))),
        }
    })
}

fn init_recipe(
    def: &RecipeDef,
    dir: Option<&Path>,
    ns: &Rc<Namespace>,
    ctx: &InitContext,
) -> Result<CapValue, BoxError> {
    let scope = local_scope(ns, ctx, dir)?;

    let config = ctx.options.clone();
    let mut config = match &def.config_transform {
        Some(transform) => transform(&scope, config)?,
        None => config,
    };

    let sources = match config.sources.as_mut() {
        Some(sources_config) => {
            // A recipe that sets no base of its own inherits the host's.
            if sources_config.default_base.is_none() {
                sources_config.default_base = ctx
                    .options
                    .sources
                    .as_ref()
                    .and_then(|s| s.default_base.clone());
            }
            Some(ns.utils().make_sources(sources_config))
        }
        None => None,
    };

    (def.body)(&scope, config, sources)
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "recipe panicked with a non-string payload".to_string()
    }
}
