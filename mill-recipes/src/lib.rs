pub mod error;
pub mod lazy;
pub mod loader;
pub mod options;
pub mod recipe;
pub mod registry;
pub mod resolve;
pub mod scope;
pub mod session;

// Re-export key types for convenience.
pub use error::{render_chain, BoxError, LoadError, NamedRecipeError, RecipeError, ResolveError};
pub use lazy::Lazy;
pub use loader::{load, load_or_exit, Host, Namespace, RecipeSource, RUNNER_CAP};
pub use options::{Config, Options, DEFAULT_RECIPES_PATTERN, MANIFEST_FILE};
pub use recipe::{ConfigFn, RecipeDef, RecipeFn, RecipeSet};
pub use registry::{CapabilityRegistry, RegistrySpec, BUILTIN_CAPS};
pub use resolve::{resolve_scoped, CapValue, FallbackResolver, Resolve, StaticResolver};
pub use scope::Scope;
pub use session::{Session, Utils, PROCESS_SOURCE};
