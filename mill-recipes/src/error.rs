use std::error::Error;

/// Opaque error carried across the recipe boundary.
pub type BoxError = Box<dyn Error>;

/// A named capability could not be obtained by any resolution strategy.
///
/// `Clone` so a lazy cell can cache the first failure and re-surface it on
/// every later read; resolution is never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("module '{0}' not found")]
    NotFound(String),

    #[error("cannot load module '{name}': {detail}")]
    Load { name: String, detail: String },
}

impl ResolveError {
    pub fn load(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Load {
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A deliberate usage-contract violation, reported by a recipe or by the
/// loader itself. Displayed without a diagnostic trace by convention.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RecipeError {
    pub message: String,
}

impl RecipeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A failure tied to a specific recipe.
///
/// `trace` is present only when the failure was unexpected (a crash); the
/// exit path then shows the full diagnostic chain instead of the one-line
/// contract message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("in recipe '{recipe}': {message}")]
pub struct NamedRecipeError {
    pub recipe: String,
    pub message: String,
    pub trace: Option<String>,
}

impl NamedRecipeError {
    pub fn contract(recipe: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipe: recipe.into(),
            message: message.into(),
            trace: None,
        }
    }

    pub fn crash(recipe: impl Into<String>, err: &dyn Error) -> Self {
        Self {
            recipe: recipe.into(),
            message: err.to_string(),
            trace: Some(render_chain(err)),
        }
    }

    /// Normalize a non-error panic payload into a crash.
    pub fn panic(recipe: impl Into<String>, payload: String) -> Self {
        Self {
            recipe: recipe.into(),
            message: payload.clone(),
            trace: Some(format!("panic: {payload}")),
        }
    }

    /// Tag an error escaping a recipe body with the recipe's name,
    /// keeping contract violations minimal and flagging everything else
    /// as a crash. The whole source chain is inspected, so a contract
    /// violation stays recognizable through wrapper errors, including
    /// one already tagged by another recipe.
    pub fn classify(recipe: &str, err: &BoxError) -> Self {
        let mut current: Option<&dyn Error> = Some(err.as_ref());
        while let Some(frame) = current {
            if let Some(contract) = frame.downcast_ref::<RecipeError>() {
                return Self::contract(recipe, contract.to_string());
            }
            if let Some(named) = frame.downcast_ref::<NamedRecipeError>() {
                return Self {
                    recipe: recipe.to_string(),
                    message: named.to_string(),
                    trace: named.trace.clone(),
                };
            }
            current = frame.source();
        }
        Self::crash(recipe, err.as_ref())
    }

    pub fn is_crash(&self) -> bool {
        self.trace.is_some()
    }

    /// The formatted diagnostic the exit path prints: the one-line message
    /// for contract violations, the full chain for crashes.
    pub fn render(&self) -> String {
        match &self.trace {
            None => self.to_string(),
            Some(trace) => format!("{self}\n{trace}"),
        }
    }
}

/// Render an error and its source chain, one frame per line.
pub fn render_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}

/// Errors surfaced by the loader entry point.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("no project manifest found above {}", .0.display())]
    ManifestNotFound(std::path::PathBuf),

    #[error(transparent)]
    Manifest(#[from] mill_manifest::ManifestError),

    #[error(transparent)]
    Discover(#[from] mill_manifest::DiscoverError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Recipe(#[from] NamedRecipeError),

    #[error("cannot open local recipe '{name}': {detail}")]
    LocalRecipe { name: String, detail: String },
}

impl LoadError {
    /// The formatted diagnostic printed before a fatal exit.
    pub fn render(&self) -> String {
        match self {
            LoadError::Recipe(named) => named.render(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        source: std::io::Error,
    }

    #[test]
    fn contract_errors_render_without_a_trace() {
        let err = NamedRecipeError::contract("coffee", "missing sources config");
        assert!(!err.is_crash());
        assert_eq!(err.render(), "in recipe 'coffee': missing sources config");
    }

    #[test]
    fn crashes_render_the_full_chain() {
        let inner = std::io::Error::other("disk gone");
        let err = NamedRecipeError::crash("coffee", &Outer { source: inner });

        assert!(err.is_crash());
        let rendered = err.render();
        assert!(rendered.contains("in recipe 'coffee': outer failure"));
        assert!(rendered.contains("caused by: disk gone"));
    }

    #[test]
    fn classify_separates_contract_from_crash() {
        let contract: BoxError = Box::new(RecipeError::new("bad usage"));
        let named = NamedRecipeError::classify("sass", &contract);
        assert!(!named.is_crash());
        assert_eq!(named.message, "bad usage");

        let crash: BoxError = Box::new(std::io::Error::other("boom"));
        let named = NamedRecipeError::classify("sass", &crash);
        assert!(named.is_crash());
    }

    #[derive(Debug, thiserror::Error)]
    #[error("stream setup failed")]
    struct Wrapper {
        #[source]
        source: RecipeError,
    }

    #[test]
    fn classify_finds_contract_violations_through_wrappers() {
        let wrapped: BoxError = Box::new(Wrapper {
            source: RecipeError::new("stream created too early"),
        });
        let named = NamedRecipeError::classify("coffee", &wrapped);
        assert!(!named.is_crash());
        assert_eq!(named.message, "stream created too early");
    }

    #[test]
    fn classify_keeps_cross_recipe_tags() {
        let nested: BoxError = Box::new(NamedRecipeError::contract("inner", "bad wiring"));
        let named = NamedRecipeError::classify("outer", &nested);
        assert!(!named.is_crash());
        assert_eq!(named.recipe, "outer");
        assert!(named.message.contains("in recipe 'inner'"));
    }

    #[test]
    fn render_chain_walks_sources() {
        let err = Outer {
            source: std::io::Error::other("root cause"),
        };
        let chain = render_chain(&err);
        assert_eq!(chain, "outer failure\n  caused by: root cause");
    }

    #[test]
    fn not_found_is_distinguishable() {
        assert!(ResolveError::NotFound("x".into()).is_not_found());
        assert!(!ResolveError::load("x", "io error").is_not_found());
    }
}
