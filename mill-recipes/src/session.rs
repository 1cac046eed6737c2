use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mill_pipeline::{make_sources, sequential, LazyPipe, Sources, SourcesConfig};

use crate::error::RecipeError;

/// The pipe kind every recipe's file stream is routed through.
pub const PROCESS_SOURCE: &str = "processSource";

/// State owned by one loader invocation.
///
/// Recipes register pipe contributions while they initialize; the
/// composite process-source pipe can only be assembled once every recipe
/// has finished, otherwise later contributions would silently be missing
/// from the chain.
#[derive(Debug, Default)]
pub struct Session {
    initialized: Cell<bool>,
    pipes: RefCell<Vec<(String, LazyPipe)>>,
    process_source: RefCell<Option<LazyPipe>>,
}

impl Session {
    pub fn initialized(&self) -> bool {
        self.initialized.get()
    }

    pub(crate) fn finish_initialization(&self) {
        self.initialized.set(true);
    }

    /// Contribute a pipe under the given kind. Contribution order is
    /// preserved.
    pub fn register_pipe(&self, kind: impl Into<String>, pipe: LazyPipe) {
        self.pipes.borrow_mut().push((kind.into(), pipe));
    }

    /// Every contribution of the given kind, in contribution order.
    pub fn pipes(&self, kind: &str) -> Vec<LazyPipe> {
        self.pipes
            .borrow()
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, pipe)| pipe.clone())
            .collect()
    }

    /// The composite process-source pipe, assembled exactly once.
    ///
    /// Calling this before initialization completes is a contract
    /// violation every time; the error is never cached as the pipe.
    pub fn process_source_hook(&self) -> Result<LazyPipe, RecipeError> {
        if !self.initialized.get() {
            return Err(RecipeError::new(
                "stream created before all recipes are initialized",
            ));
        }
        if let Some(pipe) = self.process_source.borrow().as_ref() {
            return Ok(pipe.clone());
        }
        let built = sequential(self.pipes(PROCESS_SOURCE));
        *self.process_source.borrow_mut() = Some(built.clone());
        Ok(built)
    }
}

/// The utility surface recipes see as `utils`.
#[derive(Debug, Clone)]
pub struct Utils {
    session: Rc<Session>,
}

impl Utils {
    pub(crate) fn new(session: Rc<Session>) -> Self {
        Self { session }
    }

    pub fn register_pipe(&self, kind: impl Into<String>, pipe: LazyPipe) {
        self.session.register_pipe(kind, pipe);
    }

    pub fn get_pipes(&self, kind: &str) -> Vec<LazyPipe> {
        self.session.pipes(kind)
    }

    /// Chain pipes in contribution order.
    pub fn sequential_lazypipe(&self, pipes: Vec<LazyPipe>) -> LazyPipe {
        sequential(pipes)
    }

    /// Build named sources whose streams feed the deferred process-source
    /// pipe. The hook is consulted at spawn time, so sources may be
    /// declared while recipes are still initializing.
    pub fn make_sources(&self, config: &SourcesConfig) -> Sources {
        let session = Rc::clone(&self.session);
        make_sources(
            config,
            Rc::new(move || session.process_source_hook().map_err(Into::into)),
        )
    }
}
