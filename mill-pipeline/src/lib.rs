pub mod lazypipe;
pub mod sources;

// Re-export key types for convenience.
pub use lazypipe::{sequential, Entry, LazyPipe, Stage, Stream};
pub use sources::{
    make_sources, GlobList, SourceError, SourceHook, SourcePipe, SourceSpec, Sources,
    SourcesConfig,
};
