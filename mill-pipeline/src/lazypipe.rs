use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// One unit of work flowing through a source pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub base: PathBuf,
}

impl Entry {
    pub fn new(path: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            base: base.into(),
        }
    }

    /// Path relative to the entry's base, falling back to the full path.
    pub fn relative(&self) -> &Path {
        self.path.strip_prefix(&self.base).unwrap_or(&self.path)
    }
}

/// A live stream of entries.
pub type Stream = Box<dyn Iterator<Item = Entry>>;

/// A single transform over a live stream.
pub type Stage = Box<dyn FnOnce(Stream) -> Stream>;

type StageFactory = Rc<dyn Fn() -> Stage>;

/// An ordered sequence of stage factories.
///
/// Nothing is instantiated until `spawn`; every spawn builds fresh stages,
/// so one pipe can back any number of streams. Chaining with `pipe` leaves
/// the receiver untouched.
#[derive(Clone, Default)]
pub struct LazyPipe {
    stages: Vec<StageFactory>,
}

impl LazyPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage factory, returning the extended pipe.
    pub fn pipe<F, S>(&self, factory: F) -> LazyPipe
    where
        F: Fn() -> S + 'static,
        S: FnOnce(Stream) -> Stream + 'static,
    {
        let mut stages = self.stages.clone();
        stages.push(Rc::new(move || Box::new(factory()) as Stage));
        LazyPipe { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Instantiate every stage in order and run `input` through them.
    pub fn spawn(&self, input: Stream) -> Stream {
        self.stages.iter().fold(input, |stream, factory| factory()(stream))
    }
}

impl fmt::Debug for LazyPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyPipe").field("stages", &self.stages.len()).finish()
    }
}

/// Chain pipes into one composite pipe, preserving contribution order.
pub fn sequential<I>(pipes: I) -> LazyPipe
where
    I: IntoIterator<Item = LazyPipe>,
{
    let mut stages = Vec::new();
    for pipe in pipes {
        stages.extend(pipe.stages);
    }
    LazyPipe { stages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn entries(names: &[&str]) -> Stream {
        let items: Vec<Entry> = names.iter().map(|n| Entry::new(*n, ".")).collect();
        Box::new(items.into_iter())
    }

    fn tag(suffix: &'static str) -> impl Fn() -> Box<dyn FnOnce(Stream) -> Stream> {
        move || {
            Box::new(move |stream: Stream| -> Stream {
                Box::new(stream.map(move |mut e| {
                    let tagged = format!("{}{suffix}", e.path.display());
                    e.path = tagged.into();
                    e
                }))
            })
        }
    }

    fn collect(stream: Stream) -> Vec<String> {
        stream.map(|e| e.path.display().to_string()).collect()
    }

    #[test]
    fn stages_run_in_order() {
        let pipe = LazyPipe::new().pipe(tag(".a")).pipe(tag(".b"));
        assert_eq!(collect(pipe.spawn(entries(&["x"]))), vec!["x.a.b"]);
    }

    #[test]
    fn spawn_rebuilds_stages_every_time() {
        let built = Rc::new(Cell::new(0));
        let counter = Rc::clone(&built);
        let pipe = LazyPipe::new().pipe(move || {
            counter.set(counter.get() + 1);
            Box::new(|stream: Stream| stream)
        });

        assert_eq!(built.get(), 0);
        let _ = collect(pipe.spawn(entries(&["x"])));
        let _ = collect(pipe.spawn(entries(&["y"])));
        assert_eq!(built.get(), 2);
    }

    #[test]
    fn pipe_does_not_mutate_the_receiver() {
        let base = LazyPipe::new().pipe(tag(".a"));
        let extended = base.pipe(tag(".b"));

        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert_eq!(collect(base.spawn(entries(&["x"]))), vec!["x.a"]);
    }

    #[test]
    fn sequential_preserves_contribution_order() {
        let first = LazyPipe::new().pipe(tag(".1"));
        let second = LazyPipe::new().pipe(tag(".2")).pipe(tag(".3"));

        let combined = sequential([first, second]);
        assert_eq!(combined.len(), 3);
        assert_eq!(collect(combined.spawn(entries(&["x"]))), vec!["x.1.2.3"]);
    }

    #[test]
    fn empty_pipe_passes_entries_through() {
        let pipe = LazyPipe::new();
        assert!(pipe.is_empty());
        assert_eq!(collect(pipe.spawn(entries(&["x", "y"]))), vec!["x", "y"]);
    }

    #[test]
    fn relative_strips_base() {
        let entry = Entry::new("src/app/main.rs", "src");
        assert_eq!(entry.relative(), Path::new("app/main.rs"));

        let outside = Entry::new("elsewhere/main.rs", "src");
        assert_eq!(outside.relative(), Path::new("elsewhere/main.rs"));
    }
}
