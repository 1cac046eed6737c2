use std::cell::RefCell;
use std::fmt;

type Init<T, E> = Box<dyn FnOnce() -> Result<T, E>>;

enum State<T, E> {
    Pending(Init<T, E>),
    Resolving,
    Ready(T),
    Failed(E),
}

/// A one-shot memoization cell.
///
/// The initializer runs on first force; the outcome (value or failure) is
/// cached for every later read. A force that re-enters the same cell while
/// it is still resolving is reported through `on_cycle` instead of
/// deadlocking or running the initializer twice.
pub struct Lazy<T, E> {
    state: RefCell<State<T, E>>,
}

impl<T, E> Lazy<T, E>
where
    T: Clone,
    E: Clone,
{
    pub fn new(init: impl FnOnce() -> Result<T, E> + 'static) -> Self {
        Self {
            state: RefCell::new(State::Pending(Box::new(init))),
        }
    }

    /// A cell that is already resolved.
    pub fn ready(value: T) -> Self {
        Self {
            state: RefCell::new(State::Ready(value)),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*self.state.borrow(), State::Ready(_) | State::Failed(_))
    }

    pub fn force(&self, on_cycle: impl FnOnce() -> E) -> Result<T, E> {
        let init = {
            let mut state = self.state.borrow_mut();
            match std::mem::replace(&mut *state, State::Resolving) {
                State::Pending(init) => init,
                State::Ready(value) => {
                    *state = State::Ready(value.clone());
                    return Ok(value);
                }
                State::Failed(err) => {
                    *state = State::Failed(err.clone());
                    return Err(err);
                }
                // Already mid-resolution: leave the marker in place and
                // report the cycle to the re-entrant caller.
                State::Resolving => return Err(on_cycle()),
            }
        };

        // The borrow is released here, so the initializer may force other
        // cells (or re-enter this one and take the cycle branch above).
        let result = init();

        let mut state = self.state.borrow_mut();
        match result {
            Ok(value) => {
                *state = State::Ready(value.clone());
                Ok(value)
            }
            Err(err) => {
                *state = State::Failed(err.clone());
                Err(err)
            }
        }
    }
}

impl<T, E> fmt::Debug for Lazy<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &*self.state.borrow() {
            State::Pending(_) => "pending",
            State::Resolving => "resolving",
            State::Ready(_) => "ready",
            State::Failed(_) => "failed",
        };
        f.debug_tuple("Lazy").field(&label).finish()
    }
}
