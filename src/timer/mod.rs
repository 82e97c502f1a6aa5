//! Timers are used to schedule work to be performed in the future

mod delay_heap;
mod scheduler;

use crate::dispatcher::{Dispatcher, Thunk};

/// A unit of work to be executed with an optional dispatcher to run it on.
///
/// If no dispatcher is attached, the thunk runs on whatever context the
/// timer designates, possibly the scheduling thread itself.
pub struct TimerThunk {
    pub(crate) thunk: Thunk,
    pub(crate) dispatcher: Option<Box<dyn Dispatcher + Send + 'static>>,
}

impl TimerThunk {
    pub fn new(thunk: Thunk) -> Self {
        Self {
            thunk,
            dispatcher: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Box<dyn Dispatcher + Send + 'static>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }
}

pub use self::scheduler::{Scheduler, Timer};
