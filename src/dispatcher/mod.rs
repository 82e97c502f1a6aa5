//! Dispatchers execute work on a pool of threads

mod pool;

use crossbeam::channel::{unbounded, Receiver, RecvError, Sender};
use std::thread;

pub use self::pool::ThreadPoolDispatcher;

/// A `Dispatcher` is a service that can execute `Thunk`s, which
/// are boxed functions.
///
/// Timer expirations and wave completions are both executed on a
/// dispatcher, keeping the scheduling thread free to track deadlines.
///
/// Given the shared nature of a dispatcher, to ensure high
/// throughput, it shouldn't be blocked with long running tasks.
pub trait Dispatcher {
    /// Execute the thunk on this dispatcher
    fn execute(&self, thunk: Thunk);

    fn safe_clone(&self) -> Box<dyn Dispatcher + Send + Sync>;

    fn shutdown(self: Box<Self>);
}

pub trait BoxedFn {
    #[inline(always)]
    fn apply(self: Box<Self>);
}

impl<F: FnOnce()> BoxedFn for F {
    #[inline(always)]
    fn apply(self: Box<F>) {
        (*self)()
    }
}

pub type Thunk = Box<dyn BoxedFn + Send + 'static>;
