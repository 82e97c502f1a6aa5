//! # Delayed Dispatch
//!
//! With a delayed preemptive dispatch queue, you can delay execution of some
//! task for a period of time, then later extend that time or preempt execution
//! of the task, either by replacing it with some other task or by cancelling
//! it altogether.
//!
//! Every outstanding delay belongs to one logical wave, and the queue fires
//! exactly one action -- the most recently submitted task -- only once every
//! delay in the wave has elapsed. Once a wave has drained, the queue may be
//! reused, with or without supplying a new task.

extern crate atty;
extern crate chrono;
extern crate crossbeam;
extern crate fern;
extern crate parking_lot;

#[macro_use]
extern crate log;

pub mod cfg;
pub mod dispatcher;
pub mod prelude;
pub mod queue;
pub mod system;
pub mod timer;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
