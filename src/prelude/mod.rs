//! Common types necessary for most applications

pub use log::{debug, error, info, trace, warn};

pub use crate::cfg::{Config, DispatchConfig};
pub use crate::dispatcher::*;
pub use crate::queue::DelayedPreemptiveDispatchQueue;
pub use crate::system::DispatchSystem;
pub use crate::timer::{Scheduler, Timer, TimerThunk};
