use super::delay_heap::DelayHeap;
use super::TimerThunk;
use crate::dispatcher::{BoxedFn, Dispatcher};
use crossbeam::channel;
use std::thread;
use std::time::{Duration, Instant};

enum TimerEvent {
    Schedule { after: Duration, thunk: TimerThunk },
    Stop,
}

/// A handle to a running timer thread. Cloning it yields another handle
/// to the same thread, so any number of queues can share one timer.
#[derive(Clone)]
pub struct Timer {
    sender: channel::Sender<TimerEvent>,
}

impl Timer {
    /// Schedules `thunk` to run once, no earlier than `after` from now.
    ///
    /// Firing precision is governed by the platform's timer resolution;
    /// thunks are never run early.
    ///
    /// Returns `false` if the timer has stopped, in which case the thunk
    /// is dropped without ever running.
    pub fn after(&self, after: Duration, thunk: TimerThunk) -> bool {
        match self.sender.send(TimerEvent::Schedule { after, thunk }) {
            Ok(()) => true,

            Err(e) => {
                error!("failed to schedule timer: {}", e);
                false
            }
        }
    }

    /// Stops the timer thread. Thunks that have not yet fired are dropped
    /// without running.
    pub fn stop(self) {
        if let Some(e) = self.sender.send(TimerEvent::Stop).err() {
            error!("failed to stop timer: {}", e)
        }
    }
}

/// Configures and launches the timer thread.
///
/// The thread owns a deadline heap and sleeps until the earliest deadline
/// or the next scheduling request, whichever comes first. This is a
/// one-shot deadline timer, so precision tracks the OS timer resolution
/// rather than a fixed tick interval.
pub struct Scheduler {
    dispatcher: Option<Box<dyn Dispatcher + Send + 'static>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { dispatcher: None }
    }

    /// Configure a dispatcher to run expired thunks on. This separates the
    /// deadline-tracking workload from the task workload.
    ///
    /// If one is not configured, thunks without their own dispatcher run
    /// on the timer thread itself.
    pub fn with_dispatcher(mut self, dispatcher: Box<dyn Dispatcher + Send + 'static>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn run(mut self) -> Timer {
        let (sender, receiver) = channel::unbounded();

        let dispatcher = self.dispatcher.take();
        let mut heap = DelayHeap::new();

        thread::spawn(move || loop {
            let event = match heap.until_next(Instant::now()) {
                Some(timeout) => match receiver.recv_timeout(timeout) {
                    Ok(event) => Some(event),

                    Err(channel::RecvTimeoutError::Timeout) => None,

                    Err(channel::RecvTimeoutError::Disconnected) => {
                        return;
                    }
                },

                // nothing registered, so wait indefinitely for work
                None => match receiver.recv() {
                    Ok(event) => Some(event),

                    Err(channel::RecvError) => {
                        return;
                    }
                },
            };

            match event {
                Some(TimerEvent::Schedule { after, thunk }) => {
                    heap.push(Instant::now() + after, thunk);
                }

                Some(TimerEvent::Stop) => {
                    return;
                }

                None => {}
            }

            while let Some(thunk) = heap.pop_due(Instant::now()) {
                if let Some(d) = thunk.dispatcher {
                    d.execute(thunk.thunk);
                } else if let Some(ref d) = dispatcher {
                    d.execute(thunk.thunk);
                } else {
                    thunk.thunk.apply();
                }
            }
        });

        Timer { sender }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
