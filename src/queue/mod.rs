//! The delayed preemptive dispatch queue

use crate::dispatcher::Dispatcher;
use crate::timer::{Timer, TimerThunk};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// The pending task slot. `Fn` rather than `FnOnce` because a queue may be
/// reused across waves with the same task, and an `Arc` so the drain path
/// can lift the task out of the locked region before running it.
type Task = Arc<dyn Fn() + Send + Sync + 'static>;

struct State {
    task: Option<Task>,
    dispatcher: Option<Box<dyn Dispatcher + Send + Sync>>,
    outstanding: usize,
    open: bool,
    cancelled: bool,
}

struct Inner {
    state: Mutex<State>,
}

/// With a `DelayedPreemptiveDispatchQueue`, you can delay execution of some
/// task for a period of time, then later extend that time or preempt
/// execution of the task, either by replacing it with some other task or by
/// cancelling it altogether.
///
/// The task may be provided via `with_task`, `delay_task`, or a combination
/// of both. Neither the delay times nor the tasks need be the same with each
/// call. Only the last task submitted will be called, once _all_ outstanding
/// delay timers have expired. While you cannot cancel the timers themselves,
/// you can cancel execution of the pending task via `cancel`. Once all
/// timers have expired, the queue can be reused, with or without supplying
/// a new task.
///
/// Every delay submitted while the queue is non-empty joins the current
/// wave, and the wave drains only when its longest-outstanding timer has
/// elapsed -- a later, shorter delay never makes the task run sooner.
pub struct DelayedPreemptiveDispatchQueue {
    timer: Timer,
    inner: Arc<Inner>,
}

impl DelayedPreemptiveDispatchQueue {
    /// Creates an empty queue whose delay timers run on the supplied timer.
    ///
    /// Until a task is provided, calls to `delay` take no action.
    pub fn new(timer: &Timer) -> Self {
        Self {
            timer: timer.clone(),
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    task: None,
                    dispatcher: None,
                    outstanding: 0,
                    open: false,
                    cancelled: false,
                }),
            }),
        }
    }

    /// Stashes `task` to be executed once a wave of delay timers has
    /// expired. Equivalent to passing the task to the first `delay_task`
    /// call instead.
    pub fn with_task<F>(self, task: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.state.lock().task = Some(Arc::new(task));
        self
    }

    /// Configure a dispatcher to run the completed wave's task on.
    ///
    /// If one is not configured, the task runs on the timer's execution
    /// context.
    pub fn with_dispatcher(self, dispatcher: Box<dyn Dispatcher + Send + Sync>) -> Self {
        self.inner.state.lock().dispatcher = Some(dispatcher);
        self
    }

    /// Executes the pending task no earlier than after the given delay.
    ///
    /// Subsequent calls preempt execution of the pending task. If no task
    /// has been provided -- here, at construction, or by an earlier
    /// submission -- this call takes no action.
    pub fn delay(&self, after: Duration) {
        self.submit(after, None)
    }

    /// Executes `task` no earlier than after the given delay, replacing
    /// whatever task was pending.
    ///
    /// The delay will be longer than `after` if a previously submitted
    /// delay expires later than this one.
    pub fn delay_task<F>(&self, after: Duration, task: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.submit(after, Some(Arc::new(task)))
    }

    /// Cancels execution of the pending task.
    ///
    /// Already-scheduled delay timers keep running and the queue becomes
    /// empty once they have all expired; only the task's execution is
    /// suppressed. Any subsequent `delay` or `delay_task` call clears the
    /// cancellation and the last-submitted task remains available to run.
    pub fn cancel(&self) {
        self.inner.state.lock().cancelled = true;
    }

    /// `true` when no wave of delay timers is outstanding -- before the
    /// first submission, and again once every timer of a wave has expired.
    ///
    /// This flips back to `true` at the moment a wave drains; the wave's
    /// task may still be executing on the completion dispatcher at that
    /// point.
    pub fn is_empty(&self) -> bool {
        !self.inner.state.lock().open
    }

    fn submit(&self, after: Duration, task: Option<Task>) {
        {
            let mut state = self.inner.state.lock();

            if let Some(task) = task {
                state.task = Some(task);
            }

            // without a task there is nothing to schedule
            if state.task.is_none() {
                return;
            }

            // a new submission always preempts a prior cancellation
            state.cancelled = false;

            state.outstanding += 1;
            state.open = true;
        }

        let inner = self.inner.clone();

        let scheduled = self.timer.after(
            after,
            TimerThunk::new(Box::new(move || inner.timer_elapsed())),
        );

        // a stopped timer will never run the thunk, so take this timer
        // back out of the wave rather than leaving it open forever
        if !scheduled {
            let mut state = self.inner.state.lock();

            state.outstanding -= 1;

            if state.outstanding == 0 {
                state.open = false;
            }
        }
    }
}

impl Inner {
    /// Runs on every timer expiry. The expiry that returns the wave's
    /// outstanding count to zero is the one that drains it: it samples the
    /// cancellation flag, lifts out the task, and closes the wave, all
    /// under the state lock, so exactly one completion happens per wave.
    fn timer_elapsed(&self) {
        let completion = {
            let mut state = self.state.lock();

            state.outstanding -= 1;

            if state.outstanding > 0 {
                return;
            }

            let task = if state.cancelled {
                None
            } else {
                state.task.clone()
            };

            state.open = false;

            task.map(|task| (task, state.dispatcher.as_ref().map(|d| d.safe_clone())))
        };

        if let Some((task, dispatcher)) = completion {
            match dispatcher {
                Some(dispatcher) => {
                    dispatcher.execute(Box::new(move || task()));
                }

                None => {
                    task();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ThreadPoolDispatcher;
    use crate::testkit::*;
    use crate::timer::Scheduler;
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_last_task_wins() {
        let timer = Scheduler::new().run();
        let queue = DelayedPreemptiveDispatchQueue::new(&timer);

        let token = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(AtomicUsize::new(0));

        let submit = |after: u64, value: usize| {
            let token = token.clone();
            let fired = fired.clone();

            queue.delay_task(Duration::from_millis(after), move || {
                token.store(value, Ordering::SeqCst);
                fired.fetch_add(1, Ordering::SeqCst);
            });
        };

        submit(200, 1);
        submit(250, 2);
        submit(100, 3);

        eventually(Duration::from_millis(3000), {
            let fired = fired.clone();

            move || fired.load(Ordering::SeqCst) == 1
        });

        assert_eq!(token.load(Ordering::SeqCst), 3);

        // give the earlier tasks a chance to misfire

        thread::sleep(Duration::from_millis(300));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(token.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_wave_drains_at_longest_delay() {
        let timer = Scheduler::new().run();
        let queue = DelayedPreemptiveDispatchQueue::new(&timer);

        let fired = Arc::new(AtomicBool::new(false));
        let start = Instant::now();

        {
            let fired = fired.clone();

            queue.delay_task(Duration::from_millis(250), move || {
                fired.store(true, Ordering::SeqCst);
            });
        }

        // a shorter follow-up delay must not make the task run sooner
        queue.delay(Duration::from_millis(50));

        eventually(Duration::from_millis(3000), {
            let fired = fired.clone();

            move || fired.load(Ordering::SeqCst)
        });

        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_cancel_suppresses_task_but_wave_drains() {
        let timer = Scheduler::new().run();
        let queue = DelayedPreemptiveDispatchQueue::new(&timer);

        let fired = Arc::new(AtomicBool::new(false));

        {
            let fired = fired.clone();

            queue.delay_task(Duration::from_millis(100), move || {
                fired.store(true, Ordering::SeqCst);
            });
        }

        assert!(!queue.is_empty());

        queue.cancel();

        eventually(Duration::from_millis(3000), {
            let inner = queue.inner.clone();

            move || !inner.state.lock().open
        });

        assert!(!fired.load(Ordering::SeqCst));

        // a fresh submission is unaffected by the stale cancellation and
        // reuses the last-submitted task

        queue.delay(Duration::from_millis(50));

        eventually(Duration::from_millis(3000), move || {
            fired.load(Ordering::SeqCst)
        });
    }

    #[test]
    fn test_no_task_is_a_noop() {
        let timer = Scheduler::new().run();
        let queue = DelayedPreemptiveDispatchQueue::new(&timer);

        queue.delay(Duration::from_millis(10));

        assert!(queue.is_empty());

        thread::sleep(Duration::from_millis(100));

        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_with_nothing_pending_is_harmless() {
        let timer = Scheduler::new().run();
        let queue = DelayedPreemptiveDispatchQueue::new(&timer);

        queue.cancel();

        assert!(queue.is_empty());

        let fired = Arc::new(AtomicBool::new(false));

        {
            let fired = fired.clone();

            queue.delay_task(Duration::from_millis(20), move || {
                fired.store(true, Ordering::SeqCst);
            });
        }

        eventually(Duration::from_millis(3000), move || {
            fired.load(Ordering::SeqCst)
        });
    }

    #[test]
    fn test_construction_task_runs() {
        let timer = Scheduler::new().run();

        let fired = Arc::new(AtomicBool::new(false));

        let queue = {
            let fired = fired.clone();

            DelayedPreemptiveDispatchQueue::new(&timer).with_task(move || {
                fired.store(true, Ordering::SeqCst);
            })
        };

        queue.delay(Duration::from_millis(20));

        eventually(Duration::from_millis(3000), move || {
            fired.load(Ordering::SeqCst)
        });
    }

    #[test]
    fn test_reuse_after_drain() {
        let timer = Scheduler::new().run();
        let queue = DelayedPreemptiveDispatchQueue::new(&timer);

        let fired = Arc::new(AtomicUsize::new(0));

        {
            let fired = fired.clone();

            queue.delay_task(Duration::from_millis(20), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        eventually(Duration::from_millis(3000), {
            let fired = fired.clone();

            move || fired.load(Ordering::SeqCst) == 1
        });

        // the same task runs again on the next wave without being resupplied

        queue.delay(Duration::from_millis(20));

        eventually(Duration::from_millis(3000), {
            let fired = fired.clone();

            move || fired.load(Ordering::SeqCst) == 2
        });
    }

    #[test]
    fn test_dispatcher_configurable_after_submission() {
        let pool = ThreadPoolDispatcher::new(2);
        let timer = Scheduler::new().run();

        let fired = Arc::new(AtomicUsize::new(0));

        let queue = DelayedPreemptiveDispatchQueue::new(&timer);

        {
            let fired = fired.clone();

            queue.delay_task(Duration::from_millis(100), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        // the wave is already in flight and its thunk shares the queue
        // internals; attaching the completion dispatcher must still work
        let queue = queue.with_dispatcher(Box::new(pool));

        eventually(Duration::from_millis(3000), {
            let fired = fired.clone();

            move || fired.load(Ordering::SeqCst) == 1
        });

        assert!(queue.is_empty());
    }

    #[test]
    fn test_submit_after_timer_stop_leaves_queue_empty() {
        let timer = Scheduler::new().run();

        let fired = Arc::new(AtomicBool::new(false));

        let queue = {
            let fired = fired.clone();

            DelayedPreemptiveDispatchQueue::new(&timer).with_task(move || {
                fired.store(true, Ordering::SeqCst);
            })
        };

        timer.stop();

        // wait for the timer thread to exit so the send visibly fails
        thread::sleep(Duration::from_millis(100));

        queue.delay(Duration::from_millis(10));

        assert!(queue.is_empty());

        thread::sleep(Duration::from_millis(100));

        assert!(queue.is_empty());
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_race_condition() {
        let pool = ThreadPoolDispatcher::new(8);
        let timer = Scheduler::new()
            .with_dispatcher(Box::new(pool.clone()))
            .run();

        let state = Arc::new(AtomicUsize::new(0));
        let final_state = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(AtomicUsize::new(0));

        let queue = {
            let state = state.clone();
            let final_state = final_state.clone();
            let fired = fired.clone();

            DelayedPreemptiveDispatchQueue::new(&timer)
                .with_dispatcher(Box::new(pool))
                .with_task(move || {
                    final_state.store(state.load(Ordering::SeqCst), Ordering::SeqCst);
                    fired.fetch_add(1, Ordering::SeqCst);
                })
        };

        let upper_bound = 8000;
        let mut rng = rand::thread_rng();

        for i in 0..upper_bound {
            state.store(i, Ordering::SeqCst);
            queue.delay(Duration::from_millis(rng.gen_range(100..600)));
        }

        eventually(Duration::from_millis(10000), {
            let fired = fired.clone();

            move || fired.load(Ordering::SeqCst) == 1
        });

        // if the drain raced, the count either misses zero or passes
        // through it more than once

        assert_eq!(final_state.load(Ordering::SeqCst), upper_bound - 1);

        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // the queue must be reusable for a second batch of the same size

        for i in 0..upper_bound {
            state.store(i, Ordering::SeqCst);
            queue.delay(Duration::from_millis(rng.gen_range(100..350)));
        }

        eventually(Duration::from_millis(10000), {
            let fired = fired.clone();

            move || fired.load(Ordering::SeqCst) == 2
        });

        assert_eq!(final_state.load(Ordering::SeqCst), upper_bound - 1);
    }

    #[test]
    fn test_queue_is_shareable_across_threads() {
        let timer = Scheduler::new().run();

        let fired = Arc::new(AtomicUsize::new(0));

        let queue = {
            let fired = fired.clone();

            Arc::new(
                DelayedPreemptiveDispatchQueue::new(&timer).with_task(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();

                thread::spawn(move || {
                    for _ in 0..100 {
                        queue.delay(Duration::from_millis(300));
                    }
                })
            })
            .collect();

        for handle in handles {
            let _ = handle.join();
        }

        eventually(Duration::from_millis(5000), {
            let fired = fired.clone();

            move || fired.load(Ordering::SeqCst) == 1
        });

        thread::sleep(Duration::from_millis(200));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
