use super::*;

enum ThreadPoolDispatcherMessage {
    Execute(Thunk),
    Shutdown,
}

/// A fixed-size thread pool dispatcher that is backed by crossbeam_channel.
///
/// This is an MPMC queue whose producer handlers (senders) can be cloned
/// freely. Each worker thread holds a clone of the consumer handler
/// (receiver) and competes for jobs, so submissions are spread across all
/// workers without any coordination by the submitter.
///
/// If a worker thread panics while executing, a new thread is spawned to
/// take its place.
pub struct ThreadPoolDispatcher {
    sender: Sender<ThreadPoolDispatcherMessage>,
    num_workers: usize,
}

impl ThreadPoolDispatcher {
    /// Creates a new dispatcher with `parallelism` worker threads.
    pub fn new(parallelism: usize) -> Self {
        let (sender, receiver) = unbounded::<ThreadPoolDispatcherMessage>();

        for _ in 0..parallelism {
            Self::spawn_worker(receiver.clone());
        }

        Self {
            sender,
            num_workers: parallelism,
        }
    }

    fn spawn_worker(receiver: Receiver<ThreadPoolDispatcherMessage>) {
        struct Panicking {
            receiver: Receiver<ThreadPoolDispatcherMessage>,
        }

        impl Drop for Panicking {
            fn drop(&mut self) {
                if thread::panicking() {
                    ThreadPoolDispatcher::spawn_worker(self.receiver.clone());
                }
            }
        }

        thread::spawn(move || {
            let p = Panicking {
                receiver: receiver.clone(),
            };

            loop {
                match receiver.recv() {
                    Ok(ThreadPoolDispatcherMessage::Execute(work)) => {
                        work.apply();
                    }

                    Ok(ThreadPoolDispatcherMessage::Shutdown) => {
                        break;
                    }

                    Err(RecvError) => {
                        break;
                    }
                }
            }

            drop(p);
        });
    }
}

impl Dispatcher for ThreadPoolDispatcher {
    fn execute(&self, thunk: Thunk) {
        let _ = self.sender.send(ThreadPoolDispatcherMessage::Execute(thunk));
    }

    fn safe_clone(&self) -> Box<dyn Dispatcher + Send + Sync> {
        Box::new(Self {
            sender: self.sender.clone(),
            num_workers: self.num_workers,
        })
    }

    fn shutdown(self: Box<Self>) {
        // one message per worker; each worker consumes exactly one
        for _ in 0..self.num_workers {
            let _ = self.sender.send(ThreadPoolDispatcherMessage::Shutdown);
        }
    }
}

impl Clone for ThreadPoolDispatcher {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            num_workers: self.num_workers,
        }
    }
}
