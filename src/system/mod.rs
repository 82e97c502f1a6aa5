//! System bootstrap: configuration, logging, and shared timer/dispatcher wiring

use crate::cfg::{Config, DispatchConfig};
use crate::dispatcher::{Dispatcher, ThreadPoolDispatcher};
use crate::queue::DelayedPreemptiveDispatchQueue;
use crate::timer::{Scheduler, Timer};
use fern::colors::{Color, ColoredLevelConfig};
use std::io;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// A `DispatchSystem` owns the shared resources that delayed preemptive
/// dispatch queues run on: a pool dispatcher sized from configuration, and
/// a timer thread that executes expirations on that pool.
///
/// Any number of queues can be minted from one system; they share its
/// timer and dispatcher. Dropping the system without calling `shutdown`
/// leaves the pool running for the queues that were minted from it.
pub struct DispatchSystem {
    config: DispatchConfig,
    dispatcher: ThreadPoolDispatcher,
    timer: Timer,
}

impl DispatchSystem {
    /// Creates a system configured from the environment alone.
    pub fn new() -> io::Result<Self> {
        Self::with_config(&Config::default())
    }

    /// Creates a system from the supplied configuration, with the
    /// environment taking precedence as usual.
    pub fn with_config(cfg: &Config) -> io::Result<Self> {
        let config = DispatchConfig::new(cfg)?;

        if config.setup_logger {
            LOGGER.call_once(|| {
                if Self::setup_logger().is_err() {
                    // the host application installed its own logger first
                }
            });
        }

        if config.log_config_on_start {
            info!("configuration: {:?}", config);
        }

        let dispatcher = ThreadPoolDispatcher::new(config.pool_parallelism);

        let timer = Scheduler::new()
            .with_dispatcher(Box::new(dispatcher.clone()))
            .run();

        Ok(Self {
            config,
            dispatcher,
            timer,
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Mints a queue that schedules its delays on this system's timer and
    /// runs its completed tasks on this system's pool.
    pub fn queue(&self) -> DelayedPreemptiveDispatchQueue {
        DelayedPreemptiveDispatchQueue::new(&self.timer)
            .with_dispatcher(Box::new(self.dispatcher.clone()))
    }

    /// Stops the timer thread and the pool workers. Delays that have not
    /// yet expired are dropped without running their waves' tasks.
    pub fn shutdown(self) {
        self.timer.stop();

        let dispatcher: Box<dyn Dispatcher + Send + Sync> = Box::new(self.dispatcher);
        dispatcher.shutdown();
    }

    fn setup_logger() -> Result<(), fern::InitError> {
        let mut colors = ColoredLevelConfig::new();
        colors.info = Color::Blue;
        let tty = atty::is(atty::Stream::Stderr);

        fern::Dispatch::new()
            .format(move |out, message, record| {
                if tty {
                    out.finish(format_args!(
                        "{} {} [{}] {}",
                        chrono::Local::now().to_rfc3339(),
                        colors.color(record.level()),
                        record.target(),
                        message
                    ))
                } else {
                    out.finish(format_args!(
                        "{} {} [{}] {}",
                        chrono::Local::now().to_rfc3339(),
                        record.level(),
                        record.target(),
                        message
                    ))
                }
            })
            .level(log::LevelFilter::Info)
            .chain(std::io::stderr())
            .apply()?;
        Ok(())
    }
}
