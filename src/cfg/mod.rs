//! Configuration

use std::collections::HashMap;
use std::{borrow, env, fmt, io, str};

/// A `Config` holds simple key/value pairings that are sourced
/// from a few layers, and provides methods to extract values.
///
/// A focus is on ergonomics, so copies are frequently employed. It
/// is intended to only be used during bootstrapping, allowing
/// developers to specify values at a few different layers.
///
/// Configuration values are layered, where by the environment
/// variables take highest precedence, followed by the application's
/// specified defaults (if any), followed by the library's fallback
/// defaults.
#[derive(Clone)]
pub struct Config {
    defaults: HashMap<String, String>,
}

impl Config {
    /// Create a new configuration with the specified defaults. These
    /// defaults are used for extracting configuration values if they
    /// are not defined in the environment.
    pub fn new(defaults: &[(&str, &str)]) -> Config {
        let defaults = {
            let mut map = HashMap::new();

            for (key, value) in defaults.iter() {
                map.insert(key.to_string(), value.to_string());
            }

            map
        };

        Config { defaults }
    }

    /// Create a new configuration with the specified fallback defaults. That is,
    /// they only take effect if not defined by the environment or already supplied
    /// defaults.
    pub fn with_fallback(&self, fallback_defaults: &[(&str, &str)]) -> Config {
        let mut cfg = Config {
            defaults: self.defaults.clone(),
        };

        for (key, value) in Self::new(fallback_defaults).defaults.into_iter() {
            cfg.defaults.entry(key).or_insert(value);
        }

        cfg
    }

    pub fn parsed<T: str::FromStr>(&self, name: &str) -> io::Result<T>
    where
        T::Err: fmt::Display,
    {
        let provided_result = env::var(&name)
            .ok()
            .or_else(|| self.defaults.get(name).map(borrow::ToOwned::to_owned))
            .map(|s| s.parse::<T>());

        match provided_result {
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("config missing: {}", name),
            )),
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("config parse error: {} {}", name, e),
            )),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: HashMap::new(),
        }
    }
}

/// Typed configuration for a `DispatchSystem`.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Number of worker threads in the shared pool dispatcher. A value
    /// of 0 sizes the pool to the number of CPUs.
    pub pool_parallelism: usize,

    /// Whether the system installs its own stderr logger on start. A
    /// logger already installed by the host application always wins.
    pub setup_logger: bool,

    pub log_config_on_start: bool,
}

impl DispatchConfig {
    #[rustfmt::skip]
    pub fn new(cfg: &Config) -> io::Result<Self> {
        let cfg = cfg.with_fallback(&[
            ("DELAYED_DISPATCH_POOL_PARALLELISM",    "0"),
            ("DELAYED_DISPATCH_SETUP_LOGGER",        "true"),
            ("DELAYED_DISPATCH_LOG_CONFIG_ON_START", "false"),
        ]);

        Ok(Self {
            pool_parallelism:    cfg.parsed("DELAYED_DISPATCH_POOL_PARALLELISM")
                                    .map(|n| if n == 0 { num_cpus::get() } else { n })?,
            setup_logger:        cfg.parsed("DELAYED_DISPATCH_SETUP_LOGGER")?,
            log_config_on_start: cfg.parsed("DELAYED_DISPATCH_LOG_CONFIG_ON_START")?,
        })
    }
}
