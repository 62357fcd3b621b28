//! Logging setup and the bounded warning channel
//!
//! Everything logs through the `log` facade. [`init`] / [`init_with_config`]
//! install an `env_logger` backend exactly once. [`WarnBudget`] caps the
//! recoverable per-draw warnings (missing uniforms, missing attributes) so a
//! misconfigured program cannot flood the log every frame.

use std::fmt;
use std::sync::Once;

pub use log::{debug, info, warn, error, trace};

use crate::core::config::LoggingConfig;

static INIT: Once = Once::new();

/// Initialize the logging system with defaults (`RUST_LOG` or `info`)
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Initialize the logging system once; later calls are ignored
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = &config.filter {
            builder.parse_filters(filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(config.level.to_filter());
        }

        if config.is_test {
            builder.is_test(true);
        }

        // A logger may already be installed by the host application.
        if builder.try_init().is_ok() {
            log::debug!("logging initialized");
        }
    });
}

/// Counter that stops forwarding warnings after a fixed number
#[derive(Debug, Clone)]
pub struct WarnBudget {
    limit: u32,
    emitted: u32,
}

impl WarnBudget {
    /// Create a budget that allows `limit` warnings
    pub fn new(limit: u32) -> Self {
        Self { limit, emitted: 0 }
    }

    /// Log a warning if the budget is not exhausted
    ///
    /// Returns whether the message was emitted. The warning that exhausts the
    /// budget is followed by a single notice that further warnings are muted.
    pub fn warn(&mut self, message: fmt::Arguments<'_>) -> bool {
        if self.emitted >= self.limit {
            return false;
        }
        log::warn!("{}", message);
        self.emitted += 1;
        if self.emitted == self.limit {
            log::warn!("More than {} renderer warnings - stopping logs.", self.limit);
        }
        true
    }

    /// Number of warnings emitted so far
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Whether further warnings are suppressed
    pub fn exhausted(&self) -> bool {
        self.emitted >= self.limit
    }
}

impl Default for WarnBudget {
    fn default() -> Self {
        Self::new(100)
    }
}
