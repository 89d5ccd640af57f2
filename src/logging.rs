//! Logging and tracing initialization.
//!
//! Logs go to stderr so stdout only carries command results (task ids, JSON).
//! Both pretty console output and JSON output are supported.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log target of the library crate.
const LIB_TARGET: &str = "globus_condor";
/// Log target of the `globus` binary (`main` and error reporting).
const BIN_TARGET: &str = "globus";

/// Configuration for the logging system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Number of `-v` flags given
    pub verbosity: u8,
    /// Running without a terminal, e.g. as a scheduler job
    pub unattended: bool,
}

impl LogConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    ///
    /// Unattended runs always log at debug so the job's error file carries
    /// the whole story. Three or more `-v` open every target, HTTP included.
    pub fn default_directive(&self) -> String {
        let level = match self.verbosity {
            0 if self.unattended => Level::DEBUG,
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => return Level::TRACE.as_str().to_lowercase(),
        };
        let level = level.as_str().to_lowercase();
        format!("{LIB_TARGET}={level},{BIN_TARGET}={level}")
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// This should be called early in main(), after config is loaded.
/// The log level can be overridden at runtime via the `RUST_LOG` environment variable.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(config.verbosity >= 2)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(config.verbosity >= 2),
            )
            .init();
    }
}

/// A rate limiter for throttling log messages.
///
/// Used by polling loops whose per-iteration message would otherwise flood
/// the job log.
pub struct LogThrottle {
    interval_ms: u64,
    /// Stores the last log time in ms, or u64::MAX to indicate "never logged"
    last_log_ms: AtomicU64,
    start: Instant,
}

/// Sentinel value indicating the throttle has never logged
const NEVER_LOGGED: u64 = u64::MAX;

impl LogThrottle {
    /// Create a new throttle with the given minimum interval between logs.
    pub fn new(interval: std::time::Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            last_log_ms: AtomicU64::new(NEVER_LOGGED),
            start: Instant::now(),
        }
    }

    /// Returns true if enough time has passed since the last log.
    pub fn should_log(&self) -> bool {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let last = self.last_log_ms.load(Ordering::Relaxed);

        let should = last == NEVER_LOGGED || now_ms.saturating_sub(last) >= self.interval_ms;

        if should {
            self.last_log_ms
                .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        } else {
            false
        }
    }
}
