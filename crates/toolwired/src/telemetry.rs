//! Structured telemetry initialisation for the daemon.

use std::io::{self, IsTerminal};
use std::panic;

use once_cell::sync::OnceCell;
use tracing::{Subscriber, debug, error, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use toolwire_config::{Config, LogFormat};

use crate::panics;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

const PANIC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::panic");

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber and panic hook on first use.
///
/// Repeated calls are idempotent: only the first invocation touches global
/// state. Later calls return a fresh [`TelemetryHandle`].
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparseable `log_filter` and
/// [`TelemetryError::Subscriber`] when another global subscriber was
/// installed outside this function.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| {
            install_subscriber(config)?;
            install_panic_hook();
            Ok(())
        })
        .map(|()| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

/// Routes panic reports through `tracing` so they reach the structured log.
///
/// Panics recovered at the dispatch boundary are already reported as handler
/// failures and only get a debug record here.
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let message = panics::payload_message(info.payload());
        let location = info.location().map_or_else(
            || "unknown".to_owned(),
            |location| format!("{}:{}", location.file(), location.line()),
        );
        if panics::is_contained() {
            debug!(target: PANIC_TARGET, panic = message, %location, "handler panic contained");
            return;
        }
        let thread = std::thread::current();
        error!(
            target: PANIC_TARGET,
            panic = message,
            %location,
            thread = thread.name().unwrap_or("unnamed"),
            "thread panicked"
        );
    }));
}
