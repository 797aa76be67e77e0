//! Shared configuration for the toolwire daemon.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, an
//! optional TOML file (`--config-path` or `TOOLWIRE_CONFIG_PATH`),
//! `TOOLWIRE_*` environment variables, and finally command-line flags.

mod defaults;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT,
    DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_STATUS_INTERVAL_SECS, default_host, default_log_filter,
    default_log_filter_string, default_log_format, default_max_frame_bytes, default_port,
    default_shutdown_grace_ms, default_status_interval_secs,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TOOLWIRE")]
pub struct Config {
    /// Interface the TCP listener binds to.
    #[serde(default = "defaults::default_host")]
    #[ortho_config(default = defaults::default_host())]
    pub host: String,
    /// TCP port the listener binds to. Port `0` asks the OS for a free port.
    #[serde(default = "defaults::default_port")]
    #[ortho_config(default = defaults::default_port())]
    pub port: u16,
    /// `tracing` filter expression, for example `info` or `toolwired=debug`.
    #[serde(default = "defaults::default_log_filter_string")]
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log records.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Largest undelimited request accepted from a single connection.
    #[serde(default = "defaults::default_max_frame_bytes")]
    #[ortho_config(default = defaults::default_max_frame_bytes())]
    pub max_frame_bytes: usize,
    /// Seconds between periodic connection-count reports.
    #[serde(default = "defaults::default_status_interval_secs")]
    #[ortho_config(default = defaults::default_status_interval_secs())]
    pub status_interval_secs: u64,
    /// Milliseconds shutdown waits for in-flight requests before closing sockets.
    #[serde(default = "defaults::default_shutdown_grace_ms")]
    #[ortho_config(default = defaults::default_shutdown_grace_ms())]
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            max_frame_bytes: default_max_frame_bytes(),
            status_interval_secs: default_status_interval_secs(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Config {
    /// Host name or address the listener binds to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the listener binds to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for the tracing subscriber.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Frame size limit, or `None` when the limit is disabled with `0`.
    #[must_use]
    pub const fn max_frame_bytes(&self) -> Option<usize> {
        if self.max_frame_bytes == 0 {
            None
        } else {
            Some(self.max_frame_bytes)
        }
    }

    /// Interval between periodic status reports.
    #[must_use]
    pub const fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// Upper bound on how long shutdown waits for in-flight requests.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Human-readable `host:port` form of the listen address.
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_builtin_values() {
        let config = Config::default();
        assert_eq!(config.host(), DEFAULT_HOST);
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.max_frame_bytes(), Some(DEFAULT_MAX_FRAME_BYTES));
        assert_eq!(config.listen_address(), "127.0.0.1:13378");
    }

    #[test]
    fn bare_invocation_loads_builtin_defaults() {
        let config = Config::load_from_iter(["toolwired"]).expect("defaults should load");
        assert_eq!(config.host(), DEFAULT_HOST);
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.max_frame_bytes(), Some(DEFAULT_MAX_FRAME_BYTES));
        assert_eq!(config.status_interval_secs, DEFAULT_STATUS_INTERVAL_SECS);
        assert_eq!(config.shutdown_grace_ms, DEFAULT_SHUTDOWN_GRACE_MS);
    }

    #[test]
    fn zero_frame_limit_disables_the_limit() {
        let config = Config {
            max_frame_bytes: 0,
            ..Config::default()
        };
        assert_eq!(config.max_frame_bytes(), None);
    }

    #[test]
    fn durations_are_derived_from_raw_fields() {
        let config = Config {
            status_interval_secs: 5,
            shutdown_grace_ms: 250,
            ..Config::default()
        };
        assert_eq!(config.status_interval(), Duration::from_secs(5));
        assert_eq!(config.shutdown_grace(), Duration::from_millis(250));
    }
}
