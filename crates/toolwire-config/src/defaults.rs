//! Built-in defaults shared by the daemon and its tests.

use crate::logging::LogFormat;

/// Default interface the daemon binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port. Chosen to stay clear of the editor plugin's own 13377.
pub const DEFAULT_PORT: u16 = 13378;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Largest request line accepted before the connection is dropped.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Seconds between periodic connection-count reports.
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 60;

/// Milliseconds shutdown waits for in-flight requests to flush.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Owned default host used where allocation is required (e.g. serde).
pub fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

/// Default TCP port.
pub const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Default log filter expression used by the binaries.
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default frame size limit in bytes.
pub const fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

/// Default status report interval in seconds.
pub const fn default_status_interval_secs() -> u64 {
    DEFAULT_STATUS_INTERVAL_SECS
}

/// Default shutdown grace period in milliseconds.
pub const fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}
