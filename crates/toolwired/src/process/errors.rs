//! Defines the unified error surface for daemon launch and supervision.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use crate::dispatch::RegistrationError;
use crate::telemetry::TelemetryError;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Registering the built-in tools failed.
    #[error("failed to register tools: {source}")]
    Registration {
        /// Underlying registration error.
        #[source]
        source: RegistrationError,
    },
    /// Socket listener startup or teardown failed.
    #[error("socket listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// The status monitor thread panicked.
    #[error("status monitor thread panicked")]
    Monitor,
}

impl LaunchError {
    /// Whether the error happened before the server started accepting.
    #[must_use]
    pub const fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::Telemetry { .. }
                | Self::Registration { .. }
                | Self::Listener {
                    source: ListenerError::Resolve { .. }
                        | ListenerError::ResolveEmpty { .. }
                        | ListenerError::BindTcp { .. }
                        | ListenerError::LocalAddr { .. }
                        | ListenerError::NonBlocking { .. }
                        | ListenerError::Spawn { .. }
                }
        )
    }
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<RegistrationError> for LaunchError {
    fn from(source: RegistrationError) -> Self {
        Self::Registration { source }
    }
}

impl From<ListenerError> for LaunchError {
    fn from(source: ListenerError) -> Self {
        Self::Listener { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
