//! Connection lifecycle observers.

use std::sync::Arc;

use super::ConnectionSummary;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Receives connection lifecycle events published by the registry.
pub trait ConnectionObserver: Send + Sync {
    /// Invoked after a connection has been registered.
    fn connected(&self, summary: &ConnectionSummary);

    /// Invoked after a connection has been removed.
    fn disconnected(&self, summary: &ConnectionSummary);
}

impl<T> ConnectionObserver for Arc<T>
where
    T: ConnectionObserver,
{
    fn connected(&self, summary: &ConnectionSummary) {
        (**self).connected(summary);
    }

    fn disconnected(&self, summary: &ConnectionSummary) {
        (**self).disconnected(summary);
    }
}

/// Default observer that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredConnectionObserver;

impl StructuredConnectionObserver {
    /// Builds a new observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ConnectionObserver for StructuredConnectionObserver {
    fn connected(&self, summary: &ConnectionSummary) {
        tracing::info!(
            target: REGISTRY_TARGET,
            event = "connected",
            connection_id = summary.id,
            address = %summary.address,
            port = summary.port,
            "client connected"
        );
    }

    fn disconnected(&self, summary: &ConnectionSummary) {
        tracing::info!(
            target: REGISTRY_TARGET,
            event = "disconnected",
            connection_id = summary.id,
            address = %summary.address,
            port = summary.port,
            connected_for_secs = summary.connected_for_secs,
            "client disconnected"
        );
    }
}
