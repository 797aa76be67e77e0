//! Supervises server launch sequencing and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Instant;

use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader};
use crate::dispatch::{Dispatcher, HandlerRegistry};
use crate::monitor::StatusMonitor;
use crate::registry::{ConnectionRegistry, StructuredConnectionObserver};
use crate::server::{ServerServices, ServerSettings, ToolServer};
use crate::telemetry;
use crate::tools::{ToolContext, register_builtin_tools};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to run the server.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) shutdown: S,
    /// Receives the bound address once the server accepts connections.
    pub(crate) ready: Option<Sender<SocketAddr>>,
}

/// Runs the server with production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// Returns a [`LaunchError`] when configuration, telemetry, tool
/// registration or binding fails, or when shutdown could not complete.
pub fn run_server() -> Result<(), LaunchError> {
    run_server_with(LaunchPlan {
        loader: SystemConfigLoader,
        shutdown: SystemShutdownSignal::new(),
        ready: None,
    })
}

/// Runs the server with injected collaborators.
pub(crate) fn run_server_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        shutdown,
        ready,
    } = plan;
    let started_at = Instant::now();

    let config = loader.load()?;
    telemetry::initialise(&config)?;
    info!(
        target: PROCESS_TARGET,
        address = %config.listen_address(),
        "starting server runtime"
    );

    let registry = Arc::new(ConnectionRegistry::new());
    registry.subscribe(Arc::new(StructuredConnectionObserver::new()));

    let server = ToolServer::bind(
        config.host(),
        config.port(),
        ServerSettings::from_config(&config),
    )?;
    let local_addr = server.local_addr();

    let mut handlers = HandlerRegistry::new();
    register_builtin_tools(
        &mut handlers,
        &ToolContext {
            connections: Arc::clone(&registry),
            port: local_addr.port(),
            started_at,
        },
    )?;
    info!(target: PROCESS_TARGET, tools = ?handlers.names(), "tools registered");

    let handle = server.start(ServerServices {
        dispatcher: Dispatcher::new(Arc::new(handlers)),
        registry: Arc::clone(&registry),
    })?;
    let monitor = StatusMonitor::start(Arc::clone(&registry), config.status_interval());

    if let Some(ready) = ready
        && ready.send(local_addr).is_err()
    {
        warn!(target: PROCESS_TARGET, "ready notification receiver dropped");
    }

    let signalled = shutdown.wait();
    let monitor_stopped = monitor.stop();
    handle.shutdown()?;
    signalled?;
    if !monitor_stopped {
        return Err(LaunchError::Monitor);
    }

    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
