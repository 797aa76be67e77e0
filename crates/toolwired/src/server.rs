//! Socket server tying the listener, sessions and registry together.
//!
//! [`ToolServer::bind`] reserves the port and reports bind failures before any
//! thread is started. [`ToolServer::start`] moves the listener onto its accept
//! thread and returns a [`ServerHandle`] used to broadcast and shut down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use toolwire_config::Config;

use crate::dispatch::{Dispatcher, encode_frame};
use crate::registry::ConnectionRegistry;
use crate::transport::{
    BroadcastReport, InFlight, ListenerError, ListenerHandle, RpcConnectionHandler,
    SocketListener, broadcast_frame,
};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Name and version announced to clients on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// Runtime knobs of the socket server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Longest accepted frame, or `None` for no limit.
    pub max_frame_bytes: Option<usize>,
    /// How long shutdown waits for in-flight requests.
    pub shutdown_grace: Duration,
    /// Identity announced to clients.
    pub info: ServerInfo,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServerSettings {
    /// Derives the settings from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_frame_bytes: config.max_frame_bytes(),
            shutdown_grace: config.shutdown_grace(),
            info: ServerInfo::default(),
        }
    }
}

/// Shared collaborators every connection uses.
#[derive(Debug, Clone)]
pub struct ServerServices {
    /// Dispatcher over the frozen handler table.
    pub dispatcher: Dispatcher,
    /// Registry of open connections.
    pub registry: Arc<ConnectionRegistry>,
}

/// A bound but not yet accepting server.
#[derive(Debug)]
pub struct ToolServer {
    listener: SocketListener,
    settings: ServerSettings,
}

impl ToolServer {
    /// Binds `host:port`. Port `0` asks the OS for a free port.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the host cannot be resolved or the
    /// address cannot be bound, for example because it is already in use.
    pub fn bind(host: &str, port: u16, settings: ServerSettings) -> Result<Self, ListenerError> {
        let listener = SocketListener::bind(host, port)?;
        Ok(Self { listener, settings })
    }

    /// Address actually bound.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Starts accepting connections on a background thread.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the listener cannot be switched to
    /// non-blocking mode.
    pub fn start(self, services: ServerServices) -> Result<ServerHandle, ListenerError> {
        let Self { listener, settings } = self;
        let local_addr = listener.local_addr();
        let in_flight = InFlight::new();
        let closing = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(RpcConnectionHandler::new(
            services.dispatcher,
            Arc::clone(&services.registry),
            Arc::clone(&in_flight),
            settings.max_frame_bytes,
            settings.info,
            Arc::clone(&closing),
        ));
        let listener = listener.start(handler)?;
        info!(target: SERVER_TARGET, address = %local_addr, "server started");
        Ok(ServerHandle {
            listener,
            registry: services.registry,
            in_flight,
            closing,
            local_addr,
            shutdown_grace: settings.shutdown_grace,
        })
    }
}

/// Control handle of a running server.
#[derive(Debug)]
pub struct ServerHandle {
    listener: ListenerHandle,
    registry: Arc<ConnectionRegistry>,
    in_flight: Arc<InFlight>,
    closing: Arc<AtomicBool>,
    local_addr: SocketAddr,
    shutdown_grace: Duration,
}

impl ServerHandle {
    /// Address the server is listening on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Registry of open connections.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Requests currently being handled across all connections.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Serializes `message` once and writes it to every open connection.
    ///
    /// # Errors
    ///
    /// Returns the serializer error when `message` cannot be encoded. Write
    /// failures on individual connections are reported in the
    /// [`BroadcastReport`] instead.
    pub fn broadcast<T: Serialize + ?Sized>(
        &self,
        message: &T,
    ) -> Result<BroadcastReport, serde_json::Error> {
        let frame = encode_frame(message)?;
        let report = broadcast_frame(&self.registry, &frame);
        debug!(
            target: SERVER_TARGET,
            delivered = report.delivered,
            failed = report.failed.len(),
            "broadcast complete"
        );
        Ok(report)
    }

    /// Stops the server.
    ///
    /// New connections are refused first. Open connections stop reading, get
    /// up to the configured grace period to finish their in-flight requests,
    /// and are then closed. Returns once the accept thread has exited and the
    /// listening socket is closed.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the accept thread panicked.
    pub fn shutdown(self) -> Result<(), ListenerError> {
        let Self {
            listener,
            registry,
            in_flight,
            closing,
            local_addr,
            shutdown_grace,
        } = self;
        info!(
            target: SERVER_TARGET,
            address = %local_addr,
            connections = registry.count(),
            "server shutting down"
        );
        listener.shutdown();
        // Sessions registering after this point close themselves.
        closing.store(true, Ordering::SeqCst);

        for (id, sink) in registry.sinks() {
            if let Err(error) = sink.close_read() {
                debug!(target: SERVER_TARGET, connection = id, %error, "failed to stop reading");
            }
        }

        if !in_flight.wait_idle(shutdown_grace) {
            warn!(
                target: SERVER_TARGET,
                pending = in_flight.count(),
                grace_ms = shutdown_grace.as_millis(),
                "grace period elapsed with requests still in flight"
            );
        }

        close_all(&registry);
        listener.join()?;
        // Connections accepted while the flag was being raised.
        close_all(&registry);

        info!(target: SERVER_TARGET, address = %local_addr, "server stopped");
        Ok(())
    }
}

fn close_all(registry: &ConnectionRegistry) {
    for (id, sink) in registry.sinks() {
        if let Err(error) = sink.close() {
            debug!(target: SERVER_TARGET, connection = id, %error, "failed to close connection");
        }
    }
}
