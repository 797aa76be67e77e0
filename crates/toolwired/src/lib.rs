//! JSON-RPC 2.0 tool server.
//!
//! Clients connect over TCP and exchange newline-delimited JSON-RPC messages.
//! Each frame is reassembled by the [`framer`], routed by the [`dispatch`]
//! layer to a registered tool, and answered on the same connection. Open
//! connections are tracked in a [`ConnectionRegistry`] that the server uses
//! for broadcast and shutdown and that tools read for status reporting.
//!
//! Requests on one connection run concurrently, so responses arrive in the
//! order handlers finish. Clients correlate them by `id`.
//!
//! The binary wires everything together through [`run_server`]: load
//! configuration, install telemetry, bind, register the built-in tools, and
//! serve until a termination signal arrives.

mod bootstrap;
pub mod dispatch;
pub mod framer;
mod monitor;
mod panics;
mod process;
pub mod registry;
mod server;
mod telemetry;
mod tools;
mod transport;

pub use bootstrap::{ConfigLoader, StaticConfigLoader, SystemConfigLoader};
pub use monitor::StatusMonitor;
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_server};
pub use registry::{
    ConnectionId, ConnectionMeta, ConnectionObserver, ConnectionRegistry, ConnectionSummary,
    FrameSink, StructuredConnectionObserver,
};
pub use server::{ServerHandle, ServerInfo, ServerServices, ServerSettings, ToolServer};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use tools::{ENGINE_VERSION, ToolContext, register_builtin_tools};
pub use transport::{BroadcastReport, CONNECTED_NOTIFICATION, ListenerError};

#[cfg(test)]
mod tests;
