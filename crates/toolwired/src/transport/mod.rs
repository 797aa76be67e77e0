//! TCP transport for the JSON-RPC daemon.
//!
//! The listener binds the configured address and accepts connections on a
//! background thread. Each connection is served by an
//! [`RpcConnectionHandler`] session that frames, dispatches and answers
//! requests.

mod broadcast;
mod errors;
mod handler;
mod in_flight;
mod listener;
#[cfg(test)]
mod listener_tests;
mod session;
#[cfg(test)]
mod test_utils;

pub use self::broadcast::BroadcastReport;
pub(crate) use self::broadcast::broadcast_frame;
pub use self::errors::ListenerError;
pub(crate) use self::handler::ConnectionHandler;
pub(crate) use self::in_flight::InFlight;
pub(crate) use self::listener::{ListenerHandle, SocketListener};
pub use self::session::CONNECTED_NOTIFICATION;
pub(crate) use self::session::RpcConnectionHandler;
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");
