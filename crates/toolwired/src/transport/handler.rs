//! Connection handling abstraction for the listener.

use std::net::{SocketAddr, TcpStream};

/// Handles accepted socket connections.
///
/// Each call runs on its own thread and owns the stream until it returns.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream, peer: SocketAddr);
}
