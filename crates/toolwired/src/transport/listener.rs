//! TCP listener and accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{ConnectionHandler, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to a TCP address but not yet accepting.
#[derive(Debug)]
pub(crate) struct SocketListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SocketListener {
    /// Resolves `host` and binds the first address it yields.
    pub(crate) fn bind(host: &str, port: u16) -> Result<Self, ListenerError> {
        let listener = bind_tcp(host, port)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound, with the OS-assigned port when `0` was asked.
    pub(crate) const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Moves the listener onto a background accept thread.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("toolwire-accept".to_owned())
            .spawn(move || run_accept_loop(&self, &shutdown_flag, &handler))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background accept thread.
///
/// The listening socket is owned by that thread and closed when it exits, so
/// [`ListenerHandle::join`] returning means the port has been released.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop. New connections are refused from the
    /// next poll onwards.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been requested.
    #[cfg(test)]
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Waits for the accept thread to exit and drop the listener.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        address = %listener.local_addr,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(&listener.listener) {
            Ok(Some((stream, peer))) => {
                last_error = None;
                // A connection that raced the shutdown flag is dropped unserved.
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                spawn_session(Arc::clone(handler), stream, peer);
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    debug!(
        target: LISTENER_TARGET,
        address = %listener.local_addr,
        "socket listener closed"
    );
}

/// Serves `stream` on its own thread. When the OS refuses a thread the
/// connection is dropped and the accept loop carries on.
fn spawn_session(handler: Arc<dyn ConnectionHandler>, stream: TcpStream, peer: SocketAddr) {
    let spawned = thread::Builder::new().spawn(move || handler.handle(stream, peer));
    if let Err(error) = spawned {
        warn!(
            target: LISTENER_TARGET,
            peer = %peer,
            error = %error,
            "failed to start connection thread, dropping connection"
        );
    }
}

fn accept_connection(listener: &TcpListener) -> io::Result<Option<(TcpStream, SocketAddr)>> {
    match listener.accept() {
        Ok((stream, peer)) => {
            stream.set_nonblocking(false)?;
            Ok(Some((stream, peer)))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}
