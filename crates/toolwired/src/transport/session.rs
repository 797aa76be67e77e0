//! Per-connection request loop.
//!
//! The reader thread owns the socket's read half and a [`LineFramer`]. Every
//! complete frame is handed to a fresh worker thread, so a slow handler never
//! holds up later requests on the same connection and responses are written
//! in the order handlers finish.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::dispatch::{DispatchError, Dispatcher, Notification, RequestId, Response, encode_frame};
use crate::framer::{FrameError, LineFramer};
use crate::registry::{ConnectionId, ConnectionMeta, ConnectionRegistry, FrameSink};
use crate::server::ServerInfo;

use super::in_flight::InFlight;
use super::{ConnectionHandler, SESSION_TARGET};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Requests one connection may have running at once. Reading pauses while
/// the limit is reached.
pub(crate) const MAX_WORKERS_PER_CONNECTION: usize = 64;

/// Method of the notification sent to every client on connect.
pub const CONNECTED_NOTIFICATION: &str = "notifications/connected";

/// Write half of an accepted TCP connection.
///
/// Writes are serialized through a mutex so concurrent workers never
/// interleave frames. A second clone of the stream is kept for shutdown so
/// closing never waits on a writer.
#[derive(Debug)]
pub(crate) struct TcpFrameSink {
    writer: Mutex<TcpStream>,
    control: TcpStream,
}

impl TcpFrameSink {
    pub(crate) fn new(stream: &TcpStream) -> io::Result<Self> {
        Ok(Self {
            writer: Mutex::new(stream.try_clone()?),
            control: stream.try_clone()?,
        })
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self.control.shutdown(how) {
            Err(error) if error.kind() != io::ErrorKind::NotConnected => Err(error),
            _ => Ok(()),
        }
    }
}

impl FrameSink for TcpFrameSink {
    fn send_frame(&self, frame: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(frame)?;
        writer.flush()
    }

    fn close_read(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Read)
    }

    fn close(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Connection handler speaking newline-delimited JSON-RPC.
#[derive(Debug)]
pub(crate) struct RpcConnectionHandler {
    dispatcher: Dispatcher,
    registry: Arc<ConnectionRegistry>,
    in_flight: Arc<InFlight>,
    max_frame_bytes: Option<usize>,
    server: ServerInfo,
    closing: Arc<AtomicBool>,
}

impl RpcConnectionHandler {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        registry: Arc<ConnectionRegistry>,
        in_flight: Arc<InFlight>,
        max_frame_bytes: Option<usize>,
        server: ServerInfo,
        closing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            in_flight,
            max_frame_bytes,
            server,
            closing,
        }
    }

    fn announce(&self, id: ConnectionId, sink: &dyn FrameSink) {
        let notification = Notification::new(
            CONNECTED_NOTIFICATION,
            json!({
                "connectionId": id,
                "server": {
                    "name": self.server.name,
                    "version": self.server.version,
                },
            }),
        );
        write_message(id, sink, &notification);
    }

    fn serve(
        &self,
        id: ConnectionId,
        mut stream: TcpStream,
        sink: &Arc<TcpFrameSink>,
    ) -> VecDeque<JoinHandle<()>> {
        let mut framer = LineFramer::with_optional_limit(self.max_frame_bytes);
        let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
        let mut workers = VecDeque::new();
        loop {
            let read = match read_with_retry(&mut stream, &mut chunk) {
                Ok(0) => {
                    debug!(target: SESSION_TARGET, connection = id, "connection closed by peer");
                    break;
                }
                Ok(read) => read,
                Err(error) => {
                    warn!(
                        target: SESSION_TARGET,
                        connection = id,
                        error = %error,
                        "socket read error"
                    );
                    break;
                }
            };

            for frame in framer.feed(&chunk[..read]) {
                match frame {
                    Ok(frame) => {
                        make_room(id, &mut workers);
                        workers.extend(self.spawn_worker(id, frame, sink));
                    }
                    Err(error) => {
                        reject_oversized(id, &**sink, error);
                        return workers;
                    }
                }
            }
            workers.retain(|worker| !worker.is_finished());
        }
        workers
    }

    fn spawn_worker(
        &self,
        id: ConnectionId,
        frame: Vec<u8>,
        sink: &Arc<TcpFrameSink>,
    ) -> Option<JoinHandle<()>> {
        if frame.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let frame: Arc<[u8]> = frame.into();
        let guard = self.in_flight.begin();
        let dispatcher = self.dispatcher.clone();
        let worker_sink = Arc::clone(sink);
        let worker_frame = Arc::clone(&frame);
        let spawned = thread::Builder::new().spawn(move || {
            let _guard = guard;
            let response = dispatcher.dispatch(&worker_frame);
            write_message(id, &*worker_sink, &response);
        });
        match spawned {
            Ok(worker) => Some(worker),
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    connection = id,
                    error = %error,
                    "failed to start request worker, handling request on the reader"
                );
                let _guard = self.in_flight.begin();
                write_message(id, &**sink, &self.dispatcher.dispatch(&frame));
                None
            }
        }
    }
}

/// Removes a connection from the registry when dropped, including when the
/// session unwinds.
struct Registration<'a> {
    registry: &'a ConnectionRegistry,
    id: ConnectionId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

impl ConnectionHandler for RpcConnectionHandler {
    fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        let sink = match TcpFrameSink::new(&stream) {
            Ok(sink) => Arc::new(sink),
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    peer = %peer,
                    error = %error,
                    "failed to prepare connection"
                );
                return;
            }
        };

        let id = self.registry.add(ConnectionMeta::new(peer), sink.clone());
        let registration = Registration {
            registry: &self.registry,
            id,
        };
        if self.closing.load(Ordering::SeqCst) {
            debug!(
                target: SESSION_TARGET,
                connection = id,
                "connection arrived during shutdown"
            );
            drop(registration);
            close_sink(id, &*sink);
            return;
        }
        self.announce(id, &*sink);

        let workers = self.serve(id, stream, &sink);
        // The peer is gone; late responses fail to write and are logged.
        drop(registration);
        for worker in workers {
            join_worker(id, worker);
        }
        close_sink(id, &*sink);
    }
}

/// Waits for the oldest worker when the connection is at its request limit.
fn make_room(id: ConnectionId, workers: &mut VecDeque<JoinHandle<()>>) {
    workers.retain(|worker| !worker.is_finished());
    if workers.len() < MAX_WORKERS_PER_CONNECTION {
        return;
    }
    debug!(
        target: SESSION_TARGET,
        connection = id,
        limit = MAX_WORKERS_PER_CONNECTION,
        "request limit reached, pausing reads"
    );
    if let Some(oldest) = workers.pop_front() {
        join_worker(id, oldest);
    }
}

fn join_worker(id: ConnectionId, worker: JoinHandle<()>) {
    if worker.join().is_err() {
        warn!(target: SESSION_TARGET, connection = id, "request worker panicked");
    }
}

fn close_sink(id: ConnectionId, sink: &dyn FrameSink) {
    if let Err(error) = sink.close() {
        debug!(
            target: SESSION_TARGET,
            connection = id,
            error = %error,
            "failed to close connection"
        );
    }
}

fn reject_oversized(id: ConnectionId, sink: &dyn FrameSink, error: FrameError) {
    warn!(
        target: SESSION_TARGET,
        connection = id,
        error = %error,
        "closing connection after oversized frame"
    );
    let response = Response::failure(
        RequestId::Null,
        &DispatchError::invalid_request(error.to_string()),
    );
    write_message(id, sink, &response);
}

/// Encodes `message` as a frame and writes it, logging any failure.
fn write_message<T: Serialize>(id: ConnectionId, sink: &dyn FrameSink, message: &T) {
    let frame = match encode_frame(message) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(
                target: SESSION_TARGET,
                connection = id,
                error = %error,
                "failed to encode frame"
            );
            return;
        }
    };
    if let Err(error) = sink.send_frame(&frame) {
        warn!(
            target: SESSION_TARGET,
            connection = id,
            error = %error,
            "failed to write frame"
        );
    }
}

fn read_with_retry(stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}
