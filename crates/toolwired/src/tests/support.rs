//! Shared fixtures for server-level tests.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::dispatch::{
    Dispatcher, HandlerError, HandlerRegistry, ParamSchema, Params, ValueKind,
};
use crate::registry::ConnectionRegistry;
use crate::server::{ServerHandle, ServerServices, ServerSettings, ToolServer};
use crate::tools::{ToolContext, register_builtin_tools};
use crate::transport::{CONNECTED_NOTIFICATION, ListenerError};

pub(crate) const IO_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it holds or `IO_TIMEOUT` passes.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + IO_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    condition()
}

fn test_handlers(registry: &Arc<ConnectionRegistry>, port: u16) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    register_builtin_tools(
        &mut handlers,
        &ToolContext {
            connections: Arc::clone(registry),
            port,
            started_at: Instant::now(),
        },
    )
    .expect("register built-in tools");
    handlers
        .register(
            "sleep",
            ParamSchema::new().required("ms", ValueKind::Integer),
            |params: &Params| {
                let ms = params.get("ms").and_then(Value::as_u64).unwrap_or_default();
                thread::sleep(Duration::from_millis(ms));
                Ok(json!({ "slept": ms }))
            },
        )
        .expect("register sleep");
    handlers
        .register("fail", ParamSchema::new(), |_: &Params| {
            Err(HandlerError::new("tool exploded"))
        })
        .expect("register fail");
    handlers
        .register("panic", ParamSchema::new(), |_: &Params| panic!("handler bug"))
        .expect("register panic");
    handlers
}

/// A server on an ephemeral loopback port with the built-in tools plus
/// `sleep`, `fail` and `panic` test tools.
pub(crate) struct TestServer {
    handle: Option<ServerHandle>,
    registry: Arc<ConnectionRegistry>,
    addr: SocketAddr,
}

impl TestServer {
    pub(crate) fn start() -> Self {
        Self::with_settings(ServerSettings {
            shutdown_grace: Duration::from_secs(2),
            ..ServerSettings::default()
        })
    }

    pub(crate) fn with_settings(settings: ServerSettings) -> Self {
        let server = ToolServer::bind("127.0.0.1", 0, settings).expect("bind test server");
        let addr = server.local_addr();
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::new(test_handlers(&registry, addr.port())));
        let handle = server
            .start(ServerServices {
                dispatcher,
                registry: Arc::clone(&registry),
            })
            .expect("start test server");
        Self {
            handle: Some(handle),
            registry,
            addr,
        }
    }

    pub(crate) const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub(crate) fn handle(&self) -> &ServerHandle {
        self.handle.as_ref().expect("server still running")
    }

    pub(crate) fn connect(&self) -> Client {
        Client::connect(self.addr)
    }

    pub(crate) fn wait_for_count(&self, expected: usize) -> bool {
        wait_until(|| self.registry.count() == expected)
    }

    pub(crate) fn shutdown(&mut self) -> Result<(), ListenerError> {
        self.handle.take().map_or(Ok(()), ServerHandle::shutdown)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown().ok();
        }
    }
}

/// Line-oriented test client that has already consumed the connect
/// notification.
pub(crate) struct Client {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    connection_id: u64,
    greeting: Value,
}

impl Client {
    pub(crate) fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect client");
        stream
            .set_read_timeout(Some(IO_TIMEOUT))
            .expect("set read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone client stream"));
        let mut client = Self {
            writer: stream,
            reader,
            connection_id: 0,
            greeting: Value::Null,
        };
        let greeting = client.read_message();
        assert_eq!(
            greeting.get("method"),
            Some(&json!(CONNECTED_NOTIFICATION)),
            "first frame should announce the connection: {greeting}"
        );
        client.connection_id = greeting
            .pointer("/params/connectionId")
            .and_then(Value::as_u64)
            .expect("connection id in greeting");
        client.greeting = greeting;
        client
    }

    pub(crate) const fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub(crate) const fn greeting(&self) -> &Value {
        &self.greeting
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.writer.local_addr().expect("client address")
    }

    pub(crate) fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write to server");
        self.writer.flush().expect("flush to server");
    }

    pub(crate) fn send_request(&mut self, id: u64, method: &str, params: Value) {
        let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let mut line = request.to_string();
        line.push('\n');
        self.send_raw(line.as_bytes());
    }

    /// Reads one raw line including its delimiter; empty on EOF.
    pub(crate) fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        Ok(line)
    }

    pub(crate) fn read_message(&mut self) -> Value {
        let line = self.read_line().expect("read frame");
        assert!(line.ends_with('\n'), "frame should be delimited: {line:?}");
        serde_json::from_str(&line).expect("frame is JSON")
    }

    pub(crate) fn call(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.send_request(id, method, params);
        self.read_message()
    }

    /// Whether the server has closed the connection.
    pub(crate) fn at_eof(&mut self) -> bool {
        match self.read_line() {
            Ok(line) => line.is_empty(),
            Err(error) => error.kind() == io::ErrorKind::ConnectionReset,
        }
    }
}
