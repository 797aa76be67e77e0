//! Test helpers for the transport module.

use std::net::{SocketAddr, TcpStream};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use super::ConnectionHandler;

pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
    peers: Mutex<Vec<SocketAddr>>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
            peers: Mutex::new(Vec::new()),
        });
        (count, handler)
    }

    pub(crate) fn peers(&self) -> Vec<SocketAddr> {
        self.peers.lock().expect("peers lock").clone()
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, _stream: TcpStream, peer: SocketAddr) {
        self.peers.lock().expect("peers lock").push(peer);
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
