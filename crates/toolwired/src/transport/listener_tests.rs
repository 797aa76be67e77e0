//! Tests for the socket listener.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use super::listener::SocketListener;
use super::{ConnectionHandler, CountingHandler, ListenerError};

#[derive(Clone)]
struct CountingFixture {
    count: Arc<AtomicUsize>,
    handler: Arc<CountingHandler>,
}

#[fixture]
fn counting_fixture() -> CountingFixture {
    let (count, handler) = CountingHandler::new();
    CountingFixture { count, handler }
}

fn wait_for_count(count: &AtomicUsize, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if count.load(Ordering::SeqCst) >= expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[rstest]
fn tcp_listener_accepts_connections(counting_fixture: CountingFixture) {
    let listener = SocketListener::bind("127.0.0.1", 0).expect("bind tcp listener");
    let addr = listener.local_addr();
    assert_ne!(addr.port(), 0, "ephemeral port should be resolved");
    let CountingFixture { count, handler } = counting_fixture;
    let dyn_handler: Arc<dyn ConnectionHandler> = handler.clone();
    let handle = listener.start(dyn_handler).expect("start listener");

    let first = TcpStream::connect(addr).expect("connect first client");
    let _second = TcpStream::connect(addr).expect("connect second client");

    assert!(wait_for_count(&count, 2), "expected two connections");
    let local = first.local_addr().expect("client address");
    assert!(handler.peers().contains(&local), "peer address is reported");
    handle.shutdown();
    handle.join().expect("join listener");
}

#[rstest]
fn bind_reports_address_in_use() {
    let occupied = TcpListener::bind("127.0.0.1:0").expect("occupy port");
    let port = occupied.local_addr().expect("occupied address").port();

    let error = SocketListener::bind("127.0.0.1", port).expect_err("port is taken");
    assert!(matches!(error, ListenerError::BindTcp { .. }));
}

#[rstest]
fn bind_reports_unresolvable_host() {
    let error = SocketListener::bind("host name with spaces", 0).expect_err("cannot resolve");
    assert!(matches!(
        error,
        ListenerError::Resolve { .. } | ListenerError::ResolveEmpty { .. }
    ));
}

#[rstest]
fn join_releases_the_port(counting_fixture: CountingFixture) {
    let listener = SocketListener::bind("127.0.0.1", 0).expect("bind tcp listener");
    let addr = listener.local_addr();
    let handle = listener
        .start(counting_fixture.handler)
        .expect("start listener");

    handle.shutdown();
    assert!(handle.is_shutting_down());
    handle.join().expect("join listener");

    assert!(
        TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_err(),
        "listener should refuse connections after join"
    );
}
