//! Fan-out of one frame to every open connection.

use tracing::warn;

use crate::registry::{ConnectionId, ConnectionRegistry};

use super::SESSION_TARGET;

/// Outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the frame was written to.
    pub delivered: usize,
    /// Connections whose write failed.
    pub failed: Vec<ConnectionId>,
}

impl BroadcastReport {
    /// Number of connections the broadcast was attempted on.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Writes an already encoded frame to every registered connection.
///
/// A failed write is logged and recorded; it does not stop delivery to the
/// remaining connections. Failed connections are left for their own reader
/// to clean up.
pub(crate) fn broadcast_frame(registry: &ConnectionRegistry, frame: &[u8]) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for (id, sink) in registry.sinks() {
        match sink.send_frame(frame) {
            Ok(()) => report.delivered += 1,
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    connection = id,
                    error = %error,
                    "broadcast write failed"
                );
                report.failed.push(id);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Arc;

    use mockall::mock;
    use rstest::rstest;

    use super::*;
    use crate::registry::{ConnectionMeta, FrameSink};

    mock! {
        Sink {}
        impl FrameSink for Sink {
            fn send_frame(&self, frame: &[u8]) -> io::Result<()>;
            fn close_read(&self) -> io::Result<()>;
            fn close(&self) -> io::Result<()>;
        }
    }

    const FRAME: &[u8] = b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/tick\",\"params\":{}}\n";

    fn meta(port: u16) -> ConnectionMeta {
        ConnectionMeta::new(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    fn healthy_sink() -> Arc<dyn FrameSink> {
        let mut sink = MockSink::new();
        sink.expect_send_frame()
            .withf(|frame| frame == FRAME)
            .once()
            .returning(|_| Ok(()));
        Arc::new(sink)
    }

    fn broken_sink() -> Arc<dyn FrameSink> {
        let mut sink = MockSink::new();
        sink.expect_send_frame()
            .once()
            .returning(|_| Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        Arc::new(sink)
    }

    #[rstest]
    #[case::first_fails(0)]
    #[case::middle_fails(1)]
    #[case::last_fails(2)]
    fn continues_past_a_failing_connection(#[case] broken: usize) {
        let registry = ConnectionRegistry::new();
        let ids: Vec<_> = (0..3_u16)
            .map(|index| {
                let sink = if usize::from(index) == broken {
                    broken_sink()
                } else {
                    healthy_sink()
                };
                registry.add(meta(7100 + index), sink)
            })
            .collect();

        let report = broadcast_frame(&registry, FRAME);

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec![ids[broken]]);
        assert_eq!(report.attempted(), 3);
    }

    #[test]
    fn empty_registry_reports_nothing() {
        let report = broadcast_frame(&ConnectionRegistry::new(), FRAME);
        assert_eq!(report, BroadcastReport::default());
    }
}
