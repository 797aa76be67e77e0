//! Periodic connection-count reporting.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::registry::ConnectionRegistry;

const MONITOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::monitor");

/// Background thread logging the active connection count at a fixed interval.
#[derive(Debug)]
pub struct StatusMonitor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatusMonitor {
    /// Starts reporting every `interval`. A zero interval disables reporting.
    #[must_use]
    pub fn start(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        if interval.is_zero() {
            debug!(target: MONITOR_TARGET, "status reporting disabled");
            return Self {
                stop: None,
                handle: None,
            };
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("toolwire-status".to_owned())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => info!(
                            target: MONITOR_TARGET,
                            active_connections = registry.count(),
                            "server status"
                        ),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });
        match spawned {
            Ok(handle) => Self {
                stop: Some(stop),
                handle: Some(handle),
            },
            Err(error) => {
                warn!(
                    target: MONITOR_TARGET,
                    error = %error,
                    "failed to start status thread, reporting disabled"
                );
                Self {
                    stop: None,
                    handle: None,
                }
            }
        }
    }

    /// Whether a reporting thread is running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the reporting thread and waits for it to exit.
    ///
    /// Returns `false` when the thread panicked.
    pub fn stop(mut self) -> bool {
        self.halt()
    }

    fn halt(&mut self) -> bool {
        if let Some(stop) = self.stop.take() {
            stop.send(()).ok();
        }
        self.handle
            .take()
            .is_none_or(|handle| handle.join().is_ok())
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.halt();
    }
}
