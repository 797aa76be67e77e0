//! Turns one request frame into exactly one response.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::DISPATCH_TARGET;
use super::envelope::{Request, RequestId, Response};
use super::errors::DispatchError;
use super::handler::HandlerRegistry;

/// Routes request frames to registered handlers.
///
/// Dispatch is stateless apart from the shared handler table, so one
/// dispatcher serves every connection and every worker thread concurrently.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    handlers: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen handler table.
    #[must_use]
    pub const fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self { handlers }
    }

    /// Registered handlers.
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Parses, validates and executes one frame.
    ///
    /// Never fails: every problem is folded into an error response. The `id`
    /// is echoed whenever it could be recovered and is `null` otherwise.
    #[must_use]
    pub fn dispatch(&self, frame: &[u8]) -> Response {
        let value: Value = match serde_json::from_slice(frame) {
            Ok(value) => value,
            Err(error) => {
                debug!(target: DISPATCH_TARGET, %error, "unparseable frame");
                return Response::failure(RequestId::Null, &DispatchError::parse(&error));
            }
        };

        let request = match Request::from_value(value) {
            Ok(request) => request,
            Err(rejected) => {
                debug!(
                    target: DISPATCH_TARGET,
                    error = %rejected.error,
                    "rejected request envelope"
                );
                return Response::failure(rejected.id, &rejected.error);
            }
        };

        self.execute(request)
    }

    fn execute(&self, request: Request) -> Response {
        let Request { id, method, params } = request;
        let Some(entry) = self.handlers.get(&method) else {
            debug!(target: DISPATCH_TARGET, %method, "unknown method");
            return Response::failure(id, &DispatchError::unknown_method(method));
        };

        debug!(target: DISPATCH_TARGET, %method, "dispatching request");
        match entry.invoke(&params) {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::failure(id, &error),
        }
    }
}
