//! JSON-RPC 2.0 request dispatch.
//!
//! Each newline-delimited frame is decoded as a request envelope, routed by
//! `method` to a registered [`ToolHandler`], and answered with exactly one
//! [`Response`].
//!
//! ## Protocol
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"echo","params":{"text":"hi"}}
//! ```
//!
//! is answered with
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"result":{"text":"hi"}}
//! ```
//!
//! Failures carry an `error` member instead of `result`:
//!
//! | code     | meaning                                   |
//! |----------|-------------------------------------------|
//! | `-32700` | frame is not JSON                         |
//! | `-32600` | JSON is not a valid request envelope      |
//! | `-32601` | method missing or not registered          |
//! | `-32602` | params missing, mistyped, or not an object |
//! | `-32000` | handler returned an error or panicked     |

mod dispatcher;
mod envelope;
mod errors;
mod handler;
#[cfg(test)]
mod tests;

pub use self::dispatcher::Dispatcher;
pub use self::envelope::{
    ErrorObject, JSONRPC_VERSION, Notification, Outcome, Params, RejectedRequest, Request,
    RequestId, Response, encode_frame,
};
pub use self::errors::{DispatchError, ErrorCode};
pub use self::handler::{
    HandlerEntry, HandlerError, HandlerRegistry, ParamSchema, RegistrationError, ToolHandler,
    ValueKind,
};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
