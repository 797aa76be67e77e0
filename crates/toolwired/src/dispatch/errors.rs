//! Error types for request dispatch failures.
//!
//! Every variant maps onto one JSON-RPC error code. The display text becomes
//! the `message` of the error object returned to the client.

use thiserror::Error;

use super::envelope::ErrorObject;

/// JSON-RPC error codes produced by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The frame was not valid JSON.
    ParseError,
    /// The JSON was not a valid request envelope.
    InvalidRequest,
    /// No handler is registered under the requested method.
    MethodNotFound,
    /// The parameters did not satisfy the handler's schema.
    InvalidParams,
    /// The handler itself failed.
    HandlerFailure,
}

impl ErrorCode {
    /// Numeric code carried on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::HandlerFailure => -32000,
        }
    }
}

/// Errors surfaced while parsing, validating, or executing a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as JSON.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// JSON did not match the request envelope.
    #[error("Invalid Request: {reason}")]
    InvalidRequest { reason: String },

    /// Method missing or not registered.
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// Parameters failed schema validation.
    #[error("Invalid params: {reason}")]
    InvalidParams { reason: String },

    /// Handler returned an error or panicked.
    #[error("{message}")]
    Handler { method: String, message: String },
}

impl DispatchError {
    /// Creates a parse error from a serde error.
    pub fn parse(source: &serde_json::Error) -> Self {
        Self::Parse {
            message: source.to_string(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates a method-not-found error for a named method.
    pub fn unknown_method(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Creates a method-not-found error for a request without a method.
    pub fn missing_method() -> Self {
        Self::unknown_method("method not specified")
    }

    /// Creates an invalid params error.
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            reason: reason.into(),
        }
    }

    /// Creates a missing-parameter error naming the absent key.
    pub fn missing_param(name: &str) -> Self {
        Self::invalid_params(format!("missing required parameter: {name}"))
    }

    /// Creates a handler failure.
    pub fn handler(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            method: method.into(),
            message: message.into(),
        }
    }

    /// JSON-RPC code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { .. } => ErrorCode::ParseError,
            Self::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            Self::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            Self::InvalidParams { .. } => ErrorCode::InvalidParams,
            Self::Handler { .. } => ErrorCode::HandlerFailure,
        }
    }

    /// Wire representation of this error.
    #[must_use]
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.code().code(),
            message: self.to_string(),
        }
    }
}
