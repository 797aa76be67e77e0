//! JSON-RPC 2.0 envelopes.
//!
//! Requests are decoded from an untyped [`Value`] rather than through a
//! derived `Deserialize` so the `id` can still be recovered (and echoed back)
//! when a later field is malformed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::errors::DispatchError;

/// Protocol version accepted and emitted.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request parameters keyed by name.
pub type Params = Map<String, Value>;

/// Correlation identifier of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier.
    Number(Number),
    /// String identifier.
    String(String),
    /// Explicit `null`, or no identifier could be recovered.
    #[default]
    Null,
}

impl RequestId {
    /// Converts a raw `id` value, rejecting types JSON-RPC does not allow.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Number(number) => Some(Self::Number(number.clone())),
            Value::String(text) => Some(Self::String(text.clone())),
            _ => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// A validated request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation identifier.
    pub id: RequestId,
    /// Method name used to look up the handler.
    pub method: String,
    /// Parameters, empty when the request omitted them.
    pub params: Params,
}

/// A request that failed envelope validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRequest {
    /// Whatever identifier could be trusted before validation failed.
    pub id: RequestId,
    /// Why the envelope was rejected.
    pub error: DispatchError,
}

impl RejectedRequest {
    fn new(id: RequestId, error: DispatchError) -> Self {
        Self { id, error }
    }
}

impl Request {
    /// Validates a decoded JSON value as a request envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`RejectedRequest`] carrying the recovered `id` (or `null`)
    /// and the first violation found.
    pub fn from_value(value: Value) -> Result<Self, RejectedRequest> {
        let Value::Object(mut fields) = value else {
            return Err(RejectedRequest::new(
                RequestId::Null,
                DispatchError::invalid_request("request must be a JSON object"),
            ));
        };

        let id = match fields.get("id") {
            None => RequestId::Null,
            Some(raw) => RequestId::from_value(raw).ok_or_else(|| {
                RejectedRequest::new(
                    RequestId::Null,
                    DispatchError::invalid_request("id must be a string, number, or null"),
                )
            })?,
        };

        match fields.get("jsonrpc") {
            Some(Value::String(version)) if version == JSONRPC_VERSION => {}
            Some(other) => {
                return Err(RejectedRequest::new(
                    id,
                    DispatchError::invalid_request(format!(
                        "unsupported jsonrpc version {other}"
                    )),
                ));
            }
            None => {
                return Err(RejectedRequest::new(
                    id,
                    DispatchError::invalid_request("missing jsonrpc version"),
                ));
            }
        }

        let method = match fields.remove("method") {
            Some(Value::String(method)) => method,
            None | Some(Value::Null) => {
                return Err(RejectedRequest::new(id, DispatchError::missing_method()));
            }
            Some(_) => {
                return Err(RejectedRequest::new(
                    id,
                    DispatchError::invalid_request("method must be a string"),
                ));
            }
        };

        let params = match fields.remove("params") {
            None | Some(Value::Null) => Params::new(),
            Some(Value::Object(params)) => params,
            Some(_) => {
                return Err(RejectedRequest::new(
                    id,
                    DispatchError::invalid_params("params must be an object"),
                ));
            }
        };

        Ok(Self { id, method, params })
    }
}

/// Error member of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
}

/// Either the result or the error of a response; never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Handler return value.
    Result(Value),
    /// Failure description.
    Error(ErrorObject),
}

/// Response envelope written back to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    jsonrpc: &'static str,
    id: RequestId,
    #[serde(flatten)]
    outcome: Outcome,
}

impl Response {
    /// Builds a successful response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: Outcome::Result(result),
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: RequestId, error: &DispatchError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: Outcome::Error(error.to_error_object()),
        }
    }

    /// Correlation identifier.
    #[must_use]
    pub const fn id(&self) -> &RequestId {
        &self.id
    }

    /// Result or error carried by the response.
    #[must_use]
    pub const fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Error object, when the response is a failure.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorObject> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            Outcome::Result(_) => None,
        }
    }

    /// Result value, when the response is a success.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }
}

/// Server-initiated message without an `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    jsonrpc: &'static str,
    method: String,
    params: Value,
}

impl Notification {
    /// Builds a notification.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Serializes a message as one newline-terminated frame.
///
/// # Errors
///
/// Returns the serializer error when the message cannot be encoded.
pub fn encode_frame<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut frame = serde_json::to_vec(message)?;
    frame.push(crate::framer::DELIMITER);
    Ok(frame)
}
