//! Handler registration and parameter schemas.
//!
//! Tools are registered once at startup into a [`HandlerRegistry`]. The
//! registry is then frozen behind an `Arc` and shared with the dispatcher, so
//! lookups never race with registration.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::panics;

use super::DISPATCH_TARGET;
use super::envelope::Params;
use super::errors::DispatchError;

/// Failure reported by a tool handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error with the message reported to the client.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Message reported to the client.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Business logic invoked for one method.
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with already validated parameters.
    fn call(&self, params: &Params) -> Result<Value, HandlerError>;
}

impl<F> ToolHandler for F
where
    F: Fn(&Params) -> Result<Value, HandlerError> + Send + Sync,
{
    fn call(&self, params: &Params) -> Result<Value, HandlerError> {
        self(params)
    }
}

/// JSON type a declared parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ValueKind {
    /// Whether `value` has this kind.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    /// Schema name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Declared parameters of a handler.
///
/// Required names are checked in declaration order so the reported missing
/// key is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSchema {
    required: Vec<String>,
    properties: BTreeMap<String, ValueKind>,
}

impl ParamSchema {
    /// Schema accepting any parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a required parameter of the given kind.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, kind);
        self
    }

    /// Declares an optional parameter of the given kind.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.properties.insert(name.into(), kind);
        self
    }

    /// Required parameter names in declaration order.
    #[must_use]
    pub fn required_names(&self) -> &[String] {
        &self.required
    }

    /// Declared kind of a parameter.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        self.properties.get(name).copied()
    }

    /// Checks `params` against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidParams`] naming the first missing
    /// required parameter, or the first present parameter whose type does not
    /// match its declaration. Undeclared parameters are accepted.
    pub fn validate(&self, params: &Params) -> Result<(), DispatchError> {
        if let Some(missing) = self.required.iter().find(|name| !params.contains_key(*name)) {
            return Err(DispatchError::missing_param(missing));
        }

        for (name, kind) in &self.properties {
            if let Some(value) = params.get(name)
                && !kind.matches(value)
            {
                return Err(DispatchError::invalid_params(format!(
                    "parameter {name} must be of type {kind}"
                )));
            }
        }
        Ok(())
    }
}

/// Errors raised while registering handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A handler is already registered under the name.
    #[error("handler already registered for method '{name}'")]
    Duplicate { name: String },
    /// Method names must be non-empty.
    #[error("handler method name must not be empty")]
    EmptyName,
}

/// A registered handler together with its schema.
pub struct HandlerEntry {
    name: String,
    schema: ParamSchema,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl HandlerEntry {
    /// Method name the handler is registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter schema.
    #[must_use]
    pub const fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    /// Validates `params` and runs the handler.
    ///
    /// Handler errors and panics are both reported as
    /// [`DispatchError::Handler`].
    pub(crate) fn invoke(&self, params: &Params) -> Result<Value, DispatchError> {
        self.schema.validate(params)?;

        let message = match panics::contain(|| self.handler.call(params)) {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => error.message,
            Err(panic) => format!("handler panicked: {panic}"),
        };

        warn!(
            target: DISPATCH_TARGET,
            method = %self.name,
            error = %message,
            "handler failed"
        );
        Err(DispatchError::handler(&self.name, message))
    }
}

/// Mapping from method name to handler, built once at startup.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: HashMap<String, HandlerEntry>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure or function under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Duplicate`] when the name is taken and
    /// [`RegistrationError::EmptyName`] for an empty name.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        schema: ParamSchema,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(&Params) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.register_handler(name, schema, Arc::new(handler))
    }

    /// Registers a shared [`ToolHandler`] under `name`.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::register`].
    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        schema: ParamSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistrationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        if self.entries.contains_key(&name) {
            return Err(RegistrationError::Duplicate { name });
        }
        let entry = HandlerEntry {
            name: name.clone(),
            schema,
            handler,
        };
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Looks up the handler registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HandlerEntry> {
        self.entries.get(name)
    }

    /// Registered method names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
