//! Built-in tools registered by the daemon.
//!
//! The tools are deliberately small: they exist so clients have something to
//! call and so operators can check on a running daemon.

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::dispatch::{HandlerError, HandlerRegistry, ParamSchema, Params, RegistrationError, ValueKind};
use crate::registry::ConnectionRegistry;

/// Engine version reported by `unreal_info`.
pub const ENGINE_VERSION: &str = "5.3";

const TRANSPORT_NAME: &str = "tcp";
const PROC_STATUS: &str = "/proc/self/status";

/// State the built-in tools read from.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Live connections, read for connection counts.
    pub connections: Arc<ConnectionRegistry>,
    /// Port the server is actually listening on.
    pub port: u16,
    /// When the daemon started, for uptime.
    pub started_at: Instant,
}

/// Registers `echo`, `get_time`, `unreal_info` and `server_status`.
///
/// # Errors
///
/// Returns a [`RegistrationError`] when one of the names is already taken.
pub fn register_builtin_tools(
    handlers: &mut HandlerRegistry,
    context: &ToolContext,
) -> Result<(), RegistrationError> {
    handlers.register(
        "echo",
        ParamSchema::new().required("text", ValueKind::String),
        echo,
    )?;
    handlers.register(
        "get_time",
        ParamSchema::new().optional("format", ValueKind::String),
        get_time,
    )?;

    let info_context = context.clone();
    handlers.register(
        "unreal_info",
        ParamSchema::new().optional("detail", ValueKind::String),
        move |params: &Params| unreal_info(&info_context, params),
    )?;

    let status_context = context.clone();
    handlers.register(
        "server_status",
        ParamSchema::new().optional("include_memory", ValueKind::Boolean),
        move |params: &Params| Ok(server_status(&status_context, params)),
    )
}

fn echo(params: &Params) -> Result<Value, HandlerError> {
    let text = params
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("text must be a string"))?;
    Ok(json!({ "text": text }))
}

fn get_time(params: &Params) -> Result<Value, HandlerError> {
    let now = OffsetDateTime::now_utc();
    match params.get("format").and_then(Value::as_str) {
        Some("unix") => Ok(json!({ "timestamp": now.unix_timestamp() })),
        Some("human") => {
            let time = now
                .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
                .map_err(|error| HandlerError::new(format!("failed to format time: {error}")))?;
            Ok(json!({ "time": time }))
        }
        // Unrecognised formats fall back to ISO 8601.
        _ => {
            let time = now
                .format(&Rfc3339)
                .map_err(|error| HandlerError::new(format!("failed to format time: {error}")))?;
            Ok(json!({ "time": time }))
        }
    }
}

fn unreal_info(context: &ToolContext, params: &Params) -> Result<Value, HandlerError> {
    let detail = params.get("detail").and_then(Value::as_str).unwrap_or("all");
    let connectivity = || {
        json!({
            "transport": TRANSPORT_NAME,
            "port": context.port,
            "active_connections": context.connections.count(),
        })
    };
    match detail {
        "version" => Ok(json!({ "version": ENGINE_VERSION })),
        "system" => Ok(json!({ "system": std::env::consts::OS })),
        "connectivity" => Ok(json!({ "connectivity": connectivity() })),
        "all" => Ok(json!({
            "version": ENGINE_VERSION,
            "system": std::env::consts::OS,
            "connectivity": connectivity(),
        })),
        other => Err(HandlerError::new(format!(
            "unsupported detail '{other}', expected version, system, connectivity, or all"
        ))),
    }
}

fn server_status(context: &ToolContext, params: &Params) -> Value {
    let mut status = Map::new();
    status.insert(
        "uptime".to_owned(),
        json!(context.started_at.elapsed().as_secs()),
    );
    status.insert(
        "active_connections".to_owned(),
        json!(context.connections.count()),
    );
    if params
        .get("include_memory")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        let memory = fs::read_to_string(PROC_STATUS)
            .ok()
            .map_or(Value::Null, |status| memory_usage(&status));
        status.insert("memory".to_owned(), memory);
    }
    Value::Object(status)
}

/// Extracts resident and virtual memory from a `/proc/<pid>/status` body.
fn memory_usage(proc_status: &str) -> Value {
    let mut memory = Map::new();
    for (field, key) in [("VmRSS:", "resident"), ("VmSize:", "virtual")] {
        if let Some(kib) = status_kib(proc_status, field) {
            memory.insert(key.to_owned(), json!(format!("{}MB", kib / 1024)));
        }
    }
    if memory.is_empty() {
        Value::Null
    } else {
        Value::Object(memory)
    }
}

fn status_kib(proc_status: &str, field: &str) -> Option<u64> {
    proc_status
        .lines()
        .find_map(|line| line.strip_prefix(field))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}
