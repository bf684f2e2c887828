//! Protocol types for engine communication.
//!
//! Every request is one JSON object on one line. The method tag lives under
//! the reserved `@` key and the remaining keys are the method's parameters.
//! Every response is one JSON object on one line carrying an `ok` flag, an
//! `err` message on failure, and method-specific fields on success.
//!
//! The protocol carries no request identifiers: the Nth response line always
//! answers the Nth request line.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{RpcError, RpcResult};

// ============================================================================
// Handles
// ============================================================================

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// Engine-minted identifier of an open database context.
    DatabaseHandle,
    "db"
);

handle_type!(
    /// Engine-minted identifier of a streaming result set.
    CursorHandle,
    "cursor"
);

handle_type!(
    /// Engine-minted identifier of a bulk-insert sink.
    AppenderHandle,
    "appender"
);

// ============================================================================
// Request/Response Envelope
// ============================================================================

/// A request line: method tag plus flattened parameters.
#[derive(Debug, Serialize)]
struct RequestFrame<'a, P> {
    #[serde(rename = "@")]
    method: &'a str,
    #[serde(flatten)]
    params: P,
}

/// Response envelope received from the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    /// Whether the request succeeded.
    pub ok: bool,
    /// Engine error message (present if ok = false).
    #[serde(default)]
    pub err: Option<String>,
    /// Method-specific result fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Convert the envelope into a typed result, or the engine's error.
    pub fn into_result<R: DeserializeOwned>(self) -> RpcResult<R> {
        if !self.ok {
            return Err(RpcError::Remote(
                self.err.unwrap_or_else(|| "unknown engine error".to_string()),
            ));
        }
        serde_json::from_value(Value::Object(self.fields)).map_err(RpcError::DeserializeFailed)
    }
}

/// Encode a request as one newline-terminated line.
pub fn encode_request<P: Serialize>(method: &str, params: P) -> RpcResult<String> {
    let mut line = serde_json::to_string(&RequestFrame { method, params })
        .map_err(RpcError::SerializeFailed)?;
    line.push('\n');
    Ok(line)
}

/// Decode one response line into its envelope.
pub fn decode_response(line: &str) -> RpcResult<ResponseEnvelope> {
    serde_json::from_str(line.trim_end()).map_err(RpcError::DeserializeFailed)
}

// ============================================================================
// Request Parameters
// ============================================================================

/// Parameters for methods that take none (`x`).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NoParams {}

/// Parameters for `c`.
#[derive(Debug, Clone, Serialize)]
pub struct OpenDatabaseParams<'a> {
    /// Database name or path.
    #[serde(rename = "p")]
    pub name: &'a str,
}

/// Parameters for `e`, `q` and `qq`.
#[derive(Debug, Clone, Serialize)]
pub struct StatementParams<'a> {
    #[serde(rename = "d")]
    pub database: DatabaseHandle,
    #[serde(rename = "q")]
    pub query: &'a str,
    /// Positional statement parameters.
    #[serde(rename = "p")]
    pub params: &'a [Value],
}

/// Parameters for `qf`.
#[derive(Debug, Clone, Serialize)]
pub struct FetchParams {
    #[serde(rename = "h")]
    pub cursor: CursorHandle,
    /// Maximum number of rows to return.
    #[serde(rename = "n")]
    pub max_rows: usize,
}

/// Parameters for `qx`.
#[derive(Debug, Clone, Serialize)]
pub struct CloseCursorParams {
    #[serde(rename = "h")]
    pub cursor: CursorHandle,
}

/// Parameters for `a`.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAppenderParams<'a> {
    #[serde(rename = "d")]
    pub database: DatabaseHandle,
    #[serde(rename = "t")]
    pub table: &'a str,
}

/// Parameters for `ai`.
#[derive(Debug, Clone, Serialize)]
pub struct AppendRowsParams<'a, R> {
    #[serde(rename = "h")]
    pub appender: AppenderHandle,
    #[serde(rename = "r")]
    pub rows: &'a [R],
}

/// Parameters for `ax`.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeAppenderParams {
    #[serde(rename = "h")]
    pub appender: AppenderHandle,
}

// ============================================================================
// Response Types
// ============================================================================

/// Response with no payload beyond the `ok` flag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {}

/// Response from `c`.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseOpened {
    #[serde(rename = "d")]
    pub database: DatabaseHandle,
}

/// Response from `q`.
#[derive(Debug, Clone, Deserialize)]
pub struct CursorOpened {
    #[serde(rename = "h")]
    pub cursor: CursorHandle,
    /// Column names, fixed for the lifetime of the cursor.
    #[serde(rename = "c")]
    pub columns: Vec<String>,
}

/// Response from `qf`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkFetched {
    #[serde(rename = "r", default)]
    pub rows: Vec<Vec<Value>>,
    /// Set once the result set has no more rows, possibly alongside the last rows.
    #[serde(default)]
    pub eof: bool,
}

/// Response from `qq`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultSet {
    #[serde(rename = "r", default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(rename = "c")]
    pub columns: Vec<String>,
}

/// Response from `a`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppenderOpened {
    #[serde(rename = "h")]
    pub appender: AppenderHandle,
}

// ============================================================================
// Method Names
// ============================================================================

/// Engine method tags.
pub mod methods {
    pub const OPEN_DATABASE: &str = "c";
    pub const EXECUTE: &str = "e";
    pub const QUERY: &str = "q";
    pub const FETCH: &str = "qf";
    pub const CLOSE_CURSOR: &str = "qx";
    pub const QUERY_ALL: &str = "qq";
    pub const OPEN_APPENDER: &str = "a";
    pub const APPEND_ROWS: &str = "ai";
    pub const FINALIZE_APPENDER: &str = "ax";
    pub const CLOSE_ENVIRONMENT: &str = "x";
}
