//! # duckrpc
//!
//! Client for a query engine running as a child process and spoken to over
//! its stdin/stdout, one JSON line per request and one per response.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │   Connection  (one database, owns the transport)        │
//! │     ├── Cursor    (streaming result set, closes on drop)│
//! │     └── Appender  (bulk insert sink, commits on drop)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │  one call at a time
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │   Transport  (boot handshake, request/response lines)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │  stdin / stdout
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │   Engine process  (owns every handle)                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Every server-side resource is represented by an opaque handle wrapped in
//! a value whose `Drop` releases it, so early returns, `?` and panics all
//! free cursors and appenders before the connection goes away.

pub mod client;
pub mod config;
pub mod rpc;

pub use client::{Appender, Connection, Cursor, IntoRows, Row, Rows};
pub use config::{Settings, SettingsError};
pub use rpc::{RpcError, RpcResult, Transport};
