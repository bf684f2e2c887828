//! Engine communication module.
//!
//! The engine is a long-lived child process that owns every database
//! resource. This module speaks its line protocol and nothing else; the
//! resource lifecycle built on top of it lives in [`crate::client`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  duckrpc client (Rust)                    │
//! │  Connection ──► Mutex<Transport> ◄── Cursor / Appender    │
//! │                       │                                   │
//! │      stdin (1 line/request)   stdout (1 line/response)    │
//! └───────────────────────┼───────────────────────────────────┘
//!                         ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │            Engine (long-running child process)            │
//! │   database handles · cursor handles · appender handles    │
//! └───────────────────────────────────────────────────────────┘
//! ```

mod error;
pub mod protocol;
mod transport;

pub use error::{RpcError, RpcResult};
pub use protocol::{AppenderHandle, CursorHandle, DatabaseHandle};
pub use transport::Transport;
