//! Bulk-insert appender.

use serde::{de::DeserializeOwned, Serialize};

use super::connection::Connection;
use crate::rpc::protocol::{methods, Ack, AppendRowsParams, FinalizeAppenderParams};
use crate::rpc::{AppenderHandle, RpcError, RpcResult};

/// A bulk-insert sink held by the engine.
///
/// Rows are forwarded as they are inserted and buffered by the engine, not
/// here. [`commit`](Appender::commit) flushes them and releases the sink.
///
/// # Implicit commit
///
/// An appender dropped without `commit` still sends the finalize request, so
/// the engine flushes whatever was inserted and frees the sink. Nobody is left
/// to receive an error from that path: a failure is logged at `warn` level
/// and otherwise lost, which can mean rows silently not written. Call
/// `commit` whenever the outcome matters.
///
/// Once any call on the appender has failed, the client treats the handle as
/// finalized: further inserts are refused locally and no finalize request is
/// sent on drop.
pub struct Appender<'conn> {
    conn: &'conn Connection,
    handle: AppenderHandle,
    finalized: bool,
}

impl<'conn> Appender<'conn> {
    pub(crate) fn new(conn: &'conn Connection, handle: AppenderHandle) -> Self {
        Self {
            conn,
            handle,
            finalized: false,
        }
    }

    /// Engine handle of the sink.
    pub fn handle(&self) -> AppenderHandle {
        self.handle
    }

    /// Whether the client considers the sink committed or invalidated.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Forward one row. `row` must serialize as a sequence of column values.
    pub fn insert_row<R: Serialize>(&mut self, row: R) -> RpcResult<()> {
        self.insert_rows(std::slice::from_ref(&row))
    }

    /// Forward a batch of rows in one request.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::AppenderFinalized`] without contacting the engine
    /// if the appender is already finalized. If the engine rejects the rows,
    /// its error is returned and the appender becomes finalized.
    pub fn insert_rows<R: Serialize>(&mut self, rows: &[R]) -> RpcResult<()> {
        if self.finalized {
            return Err(RpcError::AppenderFinalized);
        }
        let _: Ack = self.call(
            methods::APPEND_ROWS,
            AppendRowsParams {
                appender: self.handle,
                rows,
            },
        )?;
        Ok(())
    }

    /// Flush buffered rows and release the sink.
    pub fn commit(mut self) -> RpcResult<()> {
        if self.finalized {
            return Err(RpcError::AppenderFinalized);
        }
        self.finalize()?;
        tracing::debug!(appender = %self.handle, "appender committed");
        Ok(())
    }

    fn finalize(&mut self) -> RpcResult<()> {
        let _: Ack = self.call(
            methods::FINALIZE_APPENDER,
            FinalizeAppenderParams {
                appender: self.handle,
            },
        )?;
        self.finalized = true;
        Ok(())
    }

    fn call<P, R>(&mut self, method: &str, params: P) -> RpcResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.conn.call(method, params).map_err(|err| {
            // The engine-side handle may already be gone.
            self.finalized = true;
            err
        })
    }
}

impl Drop for Appender<'_> {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        tracing::debug!(appender = %self.handle, "committing abandoned appender");
        if let Err(err) = self.finalize() {
            tracing::warn!(
                appender = %self.handle,
                error = %err,
                "implicit appender commit failed, inserted rows may be lost"
            );
        }
    }
}
