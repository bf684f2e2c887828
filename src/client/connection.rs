//! Database connection over an engine transport.

use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::appender::Appender;
use super::cursor::Cursor;
use super::row::{self, Row};
use crate::config::{CursorSettings, Settings};
use crate::rpc::protocol::{
    methods, Ack, AppenderOpened, CursorOpened, DatabaseOpened, OpenAppenderParams,
    OpenDatabaseParams, ResultSet, StatementParams,
};
use crate::rpc::{DatabaseHandle, RpcError, RpcResult, Transport};

/// One open database on a dedicated engine process.
///
/// The connection owns the transport exclusively. Cursors and appenders
/// borrow the connection and route every call through the same lock, so any
/// number of them can be alive at once while the wire only ever carries one
/// request at a time. The borrow also guarantees they are closed before the
/// connection shuts the engine down.
///
/// # Example
///
/// ```ignore
/// use duckrpc::{Connection, Settings};
/// use serde_json::json;
///
/// let settings = Settings::load()?;
/// let conn = Connection::open("t.db", &settings)?;
///
/// conn.execute("create table t (i integer, s varchar)", &[])?;
///
/// let mut appender = conn.appender("t")?;
/// appender.insert_rows(&[json!([1, "a"]), json!([2, "b"])])?;
/// appender.commit()?;
///
/// for row in conn.select("select * from t where i > ?", &[json!(0)])? {
///     let row = row?;
///     println!("{} {}", row["i"], row["s"]);
/// }
/// ```
pub struct Connection {
    transport: Mutex<Transport>,
    database: DatabaseHandle,
    chunk_size: usize,
}

impl Connection {
    /// Spawn the configured engine and open the database `name` on it.
    pub fn open(name: &str, settings: &Settings) -> RpcResult<Self> {
        settings.validate()?;
        let transport = Transport::spawn(&settings.engine)?;
        Ok(Self::with_transport(transport, name)?.with_chunk_size(settings.cursor.chunk_size))
    }

    /// Boot `transport` and open the database `name` on it.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::BootFailed`] if the engine fails its handshake, or
    /// the engine's error if the database cannot be opened. The transport is
    /// torn down in both cases.
    pub fn with_transport(mut transport: Transport, name: &str) -> RpcResult<Self> {
        transport.boot()?;
        let opened: DatabaseOpened =
            transport.call(methods::OPEN_DATABASE, OpenDatabaseParams { name })?;
        tracing::debug!(database = %opened.database, name, "database opened");

        Ok(Self {
            transport: Mutex::new(transport),
            database: opened.database,
            chunk_size: CursorSettings::default().chunk_size,
        })
    }

    /// Set the page size used when iterating cursors. Clamped to at least 1.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Page size used when iterating cursors.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Engine handle of the open database.
    pub fn database(&self) -> DatabaseHandle {
        self.database
    }

    /// Issue one call while holding the transport exclusively.
    pub(crate) fn call<P, R>(&self, method: &str, params: P) -> RpcResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let mut transport = self
            .transport
            .lock()
            .map_err(|_| RpcError::TransportPoisoned)?;
        transport.call(method, params)
    }

    fn statement<'a>(&self, query: &'a str, params: &'a [Value]) -> StatementParams<'a> {
        StatementParams {
            database: self.database,
            query,
            params,
        }
    }

    /// Run a statement that produces no result set.
    pub fn execute(&self, query: &str, params: &[Value]) -> RpcResult<()> {
        let _: Ack = self.call(methods::EXECUTE, self.statement(query, params))?;
        Ok(())
    }

    /// Open a streaming query.
    ///
    /// No rows are fetched until the cursor is read.
    pub fn select(&self, query: &str, params: &[Value]) -> RpcResult<Cursor<'_>> {
        let opened: CursorOpened = self.call(methods::QUERY, self.statement(query, params))?;
        tracing::debug!(cursor = %opened.cursor, columns = opened.columns.len(), "cursor opened");
        Ok(Cursor::new(self, opened.cursor, opened.columns))
    }

    /// First row of a query, or `None` if it produces none.
    ///
    /// The cursor is closed before returning.
    pub fn select_one(&self, query: &str, params: &[Value]) -> RpcResult<Option<Row>> {
        self.select(query, params)?.fetch()
    }

    /// First column of the first row of a query.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::NoRows`] if the query produces no rows. The cursor
    /// is closed on every path; a fetch error takes precedence over an error
    /// from closing.
    pub fn select_value(&self, query: &str, params: &[Value]) -> RpcResult<Value> {
        let mut cursor = self.select(query, params)?;
        let value = cursor.fetch().and_then(|row| {
            row.and_then(|row| row.into_values().into_iter().next())
                .ok_or(RpcError::NoRows)
        });
        let closed = cursor.close();

        let value = value?;
        closed?;
        Ok(value)
    }

    /// Run a query and return its whole result set at once.
    ///
    /// The engine sends every row in a single response, so this is only
    /// suitable for results known to be small. Use [`select`](Self::select)
    /// otherwise.
    pub fn select_all(&self, query: &str, params: &[Value]) -> RpcResult<Vec<Row>> {
        let result: ResultSet = self.call(methods::QUERY_ALL, self.statement(query, params))?;
        let columns = row::schema(result.columns);
        Ok(result
            .rows
            .into_iter()
            .map(|values| Row::new(columns.clone(), values))
            .collect())
    }

    /// Open a bulk-insert appender on `table`.
    pub fn appender(&self, table: &str) -> RpcResult<Appender<'_>> {
        let opened: AppenderOpened = self.call(
            methods::OPEN_APPENDER,
            OpenAppenderParams {
                database: self.database,
                table,
            },
        )?;
        tracing::debug!(appender = %opened.appender, table, "appender opened");
        Ok(Appender::new(self, opened.appender))
    }
}
