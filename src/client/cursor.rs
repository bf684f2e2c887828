//! Streaming query results.

use std::iter::FusedIterator;
use std::sync::Arc;
use std::vec;

use super::connection::Connection;
use super::row::{self, Row};
use crate::rpc::protocol::{methods, Ack, ChunkFetched, CloseCursorParams, FetchParams};
use crate::rpc::{CursorHandle, RpcResult};

/// A lazy, forward-only view over a result set held by the engine.
///
/// The column schema is fixed when the query is opened and labels every row
/// the cursor produces. Rows are pulled in chunks on demand.
///
/// Dropping the cursor always sends the close request for its handle, whether
/// or not the result set was read to the end. Use [`close`](Cursor::close) to
/// observe a close failure instead of having it logged.
pub struct Cursor<'conn> {
    conn: &'conn Connection,
    handle: CursorHandle,
    columns: Arc<[String]>,
    exhausted: bool,
    closed: bool,
}

impl<'conn> Cursor<'conn> {
    pub(crate) fn new(conn: &'conn Connection, handle: CursorHandle, columns: Vec<String>) -> Self {
        Self {
            conn,
            handle,
            columns: row::schema(columns),
            exhausted: false,
            closed: false,
        }
    }

    /// Engine handle of the result set.
    pub fn handle(&self) -> CursorHandle {
        self.handle
    }

    /// Column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the engine has reported the end of the result set.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch up to `size` rows.
    ///
    /// Returns `None` once the engine has reported the end of the result set,
    /// without contacting the engine again. The chunk carrying the end marker
    /// may itself contain rows.
    pub fn fetch_chunk(&mut self, size: usize) -> RpcResult<Option<Vec<Row>>> {
        if self.exhausted {
            return Ok(None);
        }

        let chunk: ChunkFetched = self.conn.call(
            methods::FETCH,
            FetchParams {
                cursor: self.handle,
                max_rows: size,
            },
        )?;
        self.exhausted = chunk.eof;

        Ok(Some(
            chunk
                .rows
                .into_iter()
                .map(|values| Row::new(self.columns.clone(), values))
                .collect(),
        ))
    }

    /// Fetch the next single row.
    pub fn fetch(&mut self) -> RpcResult<Option<Row>> {
        Ok(self
            .fetch_chunk(1)?
            .and_then(|chunk| chunk.into_iter().next()))
    }

    /// Iterate over the remaining rows, paging by the connection's chunk size.
    ///
    /// Rows already fetched into the iterator's page are lost if it is
    /// dropped early; the cursor itself stays usable.
    pub fn rows(&mut self) -> Rows<'_, 'conn> {
        Rows {
            cursor: self,
            page: Page::default(),
        }
    }

    /// Close the result set now and report the engine's answer.
    pub fn close(mut self) -> RpcResult<()> {
        self.closed = true;
        self.send_close()
    }

    fn send_close(&self) -> RpcResult<()> {
        let _: Ack = self.conn.call(
            methods::CLOSE_CURSOR,
            CloseCursorParams {
                cursor: self.handle,
            },
        )?;
        tracing::debug!(cursor = %self.handle, "cursor closed");
        Ok(())
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.send_close() {
            tracing::warn!(cursor = %self.handle, error = %err, "failed to close abandoned cursor");
        }
    }
}

impl<'conn> IntoIterator for Cursor<'conn> {
    type Item = RpcResult<Row>;
    type IntoIter = IntoRows<'conn>;

    fn into_iter(self) -> IntoRows<'conn> {
        IntoRows {
            cursor: self,
            page: Page::default(),
        }
    }
}

impl<'a, 'conn> IntoIterator for &'a mut Cursor<'conn> {
    type Item = RpcResult<Row>;
    type IntoIter = Rows<'a, 'conn>;

    fn into_iter(self) -> Rows<'a, 'conn> {
        self.rows()
    }
}

/// The current chunk of an iteration, plus whether iteration has ended.
#[derive(Default)]
struct Page {
    rows: vec::IntoIter<Row>,
    done: bool,
}

impl Page {
    fn next_from(&mut self, cursor: &mut Cursor<'_>) -> Option<RpcResult<Row>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(row) = self.rows.next() {
                return Some(Ok(row));
            }
            match cursor.fetch_chunk(cursor.conn.chunk_size()) {
                Ok(Some(chunk)) if !chunk.is_empty() => self.rows = chunk.into_iter(),
                Ok(_) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Borrowing row iterator, see [`Cursor::rows`].
///
/// Yields at most one error, after which it ends.
pub struct Rows<'a, 'conn> {
    cursor: &'a mut Cursor<'conn>,
    page: Page,
}

impl Iterator for Rows<'_, '_> {
    type Item = RpcResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.page.next_from(self.cursor)
    }
}

impl FusedIterator for Rows<'_, '_> {}

/// Owning row iterator. The cursor is closed when the iterator is dropped.
pub struct IntoRows<'conn> {
    cursor: Cursor<'conn>,
    page: Page,
}

impl IntoRows<'_> {
    /// Column names of the underlying cursor.
    pub fn columns(&self) -> &[String] {
        self.cursor.columns()
    }
}

impl Iterator for IntoRows<'_> {
    type Item = RpcResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.page.next_from(&mut self.cursor)
    }
}

impl FusedIterator for IntoRows<'_> {}
