//! Client-side resource lifecycle on top of the engine transport.
//!
//! - [`Connection`] opens one database and is the factory for everything else.
//! - [`Cursor`] streams a result set in chunks and closes it when dropped.
//! - [`Appender`] forwards bulk inserts and commits when dropped if the caller
//!   did not.

mod appender;
mod connection;
mod cursor;
mod row;

pub use appender::Appender;
pub use connection::Connection;
pub use cursor::{Cursor, IntoRows, Rows};
pub use row::Row;
