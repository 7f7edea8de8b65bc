//! Store handle for the database file.

use std::path::Path;

use rusqlite::{Connection, Transaction};

use crate::error::Error;

/// Handle to the relational store a migration run operates on.
///
/// Owns the single connection for the run; the engine assumes exclusive
/// access for the duration (enforced by the deploying operator). All mutating
/// work happens inside [`Store::transaction`] scopes, which roll back unless
/// explicitly committed.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open the store at the given path, creating the file if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::configure(Connection::open(path)?)
    }

    /// Open an in-memory store.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self, Error> {
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    /// Read access to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a scoped transaction.
    ///
    /// The returned guard rolls back on drop; only an explicit
    /// [`Transaction::commit`] persists the work, so no exit path can leave
    /// the store holding a half-applied step.
    pub fn transaction(&mut self) -> Result<Transaction<'_>, Error> {
        Ok(self.conn.transaction()?)
    }
}
