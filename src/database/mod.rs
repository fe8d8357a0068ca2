//! SQLite session and transaction scoping.
//!
//! The broker and the gateway share one database. Every unit of work runs
//! inside a single transaction obtained from [`Database::transaction`] or
//! [`Database::read`]; the transaction is committed only when the closure
//! succeeds and is rolled back when it is dropped on any other path.

use crate::error::{BrokerError, Result};
use anyhow::Context;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Schema for the credential table and the gateway tables it writes to.
///
/// ```sql
/// connections(connection_id, connection_name, protocol)            -- gateway-owned
/// connection_parameters(connection_id, parameter_name, parameter_value)
/// credentials(id, username, connection_id, directory_login,
///             encrypted_password, encryption_iv, updated_at,
///             expires_in_hours, is_active)
/// ```
const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS connections (
        connection_id INTEGER PRIMARY KEY,
        connection_name TEXT NOT NULL UNIQUE,
        protocol TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS connection_parameters (
        connection_id INTEGER NOT NULL
            REFERENCES connections(connection_id) ON DELETE CASCADE,
        parameter_name TEXT NOT NULL,
        parameter_value TEXT NOT NULL,
        PRIMARY KEY (connection_id, parameter_name)
    );

    CREATE TABLE IF NOT EXISTS credentials (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL,
        connection_id INTEGER NOT NULL
            REFERENCES connections(connection_id) ON DELETE CASCADE,
        directory_login TEXT NOT NULL,
        encrypted_password TEXT NOT NULL,
        encryption_iv TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        expires_in_hours INTEGER NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        UNIQUE(username, connection_id)
    );

    CREATE INDEX IF NOT EXISTS idx_credentials_user_active
        ON credentials(username, is_active);
"#;

/// Shared database handle.
///
/// # Thread Safety
/// - The connection is wrapped in a Mutex; holding the guard is the session
/// - A session never outlives one `transaction`/`read` call
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens or creates the database file and ensures the schema exists.
    ///
    /// `busy_timeout` bounds how long a statement waits on a lock held by
    /// another process before failing.
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        conn.busy_timeout(busy_timeout)
            .context("Failed to set busy timeout")?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and local experiments.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` inside an immediate (write) transaction.
    ///
    /// Commits when `f` returns `Ok`; any error rolls the whole unit back so
    /// the caller observes no partial effect.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Runs `f` inside a deferred transaction for consistent reads.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }

    fn run<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| BrokerError::SessionPoisoned)?;
        let tx = conn.transaction_with_behavior(behavior)?;

        // Dropping `tx` without commit rolls back
        let value = f(&tx)?;
        tx.commit()?;

        Ok(value)
    }
}
