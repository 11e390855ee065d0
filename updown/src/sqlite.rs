//! SQLite backend, built on [rusqlite].
//!
//! ```
//! use updown::{MemoryStore, Migrator};
//! use updown::sqlite::SqliteHistory;
//! use rusqlite::Connection;
//!
//! let store = MemoryStore::new()
//!     .with_pair("1000_users", "CREATE TABLE users (id INTEGER PRIMARY KEY);", "DROP TABLE users;")
//!     .with_pair("1001_email", "ALTER TABLE users ADD COLUMN email TEXT;", "ALTER TABLE users DROP COLUMN email;");
//! let migrator = Migrator::new(store);
//! let mut history = SqliteHistory::new(Connection::open_in_memory().unwrap());
//!
//! let report = migrator.upgrade(&mut history).unwrap();
//! assert_eq!(report.steps_run.len(), 2);
//! assert_eq!(migrator.history(&mut history).unwrap().len(), 2);
//! ```

use crate::error::Error;
use crate::history::{
    parse_history_rows, quote_ident, stem_pattern, HistoryStore, DEFAULT_HISTORY_TABLE,
};
use crate::source::{Direction, MigrationScript};
use crate::version::{Identifier, Version, Versioned};
use rusqlite::{params, Connection, Transaction};
use std::path::Path;
use std::time::Duration;

/// A [HistoryStore] over one exclusively owned SQLite connection.
pub struct SqliteHistory {
    conn: Connection,
    table: String,
    busy_timeout: Duration,
}

impl std::fmt::Debug for SqliteHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistory")
            .field("table", &self.table)
            .field("busy_timeout", &self.busy_timeout)
            .finish()
    }
}

impl SqliteHistory {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            table: DEFAULT_HISTORY_TABLE.to_string(),
            busy_timeout: Duration::from_secs(30),
        }
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            Error::StorageUnavailable(format!("opening {}: {}", path.display(), e))
        })?;
        Ok(Self::new(conn))
    }

    /// Set a custom name for the history table. Defaults to `_MigrationInfo`.
    pub fn with_history_table(mut self, name: impl Into<String>) -> Self {
        self.table = name.into();
        self
    }

    /// How long to wait on a locked database before giving up. Defaults to 30 seconds.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_inner(self) -> Connection {
        self.conn
    }

    fn quoted_table(&self) -> String {
        quote_ident(&self.table, '"')
    }

    fn table_exists(&self) -> Result<bool, Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
        let exists = stmt.query([&self.table])?.next()?.is_some();
        Ok(exists)
    }
}

impl HistoryStore for SqliteHistory {
    fn table(&self) -> &str {
        &self.table
    }

    fn bootstrap(&mut self) -> Result<bool, Error> {
        self.conn
            .busy_timeout(self.busy_timeout)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let existed = self.table_exists()?;
        if !existed {
            self.conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (version VARCHAR(200) NOT NULL UNIQUE)",
                    self.quoted_table()
                ),
                [],
            )?;
        }
        Ok(!existed)
    }

    fn applied_versions(&mut self) -> Result<Vec<Version>, Error> {
        if !self.table_exists()? {
            return Ok(vec![]);
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT version FROM {}", self.quoted_table()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        parse_history_rows(rows.into_iter().flatten())
    }

    fn execute(&mut self, script: &MigrationScript) -> Result<(), Error> {
        let table = self.quoted_table();
        // dropping the transaction on any early return rolls it back
        let tx = self.conn.transaction()?;
        tx.execute_batch(&script.content)?;
        match script.direction {
            Direction::Up => record_applied(&tx, &table, &script.identifier)?,
            Direction::Down => record_reverted(&tx, &table, script.version())?,
        }
        tx.commit()?;
        Ok(())
    }
}

/// Insert the history row for `identifier` inside `tx`, stored as its stem (`1000_create_users`).
pub(crate) fn record_applied(
    tx: &Transaction,
    table: &str,
    identifier: &Identifier,
) -> Result<(), Error> {
    let version = identifier.version;
    let recorded: i64 = tx.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE version = ?1 OR version LIKE ?2 ESCAPE '\\'",
            table
        ),
        params![version.to_string(), stem_pattern(version)],
        |row| row.get(0),
    )?;
    if recorded > 0 {
        return Err(Error::HistoryInconsistent(format!(
            "version {} is already recorded as applied",
            version
        )));
    }
    tx.execute(
        &format!("INSERT INTO {} (version) VALUES (?1)", table),
        params![identifier.stem()],
    )?;
    Ok(())
}

/// Delete the history row for `version` inside `tx`, whether it holds the bare token or a stem.
pub(crate) fn record_reverted(
    tx: &Transaction,
    table: &str,
    version: Version,
) -> Result<(), Error> {
    let deleted = tx.execute(
        &format!(
            "DELETE FROM {} WHERE version = ?1 OR version LIKE ?2 ESCAPE '\\'",
            table
        ),
        params![version.to_string(), stem_pattern(version)],
    )?;
    if deleted == 0 {
        return Err(Error::HistoryInconsistent(format!(
            "version {} is not recorded as applied",
            version
        )));
    }
    Ok(())
}
