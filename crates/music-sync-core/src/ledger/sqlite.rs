use rusqlite::{Connection, Result};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA_VERSION: i64 = 1;

/// Durable store of ingested hashes and per-file outcomes.
///
/// Every write is its own transaction, so an interrupted run leaves the ledger
/// matching exactly the files finished so far. The connection sits behind a
/// mutex so concurrent workers serialize their writes.
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let ledger = Ledger {
            conn: Mutex::new(conn),
        };
        ledger.configure_pragmas()?;
        ledger.migrate_schema()?;
        Ok(ledger)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.connection().execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode)");
        Ok(())
    }

    /// Tables are only ever created, never dropped.
    fn migrate_schema(&self) -> Result<()> {
        let conn = self.connection();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            debug!(
                "Ledger schema version {} is newer than {}, opening anyway",
                version, SCHEMA_VERSION
            );
            return Ok(());
        }
        conn.execute_batch(include_str!("schema.sql"))?;
        debug!("Ledger schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }

    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.connection().execute_batch(
            "DELETE FROM operation_log;
             DELETE FROM music_hash;",
        )?;
        debug!("All ledger tables truncated");
        Ok(())
    }
}
