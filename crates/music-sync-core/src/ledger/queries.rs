use super::models::*;
use super::sqlite::Ledger;
use crate::outcome::SUCCESS_TAGS;
use rusqlite::{params, Connection, Result, Row};
use tracing::{debug, info};

const UPSERT_OPERATION: &str = "INSERT INTO operation_log \
     (original_path, mtime, content_hash, result, logged_at) \
     VALUES (?1, ?2, ?3, ?4, ?5) \
     ON CONFLICT(original_path, mtime) DO UPDATE SET \
         content_hash = excluded.content_hash, \
         result = excluded.result, \
         logged_at = excluded.logged_at";

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn insert_hash(conn: &Connection, content_hash: &str) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO music_hash (content_hash, first_seen_at) VALUES (?1, ?2)",
        params![content_hash, now()],
    )?;
    if inserted == 1 {
        debug!("Recorded new music hash: {}", content_hash);
    } else {
        debug!("Music hash {} already recorded", content_hash);
    }
    Ok(inserted == 1)
}

fn processing_record(row: &Row<'_>) -> Result<ProcessingRecord> {
    Ok(ProcessingRecord {
        id: row.get(0)?,
        original_path: row.get(1)?,
        mtime: row.get(2)?,
        content_hash: row.get(3)?,
        result: row.get(4)?,
        logged_at: row.get(5)?,
    })
}

impl Ledger {
    // ── Ingested hashes ──────────────────────────────────────────

    pub fn has_ingested(&self, content_hash: &str) -> Result<bool> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM music_hash WHERE content_hash = ?1",
            params![content_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Idempotent. Returns `true` only for the call that actually inserted the hash.
    pub fn record_ingested(&self, content_hash: &str) -> Result<bool> {
        insert_hash(&self.connection(), content_hash)
    }

    /// Undo an ingest whose file could not be put in place, so the content
    /// is not treated as present on later runs.
    pub fn revoke_ingested(&self, content_hash: &str) -> Result<bool> {
        let removed = self.connection().execute(
            "DELETE FROM music_hash WHERE content_hash = ?1",
            params![content_hash],
        )?;
        debug!("Revoked music hash {} ({} rows)", content_hash, removed);
        Ok(removed == 1)
    }

    pub fn ingested_count(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM music_hash", [], |row| row.get(0))
    }

    // ── Operation log ────────────────────────────────────────────

    pub fn previous_result(&self, path: &str, mtime: i64) -> Result<Option<String>> {
        match self.connection().query_row(
            "SELECT result FROM operation_log WHERE original_path = ?1 AND mtime = ?2",
            params![path, mtime],
            |row| row.get(0),
        ) {
            Ok(result) => Ok(Some(result)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Record the outcome of one file version. With `persist == false` this is
    /// a log line only and the store is left untouched.
    pub fn log_operation(
        &self,
        path: &str,
        mtime: i64,
        content_hash: Option<&str>,
        result: &str,
        persist: bool,
    ) -> Result<()> {
        if persist {
            self.connection()
                .execute(UPSERT_OPERATION, params![path, mtime, content_hash, result, now()])?;
            info!(path, mtime, result, "LOG (DB)");
        } else {
            info!(path, mtime, result, "LOG");
        }
        Ok(())
    }

    /// Insert the hash and the success record in one transaction. The hash
    /// insert is the gate: when another worker got there first nothing is
    /// written and `false` is returned.
    pub fn commit_ingest(
        &self,
        path: &str,
        mtime: i64,
        content_hash: &str,
        result: &str,
    ) -> Result<bool> {
        let conn = self.connection();
        let tx = conn.unchecked_transaction()?;
        if !insert_hash(&tx, content_hash)? {
            tx.rollback()?;
            return Ok(false);
        }
        tx.execute(UPSERT_OPERATION, params![path, mtime, content_hash, result, now()])?;
        tx.commit()?;
        info!(path, mtime, result, "LOG (DB)");
        Ok(true)
    }

    pub fn operation_count(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM operation_log", [], |row| row.get(0))
    }

    pub fn records_for_path(&self, path: &str) -> Result<Vec<ProcessingRecord>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT id, original_path, mtime, content_hash, result, logged_at \
             FROM operation_log WHERE original_path = ?1 ORDER BY mtime DESC",
        )?;
        let records = stmt
            .query_map(params![path], processing_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn recent_records(&self, limit: i64) -> Result<Vec<ProcessingRecord>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT id, original_path, mtime, content_hash, result, logged_at \
             FROM operation_log ORDER BY logged_at DESC, id DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit], processing_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn summary(&self) -> Result<LedgerSummary> {
        let ingested_hashes = self.ingested_count()?;
        let processing_records = self.operation_count()?;

        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT result, COUNT(*) AS n FROM operation_log \
             GROUP BY result ORDER BY n DESC, result ASC",
        )?;
        let by_result = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;

        Ok(LedgerSummary {
            ingested_hashes,
            processing_records,
            by_result,
        })
    }

    /// Delete every record whose result is not a success. Returns the number removed.
    pub fn forget_failures(&self) -> Result<usize> {
        let removed = self.connection().execute(
            "DELETE FROM operation_log WHERE result NOT IN (?1, ?2, ?3)",
            params![SUCCESS_TAGS[0], SUCCESS_TAGS[1], SUCCESS_TAGS[2]],
        )?;
        debug!("Removed {} non-success records", removed);
        Ok(removed)
    }
}
