//! History of collection runs: when each kind of data was last synced and
//! which runs failed.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::models::{SyncCounts, SyncEntry, SyncOperation, SyncStatus};
use super::queries::conversion_error;
use super::schema::PitcherDatabase;
use crate::error::Result;

/// Entries kept in the log; older ones are pruned on insert.
pub const SYNC_HISTORY_LIMIT: i64 = 100;

const SYNC_COLUMNS: &str = "id, operation, scope, status, started_at, finished_at, \
     inserted, updated, unchanged, duplicates, error";

fn read_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| conversion_error(idx, format!("bad timestamp {secs}")))
}

fn read_count(row: &Row, idx: usize) -> rusqlite::Result<usize> {
    let n: i64 = row.get(idx)?;
    usize::try_from(n).map_err(|_| conversion_error(idx, format!("bad count {n}")))
}

fn entry_from_row(row: &Row) -> rusqlite::Result<SyncEntry> {
    let operation: String = row.get(1)?;
    let status: String = row.get(3)?;
    Ok(SyncEntry {
        id: row.get(0)?,
        operation: operation.parse().map_err(|e| conversion_error(1, format!("{e}")))?,
        scope: row.get(2)?,
        status: status.parse().map_err(|e| conversion_error(3, format!("{e}")))?,
        started_at: read_timestamp(row, 4)?,
        finished_at: read_timestamp(row, 5)?,
        counts: SyncCounts {
            inserted: read_count(row, 6)?,
            updated: read_count(row, 7)?,
            unchanged: read_count(row, 8)?,
            duplicates: read_count(row, 9)?,
        },
        error: row.get(10)?,
    })
}

impl PitcherDatabase {
    /// Append one run to the sync log.
    ///
    /// `outcome` is the run's counts on success or its error message.
    pub fn record_sync(
        &mut self,
        operation: SyncOperation,
        scope: &str,
        started_at: DateTime<Utc>,
        outcome: std::result::Result<SyncCounts, String>,
    ) -> Result<SyncEntry> {
        let (status, counts, error) = match outcome {
            Ok(counts) => (SyncStatus::Success, counts, None),
            Err(message) => (SyncStatus::Failed, SyncCounts::default(), Some(message)),
        };
        let finished_at = Utc::now();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO sync_log (operation, scope, status, started_at, finished_at, \
             inserted, updated, unchanged, duplicates, error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                operation.as_str(),
                scope,
                status.as_str(),
                started_at.timestamp(),
                finished_at.timestamp(),
                counts.inserted as i64,
                counts.updated as i64,
                counts.unchanged as i64,
                counts.duplicates as i64,
                error,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "DELETE FROM sync_log WHERE id <= (SELECT MAX(id) FROM sync_log) - ?1",
            [SYNC_HISTORY_LIMIT],
        )?;
        tx.commit()?;

        Ok(SyncEntry {
            id,
            operation,
            scope: scope.to_string(),
            status,
            started_at: DateTime::from_timestamp(started_at.timestamp(), 0).unwrap_or(started_at),
            finished_at: DateTime::from_timestamp(finished_at.timestamp(), 0).unwrap_or(finished_at),
            counts,
            error,
        })
    }

    /// Finish time of the newest successful run of `operation`.
    pub fn last_sync(&self, operation: SyncOperation) -> Result<Option<DateTime<Utc>>> {
        let sql = format!(
            "SELECT {SYNC_COLUMNS} FROM sync_log WHERE operation = ?1 AND status = ?2 \
             ORDER BY id DESC LIMIT 1"
        );
        let entry = self
            .conn
            .query_row(&sql, params![operation.as_str(), SyncStatus::Success.as_str()], entry_from_row)
            .optional()?;
        Ok(entry.map(|e| e.finished_at))
    }

    /// Logged runs, newest first, optionally for one operation only.
    pub fn sync_history(&self, operation: Option<SyncOperation>, limit: usize) -> Result<Vec<SyncEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SYNC_COLUMNS} FROM sync_log \
             WHERE (?1 IS NULL OR operation = ?1) ORDER BY id DESC LIMIT ?2"
        ))?;
        let entries = stmt
            .query_map(params![operation.map(SyncOperation::as_str), limit], entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
