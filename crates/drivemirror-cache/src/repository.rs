//! SQLite implementation of IStateRepository
//!
//! This module provides the concrete SQLite-based implementation of the
//! state repository port defined in drivemirror-core. It handles all domain
//! type conversion and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type                   | SQL Type | Strategy                                   |
//! |-------------------------------|----------|--------------------------------------------|
//! | RemoteId, LocalFileId         | TEXT     | String via `.as_str()` / `::new()`          |
//! | RelativePath                  | TEXT     | String via `.as_str()` / `RelativePath::new()` |
//! | FileHash, DeltaToken          | TEXT     | String via `.as_str()` / `::new()`          |
//! | TransferId                    | TEXT     | UUID string via `.to_string()` / `FromStr`  |
//! | DateTime<Utc>                 | TEXT     | Fixed-width RFC 3339, microseconds, `Z`     |
//! | SyncState, TransferKind/Status| TEXT     | Lowercase name via explicit mapping         |
//! | u64 sizes and counters        | INTEGER  | `as i64` / `as u64`                         |
//!
//! Fixed-width timestamps make lexical order equal chronological order,
//! which the pending-download and pending-upload queries rely on.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use drivemirror_core::domain::{
    newtypes::{DeltaToken, FileHash, LocalFileId, RelativePath, RemoteId, TransferId},
    LocalFile, RemoteItem, ResumptionToken, SyncState, TransferKind, TransferLog, TransferStatus,
};
use drivemirror_core::ports::IStateRepository;

use crate::CacheError;

/// SQLite-based implementation of the state repository port
///
/// Every mutation runs either as a single statement or inside an explicit
/// transaction, so readers never observe a half-applied batch.
#[derive(Debug, Clone)]
pub struct SqliteStateRepository {
    pool: SqlitePool,
}

impl SqliteStateRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Deserialize a SyncState from its stored string representation
fn sync_state_from_string(s: &str) -> Result<SyncState, CacheError> {
    SyncState::ALL
        .iter()
        .copied()
        .find(|state| state.as_str() == s)
        .ok_or_else(|| CacheError::SerializationError(format!("Unknown sync state: {}", s)))
}

fn transfer_kind_from_string(s: &str) -> Result<TransferKind, CacheError> {
    match s {
        "download" => Ok(TransferKind::Download),
        "upload" => Ok(TransferKind::Upload),
        "delete" => Ok(TransferKind::Delete),
        other => Err(CacheError::SerializationError(format!(
            "Unknown transfer kind: {}",
            other
        ))),
    }
}

fn transfer_status_from_string(s: &str) -> Result<TransferStatus, CacheError> {
    match s {
        "pending" => Ok(TransferStatus::Pending),
        "in_progress" => Ok(TransferStatus::InProgress),
        "success" => Ok(TransferStatus::Success),
        "failed" => Ok(TransferStatus::Failed),
        other => Err(CacheError::SerializationError(format!(
            "Unknown transfer status: {}",
            other
        ))),
    }
}

/// Format a timestamp as fixed-width RFC 3339 text
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by hand or by the sqlite CLI use the SQLite default format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn parse_optional_hash(s: Option<String>) -> Result<Option<FileHash>, CacheError> {
    s.filter(|h| !h.is_empty())
        .map(FileHash::new)
        .transpose()
        .map_err(CacheError::from)
}

/// Offset of the first row of page `page_index`
fn page_offset(page_size: u32, page_index: u32) -> i64 {
    i64::from(page_size) * i64::from(page_index)
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn remote_item_from_row(row: &SqliteRow) -> Result<RemoteItem, CacheError> {
    let id: String = row.get("id");
    let path: String = row.get("path");
    let size: i64 = row.get("size");
    let last_modified: String = row.get("last_modified");

    Ok(RemoteItem {
        id: RemoteId::new(id)?,
        path: RelativePath::new(path)?,
        etag: row.get("etag"),
        ctag: row.get("ctag"),
        size: size as u64,
        last_modified: parse_datetime(&last_modified)?,
        is_folder: row.get("is_folder"),
        is_deleted: row.get("is_deleted"),
        hash: parse_optional_hash(row.get("hash"))?,
    })
}

fn local_file_from_row(row: &SqliteRow) -> Result<LocalFile, CacheError> {
    let id: String = row.get("id");
    let path: String = row.get("path");
    let size: i64 = row.get("size");
    let last_write_time: String = row.get("last_write_time");
    let state: String = row.get("state");

    let file = LocalFile::new(
        LocalFileId::new(id)?,
        RelativePath::new(path)?,
        size as u64,
        parse_datetime(&last_write_time)?,
        sync_state_from_string(&state)?,
    )
    .with_hash(parse_optional_hash(row.get("hash"))?);

    Ok(file)
}

fn transfer_log_from_row(row: &SqliteRow) -> Result<TransferLog, CacheError> {
    let id: String = row.get("id");
    let kind: String = row.get("kind");
    let started_at: String = row.get("started_at");
    let status: String = row.get("status");
    let bytes: i64 = row.get("bytes_transferred");

    Ok(TransferLog {
        id: TransferId::from_str(&id)?,
        kind: transfer_kind_from_string(&kind)?,
        item_id: row.get("item_id"),
        started_at: parse_datetime(&started_at)?,
        completed_at: parse_optional_datetime(row.get("completed_at"))?,
        status: transfer_status_from_string(&status)?,
        bytes_transferred: bytes as u64,
        error: row.get("error"),
    })
}

const UPSERT_LOCAL_FILE_SQL: &str = "INSERT INTO local_files \
     (id, path, hash, size, last_write_time, state) \
     VALUES (?, ?, ?, ?, ?, ?) \
     ON CONFLICT(id) DO UPDATE SET \
         path = excluded.path, \
         hash = excluded.hash, \
         size = excluded.size, \
         last_write_time = excluded.last_write_time, \
         state = excluded.state";

/// Remote item has a local file in sync with it, matched by id or by path
const LOCAL_COPY_IN_SYNC: &str = "EXISTS (SELECT 1 FROM local_files l \
     WHERE (l.id = r.id OR l.path = r.path) \
     AND l.state IN ('downloaded', 'uploaded'))";

// ============================================================================
// IStateRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateRepository for SqliteStateRepository {
    // --- Resumption token ---

    async fn get_resumption_token(&self) -> anyhow::Result<Option<ResumptionToken>> {
        let row = sqlx::query("SELECT token, last_synced_at FROM resumption_token WHERE slot = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => {
                let token: String = r.get("token");
                let last_synced_at: String = r.get("last_synced_at");
                Ok(Some(ResumptionToken {
                    token: DeltaToken::new(token)?,
                    last_synced_at: parse_datetime(&last_synced_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_or_update_token(&self, token: &ResumptionToken) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO resumption_token (slot, token, last_synced_at) VALUES (1, ?, ?) \
             ON CONFLICT(slot) DO UPDATE SET \
                 token = excluded.token, \
                 last_synced_at = excluded.last_synced_at",
        )
        .bind(token.token.as_str())
        .bind(format_datetime(&token.last_synced_at))
        .execute(&self.pool)
        .await?;

        tracing::trace!("Saved resumption token");
        Ok(())
    }

    // --- Remote items ---

    async fn apply_remote_items(&self, items: &[RemoteItem]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            // A tombstone keeps the last known path: deleted entries in the
            // feed often carry only a name.
            sqlx::query(
                "INSERT INTO remote_items \
                 (id, path, etag, ctag, size, last_modified, is_folder, is_deleted, hash) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET \
                     path = CASE WHEN excluded.is_deleted = 1 \
                                 THEN remote_items.path ELSE excluded.path END, \
                     etag = excluded.etag, \
                     ctag = excluded.ctag, \
                     size = excluded.size, \
                     last_modified = excluded.last_modified, \
                     is_folder = excluded.is_folder, \
                     is_deleted = excluded.is_deleted, \
                     hash = excluded.hash",
            )
            .bind(item.id.as_str())
            .bind(item.path.as_str())
            .bind(&item.etag)
            .bind(&item.ctag)
            .bind(item.size as i64)
            .bind(format_datetime(&item.last_modified))
            .bind(item.is_folder)
            .bind(item.is_deleted)
            .bind(item.hash.as_ref().map(|h| h.as_str()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::trace!(count = items.len(), "Applied remote items");
        Ok(())
    }

    async fn get_pending_downloads(
        &self,
        page_size: u32,
        page_index: u32,
    ) -> anyhow::Result<Vec<RemoteItem>> {
        let sql = format!(
            "SELECT r.* FROM remote_items r \
             WHERE r.is_deleted = 0 AND r.is_folder = 0 AND NOT {LOCAL_COPY_IN_SYNC} \
             ORDER BY r.last_modified ASC, r.id ASC \
             LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(i64::from(page_size))
            .bind(page_offset(page_size, page_index))
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(remote_item_from_row(row)?);
        }

        Ok(items)
    }

    async fn get_pending_download_count(&self) -> anyhow::Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM remote_items r \
             WHERE r.is_deleted = 0 AND r.is_folder = 0 AND NOT {LOCAL_COPY_IN_SYNC}"
        );

        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn get_remote_item(&self, id: &RemoteId) -> anyhow::Result<Option<RemoteItem>> {
        let row = sqlx::query("SELECT * FROM remote_items WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(remote_item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_remote_item_by_path(
        &self,
        path: &RelativePath,
    ) -> anyhow::Result<Option<RemoteItem>> {
        let row = sqlx::query(
            "SELECT * FROM remote_items WHERE path = ? \
             ORDER BY is_deleted ASC, last_modified DESC LIMIT 1",
        )
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(remote_item_from_row(r)?)),
            None => Ok(None),
        }
    }

    // --- Local files ---

    async fn mark_local_file_state(
        &self,
        remote_id: &RemoteId,
        state: SyncState,
    ) -> anyhow::Result<LocalFile> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM remote_items WHERE id = ?")
            .bind(remote_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let remote = match row {
            Some(ref r) => remote_item_from_row(r)?,
            None => anyhow::bail!("Remote item {} not found", remote_id),
        };

        let file = LocalFile::new(
            LocalFileId::from(&remote.id),
            remote.path.clone(),
            remote.size,
            remote.last_modified,
            state,
        )
        .with_hash(remote.hash.clone());

        sqlx::query("DELETE FROM local_files WHERE path = ? AND id <> ?")
            .bind(file.path.as_str())
            .bind(file.id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(UPSERT_LOCAL_FILE_SQL)
            .bind(file.id.as_str())
            .bind(file.path.as_str())
            .bind(file.hash.as_ref().map(|h| h.as_str()))
            .bind(file.size as i64)
            .bind(format_datetime(&file.last_write_time))
            .bind(file.state.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::trace!(remote_id = %remote_id, state = %state, "Marked local file state");
        Ok(file)
    }

    async fn add_or_update_local_file(&self, file: &LocalFile) -> anyhow::Result<()> {
        sqlx::query(UPSERT_LOCAL_FILE_SQL)
            .bind(file.id.as_str())
            .bind(file.path.as_str())
            .bind(file.hash.as_ref().map(|h| h.as_str()))
            .bind(file.size as i64)
            .bind(format_datetime(&file.last_write_time))
            .bind(file.state.as_str())
            .execute(&self.pool)
            .await?;

        tracing::trace!(file_id = %file.id, state = %file.state, "Saved local file");
        Ok(())
    }

    async fn get_pending_uploads(
        &self,
        page_size: u32,
        page_index: u32,
    ) -> anyhow::Result<Vec<LocalFile>> {
        let rows = sqlx::query(
            "SELECT * FROM local_files WHERE state = ? \
             ORDER BY last_write_time ASC, id ASC \
             LIMIT ? OFFSET ?",
        )
        .bind(SyncState::PendingUpload.as_str())
        .bind(i64::from(page_size))
        .bind(page_offset(page_size, page_index))
        .fetch_all(&self.pool)
        .await?;

        let mut files = Vec::with_capacity(rows.len());
        for row in &rows {
            files.push(local_file_from_row(row)?);
        }

        Ok(files)
    }

    async fn get_pending_upload_count(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM local_files WHERE state = ?")
            .bind(SyncState::PendingUpload.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn get_local_file_by_path(
        &self,
        path: &RelativePath,
    ) -> anyhow::Result<Option<LocalFile>> {
        let row = sqlx::query("SELECT * FROM local_files WHERE path = ? ORDER BY id LIMIT 1")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(local_file_from_row(r)?)),
            None => Ok(None),
        }
    }

    // --- Transfer logs ---

    async fn log_transfer(&self, log: &TransferLog) -> anyhow::Result<()> {
        let id = log.id.to_string();

        sqlx::query(
            "INSERT INTO transfer_logs \
             (id, kind, item_id, started_at, completed_at, status, bytes_transferred, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                 completed_at = excluded.completed_at, \
                 status = excluded.status, \
                 bytes_transferred = excluded.bytes_transferred, \
                 error = excluded.error",
        )
        .bind(&id)
        .bind(log.kind.as_str())
        .bind(&log.item_id)
        .bind(format_datetime(&log.started_at))
        .bind(log.completed_at.as_ref().map(format_datetime))
        .bind(log.status.as_str())
        .bind(log.bytes_transferred as i64)
        .bind(&log.error)
        .execute(&self.pool)
        .await?;

        tracing::trace!(transfer_id = %id, status = %log.status, "Logged transfer");
        Ok(())
    }

    async fn get_transfer_logs(&self, item_id: &str) -> anyhow::Result<Vec<TransferLog>> {
        let rows = sqlx::query(
            "SELECT * FROM transfer_logs WHERE item_id = ? ORDER BY started_at ASC, id ASC",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            logs.push(transfer_log_from_row(row)?);
        }

        Ok(logs)
    }
}
