//! Regeneration log repository.
//!
//! # Responsibility
//! - Append immutable regeneration records.
//! - Count records per `(user, operation)` since a day boundary.
//! - Provide the atomic increment-if-under-limit write used by the quota.
//!
//! # Invariants
//! - Rows are never updated or deleted by core code.
//! - `record_if_under_limit` counts and inserts inside one IMMEDIATE
//!   transaction, so concurrent callers cannot both pass the same last slot.

use crate::db::SharedConnection;
use crate::model::generation::{OperationType, RegenerationRecord};
use crate::model::note::UserId;
use crate::repo::note_repo::RepoResult;
use rusqlite::{params, Connection, TransactionBehavior};

/// Result of a conditional quota write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWrite {
    /// Whether a new record was appended.
    pub recorded: bool,
    /// Count for the window after this call.
    pub count: u32,
}

/// Repository interface for the append-only regeneration log.
pub trait RegenerationRepository: Send + Sync {
    fn count_since(&self, user_id: UserId, operation: OperationType, since_ms: i64)
        -> RepoResult<u32>;
    fn insert_record(&self, record: &RegenerationRecord) -> RepoResult<()>;
    /// Appends `record` only when fewer than `limit` rows exist since `since_ms`.
    fn record_if_under_limit(
        &self,
        record: &RegenerationRecord,
        since_ms: i64,
        limit: u32,
    ) -> RepoResult<QuotaWrite>;
}

/// SQLite-backed regeneration log.
#[derive(Clone)]
pub struct SqliteRegenerationRepository {
    conn: SharedConnection,
}

impl SqliteRegenerationRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

impl RegenerationRepository for SqliteRegenerationRepository {
    fn count_since(
        &self,
        user_id: UserId,
        operation: OperationType,
        since_ms: i64,
    ) -> RepoResult<u32> {
        let conn = self.conn.lock()?;
        count_in_window(&conn, user_id, operation, since_ms)
    }

    fn insert_record(&self, record: &RegenerationRecord) -> RepoResult<()> {
        let conn = self.conn.lock()?;
        insert(&conn, record)
    }

    fn record_if_under_limit(
        &self,
        record: &RegenerationRecord,
        since_ms: i64,
        limit: u32,
    ) -> RepoResult<QuotaWrite> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let count = count_in_window(&tx, record.user_id, record.operation, since_ms)?;
        if count >= limit {
            return Ok(QuotaWrite {
                recorded: false,
                count,
            });
        }
        insert(&tx, record)?;
        tx.commit()?;
        Ok(QuotaWrite {
            recorded: true,
            count: count + 1,
        })
    }
}

fn count_in_window(
    conn: &Connection,
    user_id: UserId,
    operation: OperationType,
    since_ms: i64,
) -> RepoResult<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*)
         FROM regeneration_logs
         WHERE user_id = ?1
           AND operation_type = ?2
           AND created_at >= ?3;",
        params![user_id.to_string(), operation.as_str(), since_ms],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn insert(conn: &Connection, record: &RegenerationRecord) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO regeneration_logs (user_id, note_id, operation_type, created_at)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            record.user_id.to_string(),
            record.note_id.to_string(),
            record.operation.as_str(),
            record.created_at,
        ],
    )?;
    Ok(())
}
