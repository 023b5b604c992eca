//! Usage log repository.
//!
//! # Responsibility
//! - Append token/cost estimates for successful generations.
//! - Serve per-user listings and daily rollups.
//!
//! # Invariants
//! - Rows are append-only.

use crate::db::SharedConnection;
use crate::model::generation::{UsageOperation, UsageRecord};
use crate::model::note::UserId;
use crate::repo::note_repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Row};
use serde::Serialize;

/// Aggregated usage for one user over a time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub requests: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_estimate: f64,
}

/// Repository interface for the append-only usage log.
pub trait UsageRepository: Send + Sync {
    fn insert_usage(&self, record: &UsageRecord) -> RepoResult<()>;
    /// Most recent records first.
    fn list_usage(&self, user_id: UserId, limit: u32) -> RepoResult<Vec<UsageRecord>>;
    fn totals_since(&self, user_id: UserId, since_ms: i64) -> RepoResult<UsageTotals>;
}

/// SQLite-backed usage log.
#[derive(Clone)]
pub struct SqliteUsageRepository {
    conn: SharedConnection,
}

impl SqliteUsageRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

impl UsageRepository for SqliteUsageRepository {
    fn insert_usage(&self, record: &UsageRecord) -> RepoResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO usage_logs (
                user_id,
                note_id,
                operation_type,
                input_tokens,
                output_tokens,
                total_tokens,
                cost_estimate,
                model,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                record.user_id.to_string(),
                record.note_id.map(|id| id.to_string()),
                record.operation.as_str(),
                record.input_tokens,
                record.output_tokens,
                record.total_tokens,
                record.cost_estimate,
                record.model.as_str(),
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn list_usage(&self, user_id: UserId, limit: u32) -> RepoResult<Vec<UsageRecord>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT
                user_id,
                note_id,
                operation_type,
                input_tokens,
                output_tokens,
                total_tokens,
                cost_estimate,
                model,
                created_at
             FROM usage_logs
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![user_id.to_string(), limit])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_usage_row(row)?);
        }
        Ok(records)
    }

    fn totals_since(&self, user_id: UserId, since_ms: i64) -> RepoResult<UsageTotals> {
        let conn = self.conn.lock()?;
        let totals = conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(input_tokens), 0),
                COALESCE(SUM(output_tokens), 0),
                COALESCE(SUM(total_tokens), 0),
                COALESCE(SUM(cost_estimate), 0.0)
             FROM usage_logs
             WHERE user_id = ?1
               AND created_at >= ?2;",
            params![user_id.to_string(), since_ms],
            |row| {
                Ok(UsageTotals {
                    requests: row.get(0)?,
                    input_tokens: row.get::<_, i64>(1)? as u64,
                    output_tokens: row.get::<_, i64>(2)? as u64,
                    total_tokens: row.get::<_, i64>(3)? as u64,
                    cost_estimate: row.get(4)?,
                })
            },
        )?;
        Ok(totals)
    }
}

fn parse_usage_row(row: &Row<'_>) -> RepoResult<UsageRecord> {
    let user_id: String = row.get("user_id")?;
    let note_id = match row.get::<_, Option<String>>("note_id")? {
        Some(value) => Some(parse_uuid(&value, "usage_logs.note_id")?),
        None => None,
    };
    let operation_text: String = row.get("operation_type")?;
    let operation = UsageOperation::parse(&operation_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid operation `{operation_text}` in usage_logs.operation_type"
        ))
    })?;

    Ok(UsageRecord {
        user_id: parse_uuid(&user_id, "usage_logs.user_id")?,
        note_id,
        operation,
        input_tokens: row.get("input_tokens")?,
        output_tokens: row.get("output_tokens")?,
        total_tokens: row.get("total_tokens")?,
        cost_estimate: row.get("cost_estimate")?,
        model: row.get("model")?,
        created_at: row.get("created_at")?,
    })
}
