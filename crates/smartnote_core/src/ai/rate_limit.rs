//! Daily regeneration quota.
//!
//! # Responsibility
//! - Count regenerations per `(user, operation)` since local midnight.
//! - Consume quota units through one atomic increment-if-under-limit write.
//!
//! # Invariants
//! - Summary and tags quotas are tracked independently.
//! - `check_and_record` never lets the count exceed the limit, even under
//!   concurrent requests from the same user.

use crate::model::generation::{OperationType, RegenerationRecord};
use crate::model::note::{NoteId, UserId};
use crate::repo::note_repo::RepoResult;
use crate::repo::regeneration_repo::RegenerationRepository;
use chrono::{DateTime, Local, TimeZone, Timelike};
use log::info;
use serde::Serialize;
use std::sync::Arc;

/// Regenerations allowed per user, per operation type, per local day.
pub const DAILY_REGENERATION_LIMIT: u32 = 10;

/// Quota decision, rendered by callers as `"N/limit"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub current_count: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RateLimitStatus {
    fn evaluate(operation: OperationType, current_count: u32, limit: u32, allowed: bool) -> Self {
        Self {
            allowed,
            current_count,
            limit,
            message: (!allowed).then(|| denial_message(operation, limit)),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.current_count)
    }

    /// `"current/limit"`, e.g. `"3/10"`.
    pub fn display(&self) -> String {
        format!("{}/{}", self.current_count, self.limit)
    }
}

fn denial_message(operation: OperationType, limit: u32) -> String {
    format!("daily {operation} regeneration limit reached ({limit}/{limit}); try again tomorrow")
}

/// Epoch milliseconds of the most recent local midnight.
pub fn local_day_start_ms() -> i64 {
    day_start_ms(&Local::now())
}

fn day_start_ms<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| now.timezone().from_local_datetime(&naive).earliest());
    match midnight {
        Some(midnight) => midnight.timestamp_millis(),
        // No local midnight today (DST gap at 00:00): fall back to wall-clock offset.
        None => {
            let elapsed_ms = i64::from(now.num_seconds_from_midnight()) * 1000
                + i64::from(now.timestamp_subsec_millis());
            now.timestamp_millis() - elapsed_ms
        }
    }
}

/// Quota gate in front of regeneration requests.
#[derive(Clone)]
pub struct RegenerationLimiter {
    repo: Arc<dyn RegenerationRepository>,
    limit: u32,
}

impl RegenerationLimiter {
    pub fn new(repo: Arc<dyn RegenerationRepository>) -> Self {
        Self::with_limit(repo, DAILY_REGENERATION_LIMIT)
    }

    pub fn with_limit(repo: Arc<dyn RegenerationRepository>, limit: u32) -> Self {
        Self { repo, limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Reports today's count without consuming quota.
    pub fn check_limit(&self, user_id: UserId, operation: OperationType) -> RepoResult<RateLimitStatus> {
        let count = self
            .repo
            .count_since(user_id, operation, local_day_start_ms())?;
        Ok(RateLimitStatus::evaluate(
            operation,
            count,
            self.limit,
            count < self.limit,
        ))
    }

    /// Appends one record unconditionally.
    pub fn record(&self, user_id: UserId, note_id: NoteId, operation: OperationType) -> RepoResult<()> {
        self.repo.insert_record(&RegenerationRecord {
            user_id,
            note_id,
            operation,
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Consumes one quota unit if any remain today.
    pub fn check_and_record(
        &self,
        user_id: UserId,
        note_id: NoteId,
        operation: OperationType,
    ) -> RepoResult<RateLimitStatus> {
        let record = RegenerationRecord {
            user_id,
            note_id,
            operation,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        let write = self
            .repo
            .record_if_under_limit(&record, local_day_start_ms(), self.limit)?;
        if !write.recorded {
            info!(
                "event=regeneration_quota module=ai status=denied operation={operation} count={} limit={}",
                write.count, self.limit
            );
        }
        Ok(RateLimitStatus::evaluate(
            operation,
            write.count,
            self.limit,
            write.recorded,
        ))
    }
}
