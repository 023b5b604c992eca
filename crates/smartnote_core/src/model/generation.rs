//! AI-derived artifacts and generation bookkeeping records.
//!
//! # Responsibility
//! - Define summary, regeneration and usage records.
//! - Map operation enums to their stable storage spelling.
//!
//! # Invariants
//! - A note has at most one `Summary`; regeneration overwrites it in place.
//! - `RegenerationRecord` and `UsageRecord` are append-only.

use crate::model::note::{NoteId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Persisted AI summary of one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub note_id: NoteId,
    pub content: String,
    /// Model identifier that produced `content`.
    pub model: String,
    /// First generation time, epoch milliseconds. Kept across regenerations.
    pub created_at: i64,
    /// Last overwrite time, epoch milliseconds.
    pub updated_at: i64,
}

/// Operation types subject to the daily regeneration quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Summary,
    Tags,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Tags => "tags",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "summary" => Some(Self::Summary),
            "tags" => Some(Self::Tags),
            _ => None,
        }
    }
}

impl Display for OperationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation types recorded in the usage log.
///
/// First-time generations are logged under their task; every regeneration is
/// logged as `Regeneration` regardless of task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageOperation {
    Summary,
    Tags,
    Regeneration,
}

impl UsageOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Tags => "tags",
            Self::Regeneration => "regeneration",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "summary" => Some(Self::Summary),
            "tags" => Some(Self::Tags),
            "regeneration" => Some(Self::Regeneration),
            _ => None,
        }
    }

    /// Usage operation for a first-time generation or a regeneration of `operation`.
    pub fn for_request(operation: OperationType, is_regeneration: bool) -> Self {
        match (operation, is_regeneration) {
            (_, true) => Self::Regeneration,
            (OperationType::Summary, false) => Self::Summary,
            (OperationType::Tags, false) => Self::Tags,
        }
    }
}

/// One consumed regeneration quota unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerationRecord {
    pub user_id: UserId,
    pub note_id: NoteId,
    pub operation: OperationType,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Token and cost estimate for one successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub user_id: UserId,
    /// `None` for content that is not stored as a note yet.
    pub note_id: Option<NoteId>,
    pub operation: UsageOperation,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    /// Estimated cost in USD.
    pub cost_estimate: f64,
    pub model: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::{OperationType, UsageOperation};

    #[test]
    fn operation_spelling_round_trips_through_storage_names() {
        for op in [OperationType::Summary, OperationType::Tags] {
            assert_eq!(OperationType::parse(op.as_str()), Some(op));
        }
        assert_eq!(UsageOperation::parse("regeneration"), Some(UsageOperation::Regeneration));
        assert_eq!(OperationType::parse("regeneration"), None);
    }

    #[test]
    fn regenerations_are_logged_under_one_usage_operation() {
        assert_eq!(
            UsageOperation::for_request(OperationType::Tags, true),
            UsageOperation::Regeneration
        );
        assert_eq!(
            UsageOperation::for_request(OperationType::Tags, false),
            UsageOperation::Tags
        );
    }
}
