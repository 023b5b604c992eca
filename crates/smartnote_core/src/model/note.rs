//! Note and tag domain model.
//!
//! # Responsibility
//! - Define the note record read by generation orchestration.
//! - Own tag cardinality and length limits shared by every write path.
//!
//! # Invariants
//! - A note has exactly one owner for its whole lifetime.
//! - A note carries at most `MAX_TAGS_PER_NOTE` tags of at most
//!   `MAX_TAG_CHARS` characters each.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a note.
pub type NoteId = Uuid;

/// Stable identifier of an authenticated user.
pub type UserId = Uuid;

/// Maximum number of tags stored per note.
pub const MAX_TAGS_PER_NOTE: usize = 6;

/// Maximum tag length in characters.
pub const MAX_TAG_CHARS: usize = 50;

/// A user's note as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub owner_id: UserId,
    pub title: String,
    pub body: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl Note {
    /// Creates a new note with a generated id and current timestamps.
    pub fn new(owner_id: UserId, title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            body: body.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` when `user_id` owns this note.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

/// Rejection reasons for a single tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValidationError {
    Empty,
    TooLong { chars: usize },
    TooMany { limit: usize },
}

impl Display for TagValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "tag cannot be empty"),
            Self::TooLong { chars } => {
                write!(f, "tag has {chars} characters; maximum is {MAX_TAG_CHARS}")
            }
            Self::TooMany { limit } => write!(f, "a note can carry at most {limit} tags"),
        }
    }
}

impl Error for TagValidationError {}

/// Trims one tag value and checks the length limit.
pub fn validate_tag(raw: &str) -> Result<String, TagValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TagValidationError::Empty);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_TAG_CHARS {
        return Err(TagValidationError::TooLong { chars });
    }
    Ok(trimmed.to_string())
}
