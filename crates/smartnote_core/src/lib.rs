//! Core domain logic for SmartNote AI generation.
//! This crate owns quota, classification and persistence invariants for
//! note summaries and tags.

pub mod ai;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use ai::classifier::{
    classify, ClassifiedError, ClassifiedErrorView, ErrorKind, FailureSignal, RecommendedAction,
};
pub use ai::client::{GenerationBackend, GenerationClient, GenerationError, ModelConfig};
pub use ai::http::{HttpBackendConfig, HttpGenerationBackend};
pub use ai::rate_limit::{RateLimitStatus, RegenerationLimiter, DAILY_REGENERATION_LIMIT};
pub use ai::usage::UsageTracker;
pub use config::GenerationSettings;
pub use db::{open_db, open_db_in_memory, DbError, SharedConnection};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::generation::{OperationType, Summary, UsageOperation, UsageRecord};
pub use model::note::{Note, NoteId, UserId};
pub use repo::note_repo::{NoteRepository, RepoError, RepoResult, SqliteNoteRepository};
pub use service::generation_service::{
    GenerationOutcome, GenerationService, GenerationServiceError, NoteTags, Regenerated,
};
pub use service::identity::{IdentityProvider, StaticIdentity};
pub use service::note_service::{NoteService, NoteServiceError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
