//! Summary and tag generation use-cases.
//!
//! # Responsibility
//! - Resolve the acting user and the owned note in one scoped lookup.
//! - Validate and truncate content, build the task prompt, invoke the model.
//! - Post-process output, persist it, and record usage off the request path.
//! - Gate regenerations behind the daily quota.
//!
//! A first-time request (`generate_*`) on a note that already has the
//! artifact is a regeneration: it consumes quota and is logged as one.
//!
//! # Invariants
//! - Nothing is invoked or persisted unless the acting user owns the note;
//!   a foreign note and a missing note produce the same `NoteNotFound`.
//! - Remote and timeout failures are always classified and never persisted.
//! - Quota is consumed before the remote call; a failed call does not refund it.
//! - Each request walks `GenerationStage` forward only and ends in
//!   `Rejected`, `Failed` or `Succeeded`. There is no automatic retry.

use crate::ai::classifier::{
    classify, classify_generation_error, ClassifiedError, ClassifiedErrorView, FailureSignal,
};
use crate::ai::client::{GenerationBackend, GenerationClient};
use crate::ai::output::{clean_summary, parse_tags};
use crate::ai::prompt::{summary_prompt, tags_prompt, truncate_content};
use crate::ai::rate_limit::{RateLimitStatus, RegenerationLimiter};
use crate::ai::usage::{UsageEstimate, UsageTracker};
use crate::config::GenerationSettings;
use crate::db::SharedConnection;
use crate::model::generation::{OperationType, Summary, UsageOperation, UsageRecord};
use crate::model::note::{Note, NoteId, UserId};
use crate::repo::note_repo::{NoteRepository, RepoError, RepoResult, SqliteNoteRepository};
use crate::repo::regeneration_repo::SqliteRegenerationRepository;
use crate::repo::usage_repo::SqliteUsageRepository;
use crate::service::identity::IdentityProvider;
use log::{debug, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Service error for generation use-cases.
#[derive(Debug)]
pub enum GenerationServiceError {
    /// No authenticated user on this request.
    Unauthenticated,
    /// Note id is not a valid UUID.
    InvalidNoteId(String),
    /// Note is missing or owned by someone else.
    NoteNotFound,
    ContentTooShort {
        min_chars: usize,
        actual_chars: usize,
    },
    /// Daily regeneration quota is used up.
    RateLimited(RateLimitStatus),
    /// Remote call or its output failed; always classified.
    Generation(ClassifiedError),
    /// Result could not be written.
    SaveFailed(RepoError),
    /// Storage failed before the remote call.
    Storage(RepoError),
}

impl GenerationServiceError {
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Generation(classified) => Some(classified),
            _ => None,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidNoteId(_) => "invalid_note_id",
            Self::NoteNotFound => "note_not_found",
            Self::ContentTooShort { .. } => "content_too_short",
            Self::RateLimited(_) => "rate_limited",
            Self::Generation(_) => "generation_failed",
            Self::SaveFailed(_) => "save_failed",
            Self::Storage(_) => "storage_failed",
        }
    }
}

impl Display for GenerationServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "authentication required"),
            Self::InvalidNoteId(value) => write!(f, "invalid note id: `{value}`"),
            Self::NoteNotFound => write!(f, "note not found"),
            Self::ContentTooShort {
                min_chars,
                actual_chars,
            } => write!(
                f,
                "note content is too short to generate from (minimum {min_chars} characters, got {actual_chars})"
            ),
            Self::RateLimited(status) => match status.message.as_deref() {
                Some(message) => f.write_str(message),
                None => write!(f, "regeneration limit reached ({})", status.display()),
            },
            Self::Generation(classified) => f.write_str(&classified.message),
            Self::SaveFailed(err) => write!(f, "save failed: {err}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl Error for GenerationServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Generation(classified) => Some(classified),
            Self::SaveFailed(err) | Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

/// Caller-facing result envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classified_error: Option<ClassifiedErrorView>,
}

impl<T> From<Result<T, GenerationServiceError>> for GenerationOutcome<T> {
    fn from(value: Result<T, GenerationServiceError>) -> Self {
        match value {
            Ok(payload) => Self {
                success: true,
                payload: Some(payload),
                error: None,
                classified_error: None,
            },
            Err(err) => Self {
                success: false,
                payload: None,
                error: Some(err.to_string()),
                classified_error: err.classified().map(ClassifiedError::view),
            },
        }
    }
}

/// Persisted tag set of one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTags {
    pub note_id: NoteId,
    pub tags: Vec<String>,
}

/// Regeneration result together with the quota state after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Regenerated<T> {
    pub result: T,
    pub quota: RateLimitStatus,
}

/// Per-request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    Idle,
    Validating,
    Rejected,
    Invoking,
    PostProcessing,
    Persisting,
    Succeeded,
    Failed,
}

impl GenerationStage {
    pub fn can_advance_to(self, next: GenerationStage) -> bool {
        use GenerationStage::{
            Failed, Idle, Invoking, Persisting, PostProcessing, Rejected, Succeeded, Validating,
        };
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Rejected | Invoking)
                | (Invoking, Failed | PostProcessing)
                // preview requests skip persistence
                | (PostProcessing, Failed | Persisting | Succeeded)
                | (Persisting, Failed | Succeeded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Failed | Self::Succeeded)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Rejected => "rejected",
            Self::Invoking => "invoking",
            Self::PostProcessing => "post_processing",
            Self::Persisting => "persisting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

struct RequestTrace {
    request: &'static str,
    stage: GenerationStage,
    started_at: Instant,
}

impl RequestTrace {
    fn start(request: &'static str) -> Self {
        let mut trace = Self {
            request,
            stage: GenerationStage::Idle,
            started_at: Instant::now(),
        };
        trace.advance(GenerationStage::Validating);
        trace
    }

    fn advance(&mut self, next: GenerationStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage transition {:?} -> {:?}",
            self.stage,
            next
        );
        debug!(
            "event=generation_stage module=service request={} from={} to={}",
            self.request,
            self.stage.as_str(),
            next.as_str()
        );
        self.stage = next;
    }

    fn succeed(&mut self) {
        self.advance(GenerationStage::Succeeded);
        info!(
            "event=generation_request module=service status=ok request={} duration_ms={}",
            self.request,
            self.started_at.elapsed().as_millis()
        );
    }

    /// Moves to the matching terminal stage and hands `err` back.
    fn fail(&mut self, err: GenerationServiceError) -> GenerationServiceError {
        let terminal = match self.stage {
            GenerationStage::Validating => GenerationStage::Rejected,
            _ => GenerationStage::Failed,
        };
        self.advance(terminal);
        let kind = err
            .classified()
            .map_or_else(|| "none".to_string(), |classified| classified.kind.to_string());
        warn!(
            "event=generation_request module=service status=error request={} stage={} duration_ms={} error_code={} error_kind={}",
            self.request,
            terminal.as_str(),
            self.started_at.elapsed().as_millis(),
            err.code(),
            kind
        );
        err
    }
}

trait GenerationTask {
    type Processed;
    type Output;
    const OPERATION: OperationType;

    fn build_prompt(title: &str, content: &str) -> String;
    /// Whether the note already carries this artifact.
    fn exists(notes: &dyn NoteRepository, note_id: NoteId) -> RepoResult<bool>;
    fn post_process(raw: &str) -> Result<Self::Processed, GenerationServiceError>;
    fn persist(
        notes: &dyn NoteRepository,
        note_id: NoteId,
        processed: Self::Processed,
        model: &str,
    ) -> RepoResult<Self::Output>;
}

struct SummaryTask;

impl GenerationTask for SummaryTask {
    type Processed = String;
    type Output = Summary;
    const OPERATION: OperationType = OperationType::Summary;

    fn build_prompt(title: &str, content: &str) -> String {
        summary_prompt(title, content)
    }

    fn exists(notes: &dyn NoteRepository, note_id: NoteId) -> RepoResult<bool> {
        Ok(notes.get_summary(note_id)?.is_some())
    }

    fn post_process(raw: &str) -> Result<String, GenerationServiceError> {
        Ok(clean_summary(raw).to_string())
    }

    fn persist(
        notes: &dyn NoteRepository,
        note_id: NoteId,
        processed: String,
        model: &str,
    ) -> RepoResult<Summary> {
        notes.upsert_summary(note_id, &processed, model)
    }
}

struct TagsTask;

impl GenerationTask for TagsTask {
    type Processed = Vec<String>;
    type Output = NoteTags;
    const OPERATION: OperationType = OperationType::Tags;

    fn build_prompt(_title: &str, content: &str) -> String {
        tags_prompt(content)
    }

    fn exists(notes: &dyn NoteRepository, note_id: NoteId) -> RepoResult<bool> {
        Ok(!notes.list_note_tags(note_id)?.is_empty())
    }

    fn post_process(raw: &str) -> Result<Vec<String>, GenerationServiceError> {
        let tags = parse_tags(raw);
        if tags.is_empty() {
            return Err(GenerationServiceError::Generation(classify(
                &FailureSignal::new(None, "tag response empty after post-processing"),
            )));
        }
        Ok(tags)
    }

    fn persist(
        notes: &dyn NoteRepository,
        note_id: NoteId,
        processed: Vec<String>,
        _model: &str,
    ) -> RepoResult<NoteTags> {
        let tags = notes.replace_tags(note_id, &processed)?;
        Ok(NoteTags { note_id, tags })
    }
}

/// Generation orchestration over injected collaborators.
pub struct GenerationService {
    notes: Arc<dyn NoteRepository>,
    identity: Arc<dyn IdentityProvider>,
    client: GenerationClient,
    limiter: RegenerationLimiter,
    usage: UsageTracker,
    settings: GenerationSettings,
}

impl GenerationService {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        identity: Arc<dyn IdentityProvider>,
        client: GenerationClient,
        limiter: RegenerationLimiter,
        usage: UsageTracker,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            notes,
            identity,
            client,
            limiter,
            usage,
            settings,
        }
    }

    /// Wires SQLite repositories on one shared connection.
    pub fn with_sqlite(
        conn: SharedConnection,
        identity: Arc<dyn IdentityProvider>,
        backend: Arc<dyn GenerationBackend>,
        settings: GenerationSettings,
    ) -> Self {
        Self::new(
            Arc::new(SqliteNoteRepository::new(conn.clone())),
            identity,
            GenerationClient::new(backend),
            RegenerationLimiter::new(Arc::new(SqliteRegenerationRepository::new(conn.clone()))),
            UsageTracker::new(Arc::new(SqliteUsageRepository::new(conn))),
            settings,
        )
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Summary generation. Overwriting an existing summary is quota-gated
    /// like [`Self::regenerate_summary`].
    pub async fn generate_summary(&self, note_id: &str) -> Result<Summary, GenerationServiceError> {
        self.run_for_note::<SummaryTask>(note_id, false)
            .await
            .map(|(summary, _)| summary)
    }

    /// Quota-gated summary regeneration.
    pub async fn regenerate_summary(
        &self,
        note_id: &str,
    ) -> Result<Regenerated<Summary>, GenerationServiceError> {
        self.run_regeneration::<SummaryTask>(note_id).await
    }

    /// Tag generation. Replacing an existing tag set is quota-gated like
    /// [`Self::regenerate_tags`].
    pub async fn generate_tags(&self, note_id: &str) -> Result<NoteTags, GenerationServiceError> {
        self.run_for_note::<TagsTask>(note_id, false)
            .await
            .map(|(tags, _)| tags)
    }

    /// Quota-gated tag regeneration.
    pub async fn regenerate_tags(
        &self,
        note_id: &str,
    ) -> Result<Regenerated<NoteTags>, GenerationServiceError> {
        self.run_regeneration::<TagsTask>(note_id).await
    }

    /// Suggests tags for unsaved content. Nothing is persisted or counted.
    pub async fn preview_tags(&self, content: &str) -> Result<Vec<String>, GenerationServiceError> {
        let mut trace = RequestTrace::start("preview_tags");
        let content = self
            .validate_content(content)
            .map_err(|err| trace.fail(err))?;
        let prompt = TagsTask::build_prompt("", truncate_content(content, self.settings.max_input_chars));

        trace.advance(GenerationStage::Invoking);
        let raw = self
            .invoke(&prompt)
            .await
            .map_err(|err| trace.fail(err))?;

        trace.advance(GenerationStage::PostProcessing);
        let tags = TagsTask::post_process(&raw).map_err(|err| trace.fail(err))?;
        trace.succeed();
        Ok(tags)
    }

    /// Today's quota state for the acting user.
    pub fn regeneration_status(
        &self,
        operation: OperationType,
    ) -> Result<RateLimitStatus, GenerationServiceError> {
        let user_id = self.current_user()?;
        self.limiter
            .check_limit(user_id, operation)
            .map_err(GenerationServiceError::Storage)
    }

    async fn run_regeneration<T: GenerationTask>(
        &self,
        note_id: &str,
    ) -> Result<Regenerated<T::Output>, GenerationServiceError> {
        let (result, quota) = self.run_for_note::<T>(note_id, true).await?;
        let quota = quota.ok_or_else(|| {
            GenerationServiceError::Storage(RepoError::InvalidData(
                "regeneration finished without a quota decision".to_string(),
            ))
        })?;
        Ok(Regenerated { result, quota })
    }

    async fn run_for_note<T: GenerationTask>(
        &self,
        raw_note_id: &str,
        regenerate: bool,
    ) -> Result<(T::Output, Option<RateLimitStatus>), GenerationServiceError> {
        let mut trace = RequestTrace::start(request_name(T::OPERATION, regenerate));

        let (user_id, note) = self
            .load_owned_note(raw_note_id)
            .map_err(|err| trace.fail(err))?;
        let content = self
            .validate_content(&note.body)
            .map_err(|err| trace.fail(err))?;
        let prompt = T::build_prompt(
            &note.title,
            truncate_content(content, self.settings.max_input_chars),
        );

        let regenerate = regenerate
            || T::exists(self.notes.as_ref(), note.id)
                .map_err(|err| trace.fail(GenerationServiceError::Storage(err)))?;

        let quota = if regenerate {
            let status = self
                .limiter
                .check_and_record(user_id, note.id, T::OPERATION)
                .map_err(|err| trace.fail(GenerationServiceError::Storage(err)))?;
            if !status.allowed {
                return Err(trace.fail(GenerationServiceError::RateLimited(status)));
            }
            Some(status)
        } else {
            None
        };

        trace.advance(GenerationStage::Invoking);
        let raw = self
            .invoke(&prompt)
            .await
            .map_err(|err| trace.fail(err))?;

        trace.advance(GenerationStage::PostProcessing);
        let processed = T::post_process(&raw).map_err(|err| trace.fail(err))?;

        trace.advance(GenerationStage::Persisting);
        let model = self.settings.model.model.as_str();
        let output = T::persist(self.notes.as_ref(), note.id, processed, model)
            .map_err(|err| trace.fail(GenerationServiceError::SaveFailed(err)))?;

        self.record_usage(
            user_id,
            note.id,
            UsageOperation::for_request(T::OPERATION, regenerate),
            &prompt,
            &raw,
        );
        trace.succeed();
        Ok((output, quota))
    }

    fn current_user(&self) -> Result<UserId, GenerationServiceError> {
        self.identity
            .current_user()
            .ok_or(GenerationServiceError::Unauthenticated)
    }

    fn load_owned_note(&self, raw_note_id: &str) -> Result<(UserId, Note), GenerationServiceError> {
        let user_id = self.current_user()?;
        let note_id = Uuid::parse_str(raw_note_id.trim())
            .map_err(|_| GenerationServiceError::InvalidNoteId(raw_note_id.to_string()))?;
        let note = self
            .notes
            .get_note_for_owner(note_id, user_id)
            .map_err(GenerationServiceError::Storage)?
            .ok_or(GenerationServiceError::NoteNotFound)?;
        Ok((user_id, note))
    }

    fn validate_content<'a>(&self, content: &'a str) -> Result<&'a str, GenerationServiceError> {
        let trimmed = content.trim();
        let actual_chars = trimmed.chars().count();
        if actual_chars < self.settings.min_content_chars {
            return Err(GenerationServiceError::ContentTooShort {
                min_chars: self.settings.min_content_chars,
                actual_chars,
            });
        }
        Ok(trimmed)
    }

    async fn invoke(&self, prompt: &str) -> Result<String, GenerationServiceError> {
        self.client
            .invoke(prompt, &self.settings.model)
            .await
            .map_err(|err| GenerationServiceError::Generation(classify_generation_error(&err)))
    }

    fn record_usage(
        &self,
        user_id: UserId,
        note_id: NoteId,
        operation: UsageOperation,
        prompt: &str,
        raw_output: &str,
    ) {
        let model = self.settings.model.model.clone();
        let estimate = UsageEstimate::from_texts(prompt, raw_output, &model);
        self.usage.record_in_background(UsageRecord {
            user_id,
            note_id: Some(note_id),
            operation,
            input_tokens: estimate.input_tokens,
            output_tokens: estimate.output_tokens,
            total_tokens: estimate.total_tokens,
            cost_estimate: estimate.cost_estimate,
            model,
            created_at: chrono::Utc::now().timestamp_millis(),
        });
    }
}

fn request_name(operation: OperationType, regenerate: bool) -> &'static str {
    match (operation, regenerate) {
        (OperationType::Summary, false) => "generate_summary",
        (OperationType::Summary, true) => "regenerate_summary",
        (OperationType::Tags, false) => "generate_tags",
        (OperationType::Tags, true) => "regenerate_tags",
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerationOutcome, GenerationServiceError, GenerationStage};
    use crate::ai::classifier::{classify, FailureSignal};

    #[test]
    fn stages_only_move_forward() {
        use GenerationStage::*;
        assert!(Idle.can_advance_to(Validating));
        assert!(Validating.can_advance_to(Rejected));
        assert!(Invoking.can_advance_to(PostProcessing));
        assert!(Persisting.can_advance_to(Succeeded));
        assert!(!Validating.can_advance_to(Persisting));
        assert!(!Failed.can_advance_to(Invoking));
        assert!(!Succeeded.can_advance_to(Validating));
        for terminal in [Rejected, Failed, Succeeded] {
            assert!(terminal.is_terminal());
        }
    }

    #[test]
    fn outcome_carries_classified_view_only_for_generation_failures() {
        let failed: GenerationOutcome<()> = Err(GenerationServiceError::Generation(classify(
            &FailureSignal::new(Some(429), "Too Many Requests"),
        )))
        .into();
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["classifiedError"]["kind"], "QuotaExceeded");
        assert_eq!(json["classifiedError"]["action"], "wait");

        let rejected: GenerationOutcome<()> = Err(GenerationServiceError::NoteNotFound).into();
        assert!(rejected.classified_error.is_none());
        assert_eq!(rejected.error.as_deref(), Some("note not found"));

        let ok: GenerationOutcome<u8> = Ok(7).into();
        assert!(ok.success);
        assert_eq!(ok.payload, Some(7));
    }
}
