//! Note use-case service.
//!
//! # Responsibility
//! - Create notes for the acting user and read them back owner-scoped.
//! - Expose the stored summary and manual tag edits.
//!
//! # Invariants
//! - Every read and write is scoped to notes the acting user owns.
//! - Manual tag edits obey the same count and length limits as generated tags.

use crate::model::generation::Summary;
use crate::model::note::{Note, NoteId, TagValidationError, UserId};
use crate::repo::note_repo::{NoteRepository, RepoError};
use crate::service::identity::IdentityProvider;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Service error for note use-cases.
#[derive(Debug)]
pub enum NoteServiceError {
    Unauthenticated,
    /// Note is missing or owned by someone else.
    NoteNotFound(NoteId),
    InvalidTag(TagValidationError),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "authentication required"),
            Self::NoteNotFound(note_id) => write!(f, "note not found: {note_id}"),
            Self::InvalidTag(err) => write!(f, "invalid tag: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent note state: {details}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTag(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(note_id) => Self::NoteNotFound(note_id),
            RepoError::Tag(err) => Self::InvalidTag(err),
            other => Self::Repo(other),
        }
    }
}

/// Note service facade over a repository and the request identity.
pub struct NoteService {
    repo: Arc<dyn NoteRepository>,
    identity: Arc<dyn IdentityProvider>,
}

impl NoteService {
    pub fn new(repo: Arc<dyn NoteRepository>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { repo, identity }
    }

    /// Creates one note owned by the acting user.
    pub fn create_note(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Note, NoteServiceError> {
        let owner_id = self.current_user()?;
        let note = Note::new(owner_id, title, body);
        let note_id = self.repo.create_note(&note)?;
        info!("event=note_create module=service status=ok note_id={note_id}");
        self.repo
            .get_note_for_owner(note_id, owner_id)?
            .ok_or(NoteServiceError::InconsistentState(
                "created note not found in read-back",
            ))
    }

    pub fn get_note(&self, note_id: NoteId) -> Result<Note, NoteServiceError> {
        let owner_id = self.current_user()?;
        self.owned_note(note_id, owner_id)
    }

    pub fn get_summary(&self, note_id: NoteId) -> Result<Option<Summary>, NoteServiceError> {
        self.get_note(note_id)?;
        Ok(self.repo.get_summary(note_id)?)
    }

    /// Tags in stored order.
    pub fn list_tags(&self, note_id: NoteId) -> Result<Vec<String>, NoteServiceError> {
        self.get_note(note_id)?;
        Ok(self.repo.list_note_tags(note_id)?)
    }

    /// Appends one tag and returns the resulting set.
    pub fn add_tag(&self, note_id: NoteId, tag: &str) -> Result<Vec<String>, NoteServiceError> {
        self.get_note(note_id)?;
        Ok(self.repo.add_tag(note_id, tag)?)
    }

    /// Removes one tag (case-insensitive) and returns the resulting set.
    pub fn remove_tag(&self, note_id: NoteId, tag: &str) -> Result<Vec<String>, NoteServiceError> {
        self.get_note(note_id)?;
        self.repo.remove_tag(note_id, tag)?;
        Ok(self.repo.list_note_tags(note_id)?)
    }

    fn current_user(&self) -> Result<UserId, NoteServiceError> {
        self.identity
            .current_user()
            .ok_or(NoteServiceError::Unauthenticated)
    }

    fn owned_note(&self, note_id: NoteId, owner_id: UserId) -> Result<Note, NoteServiceError> {
        self.repo
            .get_note_for_owner(note_id, owner_id)?
            .ok_or(NoteServiceError::NoteNotFound(note_id))
    }
}
