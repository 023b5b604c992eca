//! Note, summary and tag repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide owner-scoped note lookup for generation orchestration.
//! - Own summary upsert and tag wholesale-replace persistence.
//!
//! # Invariants
//! - Note reads used by generation are always scoped to `(id, owner)`.
//! - `upsert_summary` keeps at most one row per note.
//! - `replace_tags` deletes and inserts the whole set in one IMMEDIATE
//!   transaction, so concurrent replaces of one note never interleave.
//! - Stored tag sets never exceed `MAX_TAGS_PER_NOTE`.

use crate::db::{DbError, SharedConnection};
use crate::model::generation::Summary;
use crate::model::note::{
    validate_tag, Note, NoteId, TagValidationError, UserId, MAX_TAGS_PER_NOTE,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by every SQLite repository in this crate.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(NoteId),
    InvalidData(String),
    Tag(TagValidationError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Tag(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Tag(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<TagValidationError> for RepoError {
    fn from(value: TagValidationError) -> Self {
        Self::Tag(value)
    }
}

/// Repository interface for notes and their AI-derived artifacts.
pub trait NoteRepository: Send + Sync {
    /// Inserts one note and returns its id.
    fn create_note(&self, note: &Note) -> RepoResult<NoteId>;
    /// Gets one note only when `owner_id` owns it.
    fn get_note_for_owner(&self, note_id: NoteId, owner_id: UserId) -> RepoResult<Option<Note>>;
    fn get_summary(&self, note_id: NoteId) -> RepoResult<Option<Summary>>;
    /// Inserts or overwrites the summary of one note and returns the stored row.
    fn upsert_summary(&self, note_id: NoteId, content: &str, model: &str) -> RepoResult<Summary>;
    /// Returns tags in stored order.
    fn list_note_tags(&self, note_id: NoteId) -> RepoResult<Vec<String>>;
    /// Replaces the full tag set for one note in one transaction and returns
    /// the stored set as read inside that transaction.
    fn replace_tags(&self, note_id: NoteId, tags: &[String]) -> RepoResult<Vec<String>>;
    /// Appends one tag. Existing tags (case-insensitive) are left untouched.
    fn add_tag(&self, note_id: NoteId, tag: &str) -> RepoResult<Vec<String>>;
    /// Removes one tag; returns `false` when it was not present.
    fn remove_tag(&self, note_id: NoteId, tag: &str) -> RepoResult<bool>;
}

/// SQLite-backed note repository.
#[derive(Clone)]
pub struct SqliteNoteRepository {
    conn: SharedConnection,
}

impl SqliteNoteRepository {
    /// Constructs a repository from a migrated shared connection.
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

impl NoteRepository for SqliteNoteRepository {
    fn create_note(&self, note: &Note) -> RepoResult<NoteId> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO notes (id, owner_id, title, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                note.id.to_string(),
                note.owner_id.to_string(),
                note.title.as_str(),
                note.body.as_str(),
                note.created_at,
                note.updated_at,
            ],
        )?;
        Ok(note.id)
    }

    fn get_note_for_owner(&self, note_id: NoteId, owner_id: UserId) -> RepoResult<Option<Note>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, body, created_at, updated_at
             FROM notes
             WHERE id = ?1
               AND owner_id = ?2;",
        )?;
        let mut rows = stmt.query(params![note_id.to_string(), owner_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_note_row(row)?)),
            None => Ok(None),
        }
    }

    fn get_summary(&self, note_id: NoteId) -> RepoResult<Option<Summary>> {
        let conn = self.conn.lock()?;
        load_summary(&conn, note_id)
    }

    fn upsert_summary(&self, note_id: NoteId, content: &str, model: &str) -> RepoResult<Summary> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO summaries (note_id, content, model, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(note_id) DO UPDATE SET
                content = excluded.content,
                model = excluded.model,
                updated_at = excluded.updated_at;",
            params![note_id.to_string(), content, model, now],
        )?;
        load_summary(&conn, note_id)?.ok_or(RepoError::NotFound(note_id))
    }

    fn list_note_tags(&self, note_id: NoteId) -> RepoResult<Vec<String>> {
        let conn = self.conn.lock()?;
        load_tags_for_note(&conn, note_id)
    }

    fn replace_tags(&self, note_id: NoteId, tags: &[String]) -> RepoResult<Vec<String>> {
        if tags.len() > MAX_TAGS_PER_NOTE {
            return Err(TagValidationError::TooMany {
                limit: MAX_TAGS_PER_NOTE,
            }
            .into());
        }
        let tags = tags
            .iter()
            .map(|tag| validate_tag(tag))
            .collect::<Result<Vec<_>, _>>()?;

        let note_id_text = note_id.to_string();
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !note_exists(&tx, note_id_text.as_str())? {
            return Err(RepoError::NotFound(note_id));
        }

        tx.execute(
            "DELETE FROM note_tags WHERE note_id = ?1;",
            [note_id_text.as_str()],
        )?;
        for (position, tag) in tags.iter().enumerate() {
            tx.execute(
                "INSERT INTO note_tags (note_id, position, name) VALUES (?1, ?2, ?3);",
                params![note_id_text.as_str(), position as i64, tag.as_str()],
            )?;
        }
        touch_note(&tx, note_id_text.as_str())?;
        let stored = load_tags_for_note(&tx, note_id)?;

        tx.commit()?;
        Ok(stored)
    }

    fn add_tag(&self, note_id: NoteId, tag: &str) -> RepoResult<Vec<String>> {
        let tag = validate_tag(tag)?;
        let note_id_text = note_id.to_string();
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !note_exists(&tx, note_id_text.as_str())? {
            return Err(RepoError::NotFound(note_id));
        }

        let existing = load_tags_for_note(&tx, note_id)?;
        if existing
            .iter()
            .any(|current| current.to_lowercase() == tag.to_lowercase())
        {
            return Ok(existing);
        }
        if existing.len() >= MAX_TAGS_PER_NOTE {
            return Err(TagValidationError::TooMany {
                limit: MAX_TAGS_PER_NOTE,
            }
            .into());
        }

        tx.execute(
            "INSERT INTO note_tags (note_id, position, name)
             SELECT ?1, COALESCE(MAX(position) + 1, 0), ?2
             FROM note_tags
             WHERE note_id = ?1;",
            params![note_id_text.as_str(), tag.as_str()],
        )?;
        touch_note(&tx, note_id_text.as_str())?;
        let tags = load_tags_for_note(&tx, note_id)?;
        tx.commit()?;
        Ok(tags)
    }

    fn remove_tag(&self, note_id: NoteId, tag: &str) -> RepoResult<bool> {
        let conn = self.conn.lock()?;
        let removed = conn.execute(
            "DELETE FROM note_tags WHERE note_id = ?1 AND name = ?2 COLLATE NOCASE;",
            params![note_id.to_string(), tag.trim()],
        )?;
        if removed > 0 {
            touch_note(&conn, note_id.to_string().as_str())?;
        }
        Ok(removed > 0)
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    let id: String = row.get("id")?;
    let owner_id: String = row.get("owner_id")?;
    Ok(Note {
        id: parse_uuid(&id, "notes.id")?,
        owner_id: parse_uuid(&owner_id, "notes.owner_id")?,
        title: row.get("title")?,
        body: row.get("body")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn load_summary(conn: &Connection, note_id: NoteId) -> RepoResult<Option<Summary>> {
    let summary = conn
        .query_row(
            "SELECT content, model, created_at, updated_at
             FROM summaries
             WHERE note_id = ?1;",
            [note_id.to_string()],
            |row| {
                Ok(Summary {
                    note_id,
                    content: row.get("content")?,
                    model: row.get("model")?,
                    created_at: row.get("created_at")?,
                    updated_at: row.get("updated_at")?,
                })
            },
        )
        .optional()?;
    Ok(summary)
}

fn load_tags_for_note(conn: &Connection, note_id: NoteId) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name
         FROM note_tags
         WHERE note_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([note_id.to_string()])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(row.get(0)?);
    }
    Ok(tags)
}

fn note_exists(conn: &Connection, note_id: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?1);",
        [note_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn touch_note(conn: &Connection, note_id: &str) -> RepoResult<()> {
    conn.execute(
        "UPDATE notes
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?1;",
        [note_id],
    )?;
    Ok(())
}
