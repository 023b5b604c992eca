//! Domain model for notes and AI-derived artifacts.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep storage spelling of enum values in one place.
//!
//! # Invariants
//! - Every note is identified by a stable `NoteId` and owned by one `UserId`.
//! - Regeneration and usage records are immutable once written.

pub mod generation;
pub mod note;
