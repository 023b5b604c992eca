//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from generation orchestration.
//!
//! # Invariants
//! - Repository traits are `Send + Sync` so services can share them as
//!   `Arc<dyn ...>` across async tasks.
//! - Repository APIs return semantic errors (`NotFound`, `Tag`) in addition
//!   to DB transport errors.

pub mod note_repo;
pub mod regeneration_repo;
pub mod usage_repo;
