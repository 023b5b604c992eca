//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository, limiter and model calls into use-case APIs.
//! - Keep CLI and other callers decoupled from storage and transport details.

pub mod generation_service;
pub mod identity;
pub mod note_service;
