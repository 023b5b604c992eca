//! AI generation building blocks.
//!
//! # Responsibility
//! - Call the remote text-completion service under a fixed timeout.
//! - Classify failures, estimate usage and gate regenerations.
//! - Build prompts and post-process model output.
//!
//! # Invariants
//! - Components here never read or write notes directly; orchestration
//!   lives in `service::generation_service`.

pub mod classifier;
pub mod client;
pub mod http;
pub mod mock;
pub mod output;
pub mod prompt;
pub mod rate_limit;
pub mod usage;
