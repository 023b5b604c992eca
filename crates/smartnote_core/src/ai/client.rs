//! Generation client: prompt validation plus a bounded remote call.
//!
//! # Responsibility
//! - Reject blank or oversized prompts before any remote work starts.
//! - Run the backend call as a spawned task raced against a fixed timer.
//! - Treat an empty response as a failure.
//!
//! # Invariants
//! - The timeout is `GENERATION_TIMEOUT` for every call.
//! - When the timer wins, the backend task is aborted and awaited before
//!   `invoke` returns, so no call outlives its request.

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fixed upper bound for one remote generation call.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum prompt size in characters, measured after trimming.
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// Model selection and sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            max_output_tokens: 1024,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
        }
    }
}

/// One request handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub config: ModelConfig,
}

/// Failure reported by a backend, with the remote status code when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub status_code: Option<u16>,
    pub message: String,
}

impl BackendFailure {
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}

impl Display for BackendFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "status {code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for BackendFailure {}

/// Remote text-completion service.
///
/// `Ok(None)` means the call succeeded but carried no text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>, BackendFailure>;
}

/// Failure of one `invoke` call.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    InvalidPrompt(String),
    Timeout(Duration),
    EmptyResponse,
    Backend(BackendFailure),
    /// The backend task panicked or was cancelled outside the timeout path.
    TaskFailed(String),
}

impl GenerationError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Backend(failure) => failure.status_code,
            _ => None,
        }
    }
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPrompt(reason) => write!(f, "invalid prompt: {reason}"),
            Self::Timeout(limit) => {
                write!(f, "generation timed out after {}s", limit.as_secs())
            }
            Self::EmptyResponse => write!(f, "generation response empty"),
            Self::Backend(failure) => write!(f, "{failure}"),
            Self::TaskFailed(details) => write!(f, "generation task failed: {details}"),
        }
    }
}

impl Error for GenerationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Backend(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<BackendFailure> for GenerationError {
    fn from(value: BackendFailure) -> Self {
        Self::Backend(value)
    }
}

/// Checks prompt bounds and returns the trimmed prompt.
pub fn validate_prompt(prompt: &str) -> Result<&str, GenerationError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::InvalidPrompt(format!(
            "prompt is empty (allowed 1..={MAX_PROMPT_CHARS} characters)"
        )));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(GenerationError::InvalidPrompt(format!(
            "prompt too long ({chars} characters, maximum {MAX_PROMPT_CHARS})"
        )));
    }
    Ok(trimmed)
}

/// Injected client wrapping one backend.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Validates `prompt`, then runs the backend call under `GENERATION_TIMEOUT`.
    pub async fn invoke(&self, prompt: &str, config: &ModelConfig) -> Result<String, GenerationError> {
        let prompt = validate_prompt(prompt)?;
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            config: config.clone(),
        };

        let started_at = Instant::now();
        let backend = Arc::clone(&self.backend);
        let mut task = tokio::spawn(async move { backend.generate(&request).await });

        let joined = match tokio::time::timeout(GENERATION_TIMEOUT, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                // An aborted task resolves promptly; a late success is discarded.
                let _ = task.await;
                warn!(
                    "event=ai_invoke module=ai status=error model={} duration_ms={} error_code=timeout",
                    config.model,
                    started_at.elapsed().as_millis()
                );
                return Err(GenerationError::Timeout(GENERATION_TIMEOUT));
            }
        };

        let text = joined
            .map_err(|err| GenerationError::TaskFailed(err.to_string()))??
            .filter(|text| !text.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)?;

        debug!(
            "event=ai_invoke module=ai status=ok model={} duration_ms={} output_chars={}",
            config.model,
            started_at.elapsed().as_millis(),
            text.chars().count()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_prompt, GenerationError, MAX_PROMPT_CHARS};

    #[test]
    fn blank_prompt_is_rejected() {
        let err = validate_prompt(" \n\t ").unwrap_err();
        assert!(matches!(err, GenerationError::InvalidPrompt(_)));
    }

    #[test]
    fn prompt_limit_is_measured_after_trim() {
        let at_limit = format!("  {}  ", "a".repeat(MAX_PROMPT_CHARS));
        assert_eq!(validate_prompt(&at_limit).unwrap().len(), MAX_PROMPT_CHARS);

        let over = "a".repeat(MAX_PROMPT_CHARS + 1);
        let err = validate_prompt(&over).unwrap_err();
        assert!(err.to_string().contains("10000"));
    }
}
