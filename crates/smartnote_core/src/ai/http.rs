//! HTTP generation backend for `generateContent`-style endpoints.
//!
//! Configuration via environment variables:
//! - `SMARTNOTE_API_KEY` (required at call time)
//! - `SMARTNOTE_API_URL` (default: `https://generativelanguage.googleapis.com/v1beta`)

use crate::ai::client::{BackendFailure, GenerationBackend, GenerationRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Endpoint and credential for [`HttpGenerationBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl HttpBackendConfig {
    /// Reads `SMARTNOTE_API_URL` and `SMARTNOTE_API_KEY`. Blank values count as unset.
    pub fn from_env() -> Self {
        let base_url = std::env::var("SMARTNOTE_API_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_key = std::env::var("SMARTNOTE_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty());
        Self { base_url, api_key }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: RequestGenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    status: Option<String>,
}

/// `reqwest`-based backend. Cheap to clone.
#[derive(Clone)]
pub struct HttpGenerationBackend {
    client: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpGenerationBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendFailure> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| BackendFailure::new(None, format!("network client setup failed: {err}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:generateContent",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>, BackendFailure> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            BackendFailure::new(None, "API key is not configured (set SMARTNOTE_API_KEY)")
        })?;

        let body = ContentRequest {
            contents: [RequestContent {
                parts: [RequestPart {
                    text: request.prompt.as_str(),
                }],
            }],
            generation_config: RequestGenerationConfig {
                max_output_tokens: request.config.max_output_tokens,
                temperature: request.config.temperature,
                top_p: request.config.top_p,
                top_k: request.config.top_k,
            },
        };

        let response = self
            .client
            .post(self.endpoint(&request.config.model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(ErrorResponse {
                    error: Some(detail),
                }) => match detail.status {
                    Some(code) => format!("{code}: {}", detail.message),
                    None => detail.message,
                },
                _ if text.trim().is_empty() => status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
                _ => text,
            };
            return Err(BackendFailure::new(Some(status.as_u16()), message));
        }

        let parsed: ContentResponse = response.json().await.map_err(|err| {
            BackendFailure::new(None, format!("unreadable response body: {err}"))
        })?;
        Ok(first_candidate_text(parsed))
    }
}

fn first_candidate_text(response: ContentResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();
    (!text.is_empty()).then_some(text)
}

fn transport_failure(err: reqwest::Error) -> BackendFailure {
    let status = err.status().map(|status| status.as_u16());
    let message = if err.is_timeout() {
        format!("request timeout: {err}")
    } else if err.is_connect() {
        format!("network connection failed: {err}")
    } else {
        format!("network request failed: {err}")
    };
    BackendFailure::new(status, message)
}

#[cfg(test)]
mod tests {
    use super::{first_candidate_text, ContentResponse, HttpBackendConfig, HttpGenerationBackend};
    use crate::ai::classifier::{classify, ErrorKind, FailureSignal};
    use crate::ai::client::{GenerationBackend, GenerationRequest, ModelConfig};

    #[test]
    fn candidate_parts_are_concatenated() {
        let response: ContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"a, "},{"text":"b"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(first_candidate_text(response).as_deref(), Some("a, b"));
    }

    #[test]
    fn missing_candidates_yield_no_text() {
        let response: ContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(first_candidate_text(response).is_none());

        let blocked: ContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(first_candidate_text(blocked).is_none());
    }

    #[test]
    fn endpoint_joins_base_url_and_model() {
        let backend = HttpGenerationBackend::new(HttpBackendConfig {
            base_url: "http://localhost:8080/v1beta/".to_string(),
            api_key: None,
        })
        .unwrap();
        assert_eq!(
            backend.endpoint("gemini-2.0-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_api_key_is_a_credential_failure() {
        let backend = HttpGenerationBackend::new(HttpBackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
        })
        .unwrap();
        let request = GenerationRequest {
            prompt: "hello".to_string(),
            config: ModelConfig::default(),
        };

        let failure = backend.generate(&request).await.unwrap_err();
        let classified = classify(&FailureSignal::new(failure.status_code, failure.message));
        assert_eq!(classified.kind, ErrorKind::CredentialMissing);
    }
}
