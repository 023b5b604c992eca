//! Failure classification for AI generation.
//!
//! # Responsibility
//! - Map any generation failure onto the closed `ErrorKind` taxonomy.
//! - Attach retry and recommended-action metadata for callers.
//!
//! # Invariants
//! - `classify` is total: every input yields exactly one kind.
//! - Rules are evaluated in one fixed order and the first match wins.
//!   Status-code rules and wording rules share the same chain.

use crate::ai::client::GenerationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static EMBEDDED_STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\[|\bstatus(?:\s*code)?\s*[:=]?\s*|\bhttp\s+)([1-5][0-9]{2})\b")
        .expect("valid status regex")
});

/// Closed taxonomy of AI failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    RemoteService,
    Validation,
    Timeout,
    CredentialMissing,
    QuotaExceeded,
    InvalidRequest,
    ServerError,
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 9] = [
        Self::Network,
        Self::RemoteService,
        Self::Validation,
        Self::Timeout,
        Self::CredentialMissing,
        Self::QuotaExceeded,
        Self::InvalidRequest,
        Self::ServerError,
        Self::Unknown,
    ];

    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network
                | Self::RemoteService
                | Self::Timeout
                | Self::QuotaExceeded
                | Self::ServerError
        )
    }

    pub fn action(self) -> RecommendedAction {
        match self {
            Self::Network | Self::RemoteService | Self::Timeout | Self::ServerError => {
                RecommendedAction::Retry
            }
            Self::QuotaExceeded => RecommendedAction::Wait,
            Self::CredentialMissing => RecommendedAction::CheckCredential,
            Self::Validation => RecommendedAction::ShrinkInput,
            Self::InvalidRequest | Self::Unknown => RecommendedAction::ContactSupport,
        }
    }

    /// User-facing message for this kind.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Network => "Could not reach the AI service. Check your connection and try again.",
            Self::RemoteService => "The AI service returned no usable result. Please try again.",
            Self::Validation => "The content is too long for the AI service. Shorten it and try again.",
            Self::Timeout => "The AI service took too long to respond. Please try again.",
            Self::CredentialMissing => "The AI service credential is missing or invalid.",
            Self::QuotaExceeded => "The AI service is rate limited right now. Please wait and try again later.",
            Self::InvalidRequest => "The AI service rejected the request.",
            Self::ServerError => "The AI service had an internal error. Please try again.",
            Self::Unknown => "An unexpected error occurred. Contact support if it keeps happening.",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Recommended next step for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedAction {
    Retry,
    Wait,
    CheckCredential,
    ShrinkInput,
    ContactSupport,
}

impl RecommendedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Wait => "wait",
            Self::CheckCredential => "check-credential",
            Self::ShrinkInput => "shrink-input",
            Self::ContactSupport => "contact-support",
        }
    }
}

/// Finer detail for `InvalidRequest`, kept so 401/403 stay distinguishable
/// from malformed payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "status")]
pub enum RequestRejection {
    BadRequest,
    Unauthorized,
    Forbidden,
    Other(u16),
}

impl RequestRejection {
    fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(401) => Self::Unauthorized,
            Some(403) => Self::Forbidden,
            Some(400) | None => Self::BadRequest,
            Some(other) => Self::Other(other),
        }
    }
}

/// Raw failure facts the rule chain inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSignal {
    pub status_code: Option<u16>,
    pub message: String,
}

impl FailureSignal {
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// Builds a signal from any error value using its display text.
    pub fn from_error(err: &dyn Error) -> Self {
        Self::new(None, err.to_string())
    }

    /// Explicit status code, or one embedded in the message such as
    /// `[429 Too Many Requests]` or `status: 503`.
    fn effective_status(&self) -> Option<u16> {
        self.status_code.or_else(|| {
            EMBEDDED_STATUS_RE
                .captures(&self.message)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
    }
}

impl From<&GenerationError> for FailureSignal {
    fn from(value: &GenerationError) -> Self {
        Self::new(value.status_code(), value.to_string())
    }
}

/// Classification output carried back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// User-facing message.
    pub message: String,
    pub retryable: bool,
    pub action: RecommendedAction,
    /// Technical description of the underlying failure.
    pub cause: String,
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RequestRejection>,
}

impl ClassifiedError {
    /// Compact `{kind, message, action}` shape for result envelopes.
    pub fn view(&self) -> ClassifiedErrorView {
        ClassifiedErrorView {
            kind: self.kind,
            message: self.message.clone(),
            action: self.action,
        }
    }
}

impl Display for ClassifiedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.kind, self.message, self.cause)
    }
}

impl Error for ClassifiedError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedErrorView {
    pub kind: ErrorKind,
    pub message: String,
    pub action: RecommendedAction,
}

struct Inspected<'a> {
    status: Option<u16>,
    lower: &'a str,
}

impl Inspected<'_> {
    fn mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.lower.contains(needle))
    }
}

struct Rule {
    kind: ErrorKind,
    matches: fn(&Inspected<'_>) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        kind: ErrorKind::Timeout,
        matches: |s| s.mentions(&["timeout", "timed out", "deadline exceeded", "deadline_exceeded"]),
    },
    Rule {
        kind: ErrorKind::CredentialMissing,
        matches: |s| {
            s.mentions(&[
                "api key",
                "api_key",
                "apikey",
                "credential",
                "authentication",
            ])
        },
    },
    Rule {
        kind: ErrorKind::QuotaExceeded,
        matches: |s| {
            s.status == Some(429)
                || s.mentions(&[
                    "429",
                    "quota",
                    "rate limit",
                    "rate_limit",
                    "ratelimit",
                    "resource_exhausted",
                    "too many requests",
                ])
        },
    },
    Rule {
        kind: ErrorKind::Validation,
        matches: |s| {
            s.mentions(&[
                "token limit",
                "max tokens",
                "max_tokens",
                "maximum context",
                "context length",
                "too long",
                "token count",
                "maximum number of tokens",
                "exceeds the maximum",
                "length limit",
                "prompt is empty",
            ])
        },
    },
    Rule {
        kind: ErrorKind::InvalidRequest,
        matches: |s| {
            matches!(s.status, Some(400..=499))
                || s.mentions(&[
                    "bad request",
                    "invalid request",
                    "invalid_request",
                    "invalid argument",
                    "invalid_argument",
                ])
        },
    },
    Rule {
        kind: ErrorKind::ServerError,
        matches: |s| {
            matches!(s.status, Some(code) if code >= 500)
                || s.mentions(&[
                    "server error",
                    "internal error",
                    "internal_error",
                    "service unavailable",
                    "overloaded",
                ])
        },
    },
    Rule {
        kind: ErrorKind::RemoteService,
        matches: |s| {
            s.mentions(&[
                "response empty",
                "empty response",
                "no candidates",
                "blocked",
                "safety",
            ])
        },
    },
    Rule {
        kind: ErrorKind::Network,
        matches: |s| {
            s.mentions(&[
                "network",
                "connection",
                "connect",
                "dns",
                "fetch failed",
                "econnreset",
                "econnrefused",
                "socket",
            ])
        },
    },
];

/// Classifies one failure signal. Falls back to `Unknown`.
pub fn classify(signal: &FailureSignal) -> ClassifiedError {
    let status = signal.effective_status();
    let lower = signal.message.to_lowercase();
    let inspected = Inspected {
        status,
        lower: lower.as_str(),
    };

    let kind = RULES
        .iter()
        .find(|rule| (rule.matches)(&inspected))
        .map_or(ErrorKind::Unknown, |rule| rule.kind);

    ClassifiedError {
        kind,
        message: kind.user_message().to_string(),
        retryable: kind.is_retryable(),
        action: kind.action(),
        cause: signal.message.clone(),
        status_code: status,
        rejection: (kind == ErrorKind::InvalidRequest)
            .then(|| RequestRejection::from_status(status)),
    }
}

/// Classifies a failure produced by the generation client.
pub fn classify_generation_error(err: &GenerationError) -> ClassifiedError {
    classify(&FailureSignal::from(err))
}
