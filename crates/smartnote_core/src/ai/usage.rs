//! Token and cost estimation plus best-effort usage recording.
//!
//! # Responsibility
//! - Estimate token counts from text by script class.
//! - Convert token counts to a USD estimate via a per-model price table.
//! - Persist usage records off the request path.
//!
//! # Invariants
//! - `estimate_tokens` is deterministic and O(length).
//! - For a fixed script composition, estimates never decrease as text grows.
//! - A failed usage write is logged and never reaches the caller.

use crate::ai::rate_limit::local_day_start_ms;
use crate::model::generation::UsageRecord;
use crate::model::note::UserId;
use crate::repo::note_repo::RepoResult;
use crate::repo::usage_repo::{UsageRepository, UsageTotals};
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::task::TaskTracker;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// USD price per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const DEFAULT_PRICE: ModelPrice = ModelPrice {
    input_per_million: 0.10,
    output_per_million: 0.40,
};

const PRICE_TABLE: &[(&str, ModelPrice)] = &[
    ("gemini-2.0-flash", DEFAULT_PRICE),
    (
        "gemini-2.0-flash-lite",
        ModelPrice {
            input_per_million: 0.075,
            output_per_million: 0.30,
        },
    ),
    (
        "gemini-1.5-flash",
        ModelPrice {
            input_per_million: 0.075,
            output_per_million: 0.30,
        },
    ),
    (
        "gemini-1.5-pro",
        ModelPrice {
            input_per_million: 1.25,
            output_per_million: 5.00,
        },
    ),
    (
        "gemini-2.5-pro",
        ModelPrice {
            input_per_million: 1.25,
            output_per_million: 10.00,
        },
    ),
];

/// Price entry for `model`, or the default tier for unknown models.
pub fn price_for(model: &str) -> ModelPrice {
    PRICE_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map_or(DEFAULT_PRICE, |(_, price)| *price)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Dense,
    Latin,
    Other,
}

fn script_of(ch: char) -> Script {
    match ch {
        '\u{1100}'..='\u{11FF}'
        | '\u{3000}'..='\u{30FF}'
        | '\u{3130}'..='\u{318F}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FFEF}' => Script::Dense,
        _ if ch.is_ascii() => Script::Latin,
        '\u{00C0}'..='\u{024F}' => Script::Latin,
        _ => Script::Other,
    }
}

/// Estimates the token count of `text`.
///
/// Dense scripts count ~1 token per 1.5 chars, Latin ~1 per 4, others ~1
/// per 3; each class is rounded up separately.
pub fn estimate_tokens(text: &str) -> u32 {
    let (mut dense, mut latin, mut other) = (0u64, 0u64, 0u64);
    for ch in text.chars() {
        match script_of(ch) {
            Script::Dense => dense += 1,
            Script::Latin => latin += 1,
            Script::Other => other += 1,
        }
    }
    let tokens = (dense * 2).div_ceil(3) + latin.div_ceil(4) + other.div_ceil(3);
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

/// Estimated USD cost for one call.
pub fn estimate_cost(input_tokens: u32, output_tokens: u32, model: &str) -> f64 {
    let price = price_for(model);
    (f64::from(input_tokens) * price.input_per_million
        + f64::from(output_tokens) * price.output_per_million)
        / TOKENS_PER_MILLION
}

/// Token and cost estimate for one prompt/response pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEstimate {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub cost_estimate: f64,
}

impl UsageEstimate {
    pub fn from_texts(prompt: &str, output: &str, model: &str) -> Self {
        let input_tokens = estimate_tokens(prompt);
        let output_tokens = estimate_tokens(output);
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            cost_estimate: estimate_cost(input_tokens, output_tokens, model),
        }
    }
}

/// Fire-and-forget usage writer.
#[derive(Clone)]
pub struct UsageTracker {
    repo: Arc<dyn UsageRepository>,
    tasks: TaskTracker,
}

impl UsageTracker {
    pub fn new(repo: Arc<dyn UsageRepository>) -> Self {
        Self {
            repo,
            tasks: TaskTracker::new(),
        }
    }

    /// Schedules `record` for insertion on the blocking pool and returns at once.
    ///
    /// Must be called from within a tokio runtime.
    pub fn record_in_background(&self, record: UsageRecord) {
        let repo = Arc::clone(&self.repo);
        self.tasks.spawn_blocking(move || match repo.insert_usage(&record) {
            Ok(()) => debug!(
                "event=usage_record module=ai status=ok operation={} total_tokens={}",
                record.operation.as_str(),
                record.total_tokens
            ),
            Err(err) => warn!(
                "event=usage_record module=ai status=error operation={} error_code=usage_write_failed error={err}",
                record.operation.as_str()
            ),
        });
    }

    /// Waits until no scheduled write is in flight.
    ///
    /// The tracker is closed once and never reopened. A closed `TaskTracker`
    /// still accepts spawns, so concurrent callers all return as soon as the
    /// queue drains and later records are picked up by later flushes.
    pub async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    pub fn recent(&self, user_id: UserId, limit: u32) -> RepoResult<Vec<UsageRecord>> {
        self.repo.list_usage(user_id, limit)
    }

    /// Usage rollup since local midnight.
    pub fn today_totals(&self, user_id: UserId) -> RepoResult<UsageTotals> {
        self.repo.totals_since(user_id, local_day_start_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::{estimate_cost, estimate_tokens, price_for, UsageEstimate, DEFAULT_PRICE};

    #[test]
    fn latin_text_is_about_four_chars_per_token() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn dense_scripts_cost_more_tokens_than_latin() {
        assert_eq!(estimate_tokens("가나다"), 2);
        assert_eq!(estimate_tokens("漢字"), 2);
        assert!(estimate_tokens("가나다라마바") > estimate_tokens("abcdef"));
    }

    #[test]
    fn classes_are_rounded_separately() {
        // one Latin char (1) + one Hangul char (1) + one Cyrillic char (1)
        assert_eq!(estimate_tokens("a가ж"), 3);
    }

    #[test]
    fn estimate_is_monotonic_for_fixed_composition() {
        let unit = "노트 note ";
        let mut previous = 0;
        for repeat in 0..200 {
            let text = unit.repeat(repeat);
            let tokens = estimate_tokens(&text);
            assert!(tokens >= previous, "estimate decreased at repeat {repeat}");
            previous = tokens;
        }
        for len in 0..200 {
            let text = "x".repeat(len);
            let longer = "x".repeat(len + 1);
            assert!(estimate_tokens(&longer) >= estimate_tokens(&text));
        }
    }

    #[test]
    fn unknown_model_uses_default_tier() {
        assert_eq!(price_for("some-future-model"), DEFAULT_PRICE);
        assert_eq!(
            estimate_cost(1_000_000, 0, "some-future-model"),
            DEFAULT_PRICE.input_per_million
        );
    }

    #[test]
    fn cost_is_linear_in_both_token_counts() {
        let cost = estimate_cost(2_000, 1_000, "gemini-1.5-pro");
        let expected = (2_000.0 * 1.25 + 1_000.0 * 5.0) / 1_000_000.0;
        assert!((cost - expected).abs() < 1e-12);

        let estimate = UsageEstimate::from_texts("abcd", "abcdabcd", "gemini-2.0-flash");
        assert_eq!(estimate.total_tokens, 3);
    }
}
