//! Generation settings.
//!
//! # Responsibility
//! - Hold model parameters and orchestration thresholds in one value.
//! - Read optional overrides from the environment.
//!
//! # Invariants
//! - The remote-call timeout is not configurable here; see
//!   `ai::client::GENERATION_TIMEOUT`.

use crate::ai::client::ModelConfig;
use crate::ai::prompt::MAX_INPUT_CHARS;

/// Minimum trimmed note length, in characters, accepted for generation.
pub const MIN_CONTENT_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: ModelConfig,
    pub min_content_chars: usize,
    pub max_input_chars: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            min_content_chars: MIN_CONTENT_CHARS,
            max_input_chars: MAX_INPUT_CHARS,
        }
    }
}

impl GenerationSettings {
    /// Defaults, with `SMARTNOTE_MODEL` overriding the model name when set.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(model) = std::env::var("SMARTNOTE_MODEL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            settings.model.model = model;
        }
        settings
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model.model = model.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerationSettings, MIN_CONTENT_CHARS};

    #[test]
    fn defaults_match_orchestration_thresholds() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.min_content_chars, MIN_CONTENT_CHARS);
        assert_eq!(settings.max_input_chars, 8_000);
        assert_eq!(
            settings.with_model("gemini-1.5-pro").model.model,
            "gemini-1.5-pro"
        );
    }
}
