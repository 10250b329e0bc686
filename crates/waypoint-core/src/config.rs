//! Investigation configuration
//!
//! Loaded from TOML. Every key is optional; a missing file yields defaults.
//!
//! ```toml
//! confidence_threshold = 0.85
//! competing_threshold = 0.6
//! collector_timeout_secs = 30
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::InvestigationError;
use crate::paths;
use crate::synthesis::DecisionPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationConfig {
    /// Auto-conclude when the top hypothesis reaches this (inclusive).
    pub confidence_threshold: f64,
    /// Hypotheses strictly above this count as competing.
    pub competing_threshold: f64,
    pub max_question_candidates: usize,
    pub extraction_max_tokens: usize,
    pub extraction_temperature: f32,
    /// Timeout for collectors that do not declare their own.
    pub collector_timeout_secs: u64,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.80,
            competing_threshold: 0.60,
            max_question_candidates: 3,
            extraction_max_tokens: 1024,
            extraction_temperature: 0.0,
            collector_timeout_secs: 60,
        }
    }
}

impl InvestigationConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded investigation config");
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load from ~/.waypoint/config.toml.
    pub fn load_default() -> Result<Self> {
        Self::load_or_default(&paths::config_path())
    }

    pub fn validate(&self) -> Result<(), InvestigationError> {
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("competing_threshold", self.competing_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(InvestigationError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.competing_threshold >= self.confidence_threshold {
            return Err(InvestigationError::InvalidConfig(format!(
                "competing_threshold ({}) must be below confidence_threshold ({})",
                self.competing_threshold, self.confidence_threshold
            )));
        }
        if self.max_question_candidates == 0 {
            return Err(InvestigationError::InvalidConfig(
                "max_question_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout_secs)
    }

    pub fn policy(&self) -> DecisionPolicy {
        DecisionPolicy::from(self)
    }
}
