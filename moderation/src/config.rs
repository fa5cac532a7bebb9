//! Configuration for the moderation engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::policy::ContentPolicy;
use crate::types::ContentType;

/// Default auto-approval threshold. Only unambiguous content clears it.
pub const DEFAULT_AUTO_APPROVE_THRESHOLD: f64 = 0.9;

/// Moderation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Minimum confidence (inclusive) for an APPROVE to skip human review
    pub auto_approve_threshold: f64,
    /// Upper bound on one evaluation call (ms)
    pub timeout_ms: u64,
    /// Bounded output size for the evaluation service
    pub max_output_tokens: u32,
    /// Sampling temperature for evaluations
    pub temperature: f32,
    /// Per-content-type policy overrides
    pub policy_overrides: HashMap<ContentType, ContentPolicy>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            auto_approve_threshold: DEFAULT_AUTO_APPROVE_THRESHOLD,
            timeout_ms: 5_000,
            max_output_tokens: 300,
            temperature: 0.0,
            policy_overrides: HashMap::new(),
        }
    }
}

impl ModerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Set the auto-approval threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.auto_approve_threshold = threshold;
        self
    }

    /// Set the evaluation timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.auto_approve_threshold) {
            return Err(format!(
                "auto_approve_threshold must be within [0, 1], got {}",
                self.auto_approve_threshold
            ));
        }

        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than zero".to_string());
        }

        if self.max_output_tokens == 0 {
            return Err("max_output_tokens must be greater than zero".to_string());
        }

        Ok(())
    }
}
