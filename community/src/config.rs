//! Configuration for the community services.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use moderation::ModerationConfig;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the community core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    /// Moderation engine configuration
    pub moderation: ModerationConfig,
    /// Companion chat configuration
    pub companion: CompanionConfig,
    /// Presence configuration
    pub presence: PresenceConfig,
    /// Chat request configuration
    pub chat: ChatConfig,
}

impl CommunityConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.moderation.validate().map_err(ConfigError::Invalid)?;

        if self.companion.history_window == 0 {
            return Err(ConfigError::Invalid(
                "companion.history_window must be greater than zero".to_string(),
            ));
        }

        if self.presence.room.trim().is_empty() {
            return Err(ConfigError::Invalid("presence.room must not be empty".to_string()));
        }

        if self.presence.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "presence.channel_capacity must be greater than zero".to_string(),
            ));
        }

        if self.chat.max_message_len == 0 {
            return Err(ConfigError::Invalid(
                "chat.max_message_len must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Companion chat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Prior messages sent with each reply request
    pub history_window: usize,
    /// Maximum tokens per reply
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound on one reply (ms)
    pub timeout_ms: u64,
    /// Agent type → persona system prompt
    pub personas: BTreeMap<String, String>,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        let personas = [
            (
                "grief_companion",
                "You are a gentle companion for someone who is grieving. Listen first, \
                 reflect what you hear, and never rush them toward feeling better.",
            ),
            (
                "spiritual_guide",
                "You offer comfort drawn from the person's own spiritual or philosophical \
                 worldview. Never impose beliefs they have not expressed.",
            ),
            (
                "memory_keeper",
                "You help the person remember and celebrate the one they lost by asking \
                 about stories, habits and small details.",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            history_window: 20,
            max_tokens: 600,
            temperature: 0.7,
            timeout_ms: 20_000,
            personas,
        }
    }
}

impl CompanionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn persona(&self, agent_type: &str) -> Option<&str> {
        self.personas.get(agent_type).map(String::as_str)
    }
}

/// Presence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Shared room every member joins
    pub room: String,
    /// Events buffered per room before slow subscribers lag
    pub channel_capacity: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            room: "community".to_string(),
            channel_capacity: 256,
        }
    }
}

/// Chat request configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum characters in a request's introduction message
    pub max_message_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_len: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CommunityConfig::default();
        assert_eq!(config.moderation.auto_approve_threshold, 0.9);
        assert_eq!(config.companion.history_window, 20);
        assert_eq!(config.presence.room, "community");
        assert_eq!(config.chat.max_message_len, 500);
        assert!(config.companion.persona("grief_companion").is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
moderation:
  auto_approve_threshold: 0.95
  policy_overrides:
    journal_entry:
      uses_auto_approve_gate: true
presence:
  room: lobby
"#;
        let config = CommunityConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.moderation.auto_approve_threshold, 0.95);
        assert_eq!(config.moderation.timeout_ms, 5_000);
        assert_eq!(config.presence.room, "lobby");
        assert_eq!(config.presence.channel_capacity, 256);
        assert_eq!(config.chat.max_message_len, 500);
        assert_eq!(config.moderation.policy_overrides.len(), 1);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = CommunityConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed = CommunityConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.companion.personas, config.companion.personas);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let yaml = "moderation:\n  auto_approve_threshold: 2.0\n";
        let config = CommunityConfig::from_yaml(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
