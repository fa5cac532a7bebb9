//! Command-line arguments and environment handling.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use community::CommunityConfig;

/// Solace - moderation tooling for the grief-support community
#[derive(Parser, Debug, Clone)]
#[command(name = "solace")]
#[command(about = "Evaluate community content and check the moderation backend")]
pub struct Args {
    /// Base URL of the OpenAI-compatible evaluation service
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub llm_base_url: String,

    /// Model used for evaluations and companion replies
    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// API key for the evaluation service
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// YAML configuration file (moderation, companion, presence, chat)
    #[arg(long, env = "SOLACE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Evaluate a submission read from a JSON file and print the outcome
    Evaluate {
        /// Submission JSON, tagged with `contentType`
        file: PathBuf,
    },
    /// Check that the evaluation service is reachable
    Probe,
    /// Print the effective configuration as YAML
    ShowConfig,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.llm_base_url.trim().is_empty() {
            return Err("LLM_BASE_URL must not be empty".to_string());
        }
        if !(self.llm_base_url.starts_with("http://") || self.llm_base_url.starts_with("https://")) {
            return Err("LLM_BASE_URL must be an http(s) URL".to_string());
        }
        if self.llm_model.trim().is_empty() {
            return Err("LLM_MODEL must not be empty".to_string());
        }
        Ok(())
    }

    /// Default tracing filter when RUST_LOG is not set.
    pub fn log_filter(&self) -> String {
        format!(
            "solace={level},moderation={level},community={level},warn",
            level = self.log_level
        )
    }

    /// Load the YAML configuration, or defaults when none is given.
    pub fn community_config(&self) -> anyhow::Result<CommunityConfig> {
        match &self.config {
            Some(path) => Ok(CommunityConfig::from_file(path)?),
            None => Ok(CommunityConfig::default()),
        }
    }
}
