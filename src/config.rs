//! Runtime configuration.
//!
//! Settings come from environment variables (a `.env` file is honoured for
//! local development) and are gathered into one [`Config`] that the binary
//! hands to the session and playlist sources.

use crate::negotiator::candidate_models;
use induction_realtime_types::Voice;
use secrecy::SecretString;
use std::env;
use tracing::Level;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PLAYLIST_SOURCE: &str = "playlists";

/// Models tried after any explicitly configured ones.
pub const DEFAULT_MODELS: &[&str] = &[
    "gpt-realtime",
    "gpt-4o-realtime-preview-2024-12-17",
    "gpt-4o-mini-realtime-preview-2024-12-17",
];

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment.
#[derive(Debug)]
pub struct Config {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub primary_model: Option<String>,
    pub fallback_models: Vec<String>,
    pub voice: Voice,
    pub session_endpoint: Option<String>,
    pub playlist_source: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `OPENAI_API_KEY`: Secret key used to negotiate sessions locally.
    /// *   `REALTIME_BASE_URL`: (Optional) API root. Defaults to `https://api.openai.com/v1`.
    /// *   `REALTIME_MODEL`: (Optional) Preferred realtime model, tried first.
    /// *   `REALTIME_FALLBACK_MODELS`: (Optional) Comma separated models tried next.
    /// *   `REALTIME_VOICE`: (Optional) Narration voice. Defaults to "alloy".
    /// *   `SESSION_ENDPOINT`: (Optional) URL that hands out session descriptors.
    /// *   `PLAYLIST_SOURCE`: (Optional) Playlist URL or directory. Defaults to "playlists".
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. Ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = non_empty("OPENAI_API_KEY").map(SecretString::from);

        let base_url = non_empty("REALTIME_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "REALTIME_BASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", base_url),
            ));
        }

        let primary_model = non_empty("REALTIME_MODEL");
        let fallback_models = non_empty("REALTIME_FALLBACK_MODELS")
            .map(|list| {
                list.split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let voice = non_empty("REALTIME_VOICE")
            .map(|v| v.to_lowercase().parse::<Voice>().unwrap_or_else(|never| match never {}))
            .unwrap_or_default();

        let session_endpoint = non_empty("SESSION_ENDPOINT");
        let playlist_source =
            non_empty("PLAYLIST_SOURCE").unwrap_or_else(|| DEFAULT_PLAYLIST_SOURCE.to_string());

        let log_level_str = non_empty("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_key,
            base_url,
            primary_model,
            fallback_models,
            voice,
            session_endpoint,
            playlist_source,
            log_level,
        })
    }

    /// Ordered, de-duplicated models to negotiate with.
    pub fn candidate_models(&self) -> Vec<String> {
        candidate_models(
            self.primary_model.as_deref(),
            &self.fallback_models,
            DEFAULT_MODELS,
        )
    }
}
