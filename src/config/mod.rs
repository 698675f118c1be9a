// src/config/mod.rs
// All values come from the environment (with .env support); code supplies defaults.

use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::llm::client::GeminiClient;
use crate::memory::service::SUMMARIZATION_THRESHOLD;

#[derive(Debug, Clone, Deserialize)]
pub struct EngramConfig {
    // ── Storage Configuration
    pub storage_path: String,

    // ── Summarization Configuration
    pub enable_summarization: bool,
    pub summarization_model: String,
    pub summarization_threshold: u64,

    // ── Gemini API Configuration
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub request_timeout_secs: u64,
}

// Handles values with trailing comments and extra whitespace.
fn parse_env_value<T>(raw: &str, default: T) -> T
where
    T: FromStr,
{
    let clean = raw.split('#').next().unwrap_or("").trim();
    clean.parse::<T>().unwrap_or(default)
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(raw) => parse_env_value(&raw, default),
        Err(_) => default,
    }
}

impl EngramConfig {
    pub fn from_env() -> Self {
        // Load .env if present; plain environment variables win otherwise.
        let _ = dotenvy::dotenv();

        Self {
            storage_path: env_var_or("ENGRAM_STORAGE_PATH", "./engram-memory.json".to_string()),
            enable_summarization: env_var_or("ENGRAM_ENABLE_SUMMARIZATION", true),
            summarization_model: env_var_or(
                "ENGRAM_SUMMARIZATION_MODEL",
                "gemini-2.5-flash".to_string(),
            ),
            summarization_threshold: env_var_or(
                "ENGRAM_SUMMARIZATION_THRESHOLD",
                SUMMARIZATION_THRESHOLD,
            ),
            gemini_api_key: env_var_or("GEMINI_API_KEY", String::new()),
            gemini_base_url: env_var_or(
                "ENGRAM_GEMINI_BASE_URL",
                GeminiClient::DEFAULT_API_BASE.to_string(),
            ),
            request_timeout_secs: env_var_or("ENGRAM_REQUEST_TIMEOUT", 60),
        }
    }

    /// Summarization needs both the feature flag and an API key.
    pub fn summarization_configured(&self) -> bool {
        self.enable_summarization && !self.gemini_api_key.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// Global config instance - loaded once at first use
pub static CONFIG: Lazy<EngramConfig> = Lazy::new(EngramConfig::from_env);
