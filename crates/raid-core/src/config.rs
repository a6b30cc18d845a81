//! Environment-driven configuration
//!
//! All validation happens here, at start-up. Components never re-read the
//! environment at runtime.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a model backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    /// "openai" or "ollama"
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmBackendConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            base_url: None,
            model: "gpt-4o".to_string(),
            max_tokens: 1000,
            temperature: 0.5,
        }
    }
}

/// Configuration for the broker connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub password: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl BrokerConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{}@{}:{}/{}", pw, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Top-level Raid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RaidConfig {
    pub llm: LlmBackendConfig,
    pub broker: BrokerConfig,
    /// Capacity limit for non-excluded workers.
    pub max_workers: usize,
    /// Directory holding profile YAML files.
    pub profiles_dir: String,
}

impl RaidConfig {
    /// Build configuration from environment variables.
    ///
    /// Fails with `Error::ConfigInvalid` on an unknown provider or a
    /// malformed numeric value; this is the only fatal error class.
    pub fn from_env() -> Result<Self> {
        let provider = env_or("RAID_LLM_PROVIDER", "openai");

        let llm = match provider.as_str() {
            "openai" => LlmBackendConfig {
                provider,
                api_key: std::env::var("OPENAI_API_KEY").ok(),
                base_url: std::env::var("RAID_OPENAI_BASE_URL").ok(),
                model: env_or("RAID_OPENAI_MODEL", "gpt-4o"),
                ..Default::default()
            },
            "ollama" => LlmBackendConfig {
                provider,
                api_key: None,
                base_url: Some(env_or("RAID_OLLAMA_URL", "http://localhost:11434")),
                model: env_or("RAID_OLLAMA_MODEL", "qwen3:30b"),
                ..Default::default()
            },
            other => {
                return Err(Error::config(format!("unsupported LLM provider: {other}")));
            }
        };

        let broker = BrokerConfig {
            host: env_or("RAID_REDIS_HOST", "localhost"),
            port: parse_env("RAID_REDIS_PORT", 6379)?,
            db: parse_env("RAID_REDIS_DB", 0)?,
            password: std::env::var("RAID_REDIS_PASSWORD").ok(),
        };

        Ok(Self {
            llm,
            broker,
            max_workers: parse_env("RAID_MAX_WORKERS", 5)?,
            profiles_dir: env_or("RAID_PROFILES_DIR", "profiles"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}
