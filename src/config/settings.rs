//! Application settings and configuration
//!
//! This module provides configuration management for the gateway,
//! loading settings from environment variables with sensible defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

/// Default upstream chat completions endpoint
pub const DEFAULT_UPSTREAM_URL: &str =
    "https://huggingface.co/api/inference-proxy/together/v1/chat/completions";

/// Model advertised by `/v1/models` when nothing else is configured
pub const DEFAULT_LISTED_MODEL: &str = "deepseek-ai/DeepSeek-R1";

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// Timeouts applied to upstream calls
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamTimeouts {
    /// TCP/TLS connect timeout
    pub connect_timeout_seconds: u64,
    /// Deadline for receiving response headers on a single attempt
    pub attempt_timeout_seconds: u64,
    /// Maximum gap between two body chunks
    pub stream_idle_timeout_seconds: u64,
}

impl Default for UpstreamTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 10,
            attempt_timeout_seconds: 120,
            stream_idle_timeout_seconds: 300,
        }
    }
}

impl UpstreamTimeouts {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_seconds)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_seconds)
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Server settings
    pub host: String,
    pub port: u16,

    // Upstream settings
    pub upstream_url: String,
    /// Raw newline-delimited credential list, parsed into the pool at startup
    #[serde(skip_serializing)]
    pub upstream_api_keys: String,
    pub timeouts: UpstreamTimeouts,

    // Authentication
    #[serde(skip_serializing)]
    pub gateway_api_key: Option<String>,

    // Request shaping
    /// Forces the `model` field of every forwarded request when set
    pub pinned_model: Option<String>,
    /// Forward the caller's (filtered) headers to the upstream
    pub forward_client_headers: bool,

    /// Model ids advertised by `GET /v1/models`
    pub listed_models: Vec<String>,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        Self::from_source(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    ///
    /// `load()` passes the process environment; tests pass a map.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let get_any = |keys: &[&str]| keys.iter().find_map(|key| lookup(*key));
        let non_empty = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let pinned_model = non_empty(lookup("PINNED_MODEL"));

        let listed_models = match non_empty(lookup("MODELS")) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
            None => vec![pinned_model
                .clone()
                .unwrap_or_else(|| DEFAULT_LISTED_MODEL.to_string())],
        };

        let settings = Self {
            // App settings
            app_name: get("APP_NAME", "llm-failover-gateway"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: get("ENVIRONMENT", "development")
                .parse()
                .context("Invalid ENVIRONMENT value")?,
            log_level: get("LOG_LEVEL", "info"),

            // Server settings
            host: get("HOST", "0.0.0.0"),
            port: get("PORT", "8000").parse().context("Invalid PORT value")?,

            // Upstream settings
            upstream_url: get("UPSTREAM_URL", DEFAULT_UPSTREAM_URL),
            upstream_api_keys: get_any(&["UPSTREAM_API_KEYS", "HF_API_KEYS"]).unwrap_or_default(),
            timeouts: UpstreamTimeouts {
                connect_timeout_seconds: get("UPSTREAM_CONNECT_TIMEOUT_SECONDS", "10")
                    .parse()
                    .context("Invalid UPSTREAM_CONNECT_TIMEOUT_SECONDS value")?,
                attempt_timeout_seconds: get("UPSTREAM_ATTEMPT_TIMEOUT_SECONDS", "120")
                    .parse()
                    .context("Invalid UPSTREAM_ATTEMPT_TIMEOUT_SECONDS value")?,
                stream_idle_timeout_seconds: get("STREAM_IDLE_TIMEOUT_SECONDS", "300")
                    .parse()
                    .context("Invalid STREAM_IDLE_TIMEOUT_SECONDS value")?,
            },

            // Authentication
            gateway_api_key: non_empty(get_any(&["GATEWAY_API_KEY", "WORKER_AUTH_KEY"])),

            // Request shaping
            pinned_model,
            forward_client_headers: get("FORWARD_CLIENT_HEADERS", "false")
                .parse()
                .unwrap_or(false),

            listed_models,
        };

        // Validate settings
        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.timeouts.connect_timeout_seconds == 0
            || self.timeouts.attempt_timeout_seconds == 0
            || self.timeouts.stream_idle_timeout_seconds == 0
        {
            anyhow::bail!("Upstream timeouts must be > 0");
        }

        let url = url::Url::parse(&self.upstream_url)
            .with_context(|| format!("Invalid UPSTREAM_URL: {}", self.upstream_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("UPSTREAM_URL must use http or https, got {}", url.scheme());
        }

        if self.gateway_api_key.is_none() {
            if self.is_production() {
                anyhow::bail!("GATEWAY_API_KEY is required in production");
            }
            tracing::warn!("No GATEWAY_API_KEY configured, inbound authentication is disabled");
        }

        Ok(())
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Check if inbound bearer authentication is enforced
    pub fn requires_api_key(&self) -> bool {
        self.gateway_api_key.is_some()
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "llm-failover-gateway".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            upstream_api_keys: String::new(),
            timeouts: UpstreamTimeouts::default(),
            gateway_api_key: None,
            pinned_model: None,
            forward_client_headers: false,
            listed_models: vec![DEFAULT_LISTED_MODEL.to_string()],
        }
    }
}
