//! Configuration loading, validation, and management for Toolwright.
//!
//! Loads configuration from `~/.toolwright/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.toolwright/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override for the provider (custom OpenAI-compatible servers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// LLM provider ("openai", "openrouter", "ollama", "custom")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Stream model output
    #[serde(default = "default_true")]
    pub streaming: bool,

    /// Seeded as the first message of every new session
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Tool credentials and endpoints
    #[serde(default)]
    pub tools: ToolsConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}
fn default_system_prompt() -> String {
    "You are a helpful assistant that can answer questions and perform calculations. \
     Use the tools at your disposal to give your answers. Reply with a respectful tone \
     and no more than 2 sentences for each response coming from a tool."
        .into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("streaming", &self.streaming)
            .field("agent", &self.agent)
            .field("store", &self.store)
            .field("tools", &self.tools)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// `[agent]` section: loop behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model calls per turn before giving up (0 = unlimited)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Pause before every tool dispatch until a human approves
    #[serde(default)]
    pub require_approval: bool,

    /// Run the calls of one tool request concurrently
    #[serde(default = "default_true")]
    pub parallel_tools: bool,
}

fn default_max_iterations() -> usize {
    25
}
fn default_model_timeout() -> u64 {
    120
}
fn default_tool_timeout() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            model_timeout_secs: default_model_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            require_approval: false,
            parallel_tools: true,
        }
    }
}

/// `[store]` section: where sessions live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory", "file" or "sqlite"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Directory (file) or database file (sqlite); defaults under the config dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// Known backend names.
    pub const BACKENDS: &'static [&'static str] = &["memory", "file", "sqlite"];

    /// The effective storage location for the configured backend.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        match self.backend.as_str() {
            "file" => AppConfig::config_dir().join("sessions"),
            _ => AppConfig::config_dir().join("sessions.db"),
        }
    }
}

/// `[tools]` section: upstream credentials and endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openweathermap_api_key: Option<String>,

    /// Optional CoinGecko demo/pro key; the public API works without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coingecko_api_key: Option<String>,

    /// Web search is only offered when this is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brave_search_api_key: Option<String>,

    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,

    #[serde(default = "default_openweathermap_url")]
    pub openweathermap_url: String,

    #[serde(default = "default_brave_search_url")]
    pub brave_search_url: String,
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".into()
}
fn default_openweathermap_url() -> String {
    "https://api.openweathermap.org/data/2.5".into()
}
fn default_brave_search_url() -> String {
    "https://api.search.brave.com/res/v1".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            openweathermap_api_key: None,
            coingecko_api_key: None,
            brave_search_api_key: None,
            coingecko_url: default_coingecko_url(),
            openweathermap_url: default_openweathermap_url(),
            brave_search_url: default_brave_search_url(),
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("openweathermap_api_key", &redact(&self.openweathermap_api_key))
            .field("coingecko_api_key", &redact(&self.coingecko_api_key))
            .field("brave_search_api_key", &redact(&self.brave_search_api_key))
            .field("coingecko_url", &self.coingecko_url)
            .field("openweathermap_url", &self.openweathermap_url)
            .field("brave_search_url", &self.brave_search_url)
            .finish()
    }
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42680
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolwright/config.toml).
    ///
    /// Environment variables take precedence for unset secrets:
    /// - `TOOLWRIGHT_API_KEY`, then `OPENAI_API_KEY`, then `OPENROUTER_API_KEY`
    /// - `OPENWEATHERMAP_API_KEY`, `COINGECKO_API_KEY`, `BRAVE_SEARCH_API_KEY`
    ///
    /// and always win for `TOOLWRIGHT_PROVIDER` / `TOOLWRIGHT_MODEL`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from `lookup` (injectable for tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("TOOLWRIGHT_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .or_else(|| lookup("OPENROUTER_API_KEY"));
        }
        if let Some(provider) = lookup("TOOLWRIGHT_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = lookup("TOOLWRIGHT_MODEL") {
            self.model = model;
        }

        let tools = &mut self.tools;
        if tools.openweathermap_api_key.is_none() {
            tools.openweathermap_api_key = lookup("OPENWEATHERMAP_API_KEY");
        }
        if tools.coingecko_api_key.is_none() {
            tools.coingecko_api_key = lookup("COINGECKO_API_KEY");
        }
        if tools.brave_search_api_key.is_none() {
            tools.brave_search_api_key = lookup("BRAVE_SEARCH_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolwright")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.model_timeout_secs == 0 || self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent timeouts must be greater than 0 seconds".into(),
            ));
        }

        if !StoreConfig::BACKENDS.contains(&self.store.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}' (expected one of: {})",
                self.store.backend,
                StoreConfig::BACKENDS.join(", ")
            )));
        }

        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError(
                "gateway port must be non-zero".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            streaming: true,
            system_prompt: default_system_prompt(),
            agent: AgentConfig::default(),
            store: StoreConfig::default(),
            tools: ToolsConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
