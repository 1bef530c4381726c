//! Configuration loading, validation, and management for Weekend Wizard.
//!
//! Loads configuration from `~/.wizard/config.toml` (or an explicit path)
//! with environment variable overrides. Validated once at startup, then
//! passed by reference to whatever needs it.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use wizard_core::RetryPolicy;

/// The root configuration structure.
///
/// Maps directly to `~/.wizard/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model provider: "ollama", "openai", "openrouter", or any
    /// OpenAI-compatible name when `api_url` is set
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the chat-completions API (defaults per provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// API key (not needed for a local Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sampling temperature for decisions
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Retry policy for model completions
    #[serde(default = "RetryConfig::model", deserialize_with = "model_retry_section")]
    pub model_retry: RetryConfig,

    /// Retry policy for capability dispatches
    #[serde(default = "RetryConfig::network", deserialize_with = "tool_retry_section")]
    pub tool_retry: RetryConfig,

    /// Capability HTTP settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "mistral".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("model_retry", &self.model_retry)
            .field("tool_retry", &self.tool_retry)
            .field("tools", &self.tools)
            .finish()
    }
}

/// `[agent]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum decide/act iterations per request
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Run the reflection pass over final answers
    #[serde(default = "default_true")]
    pub reflection: bool,

    #[serde(default)]
    pub reflection_temperature: f32,

    /// Stop early after this many repeats of an already-failed call (0 = never)
    #[serde(default = "default_repeat_failure_limit")]
    pub repeat_failure_limit: u32,
}

fn default_max_steps() -> u32 {
    8
}
fn default_repeat_failure_limit() -> u32 {
    2
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            reflection: true,
            reflection_temperature: 0.0,
            repeat_failure_limit: default_repeat_failure_limit(),
        }
    }
}

/// `[model_retry]` / `[tool_retry]` sections.
///
/// Keys missing from a section keep that section's own defaults
/// ([`RetryConfig::model`] or [`RetryConfig::network`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    /// Per-attempt timeout; 0 disables it
    pub attempt_timeout_secs: u64,
}

impl RetryConfig {
    /// Defaults for capability calls against public APIs.
    pub fn network() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 8000,
            jitter: true,
            attempt_timeout_secs: 25,
        }
    }

    /// Defaults for model completions.
    pub fn model() -> Self {
        Self {
            base_delay_ms: 500,
            attempt_timeout_secs: 120,
            ..Self::network()
        }
    }

    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
            attempt_timeout: (self.attempt_timeout_secs > 0)
                .then(|| Duration::from_secs(self.attempt_timeout_secs)),
        }
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{section}.max_attempts must be at least 1"
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "{section}.backoff_multiplier must be >= 1.0"
            )));
        }
        Ok(())
    }
}

/// A retry section as written in the file.
#[derive(Debug, Default, Deserialize)]
struct RetrySection {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    max_delay_ms: Option<u64>,
    jitter: Option<bool>,
    attempt_timeout_secs: Option<u64>,
}

impl RetrySection {
    fn over(self, base: RetryConfig) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_delay_ms: self.base_delay_ms.unwrap_or(base.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(base.backoff_multiplier),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            jitter: self.jitter.unwrap_or(base.jitter),
            attempt_timeout_secs: self.attempt_timeout_secs.unwrap_or(base.attempt_timeout_secs),
        }
    }
}

fn model_retry_section<'de, D: Deserializer<'de>>(d: D) -> Result<RetryConfig, D::Error> {
    RetrySection::deserialize(d).map(|section| section.over(RetryConfig::model()))
}

fn tool_retry_section<'de, D: Deserializer<'de>>(d: D) -> Result<RetryConfig, D::Error> {
    RetrySection::deserialize(d).map(|section| section.over(RetryConfig::network()))
}

/// `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// HTTP timeout per request
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_tool_timeout() -> u64 {
    20
}
fn default_user_agent() -> String {
    concat!("weekend-wizard/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            user_agent: default_user_agent(),
            endpoints: Endpoints::default(),
        }
    }
}

/// `[tools.endpoints]`: where each capability's public API lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Open-Meteo forecast endpoint
    pub open_meteo: String,
    /// Open-Meteo geocoding search endpoint
    pub geocoding: String,
    /// Open Library site root (search lives at `/search.json`)
    pub open_library: String,
    /// JokeAPI endpoint
    pub joke_api: String,
    /// Dog CEO random image endpoint
    pub dog_ceo: String,
    /// Open Trivia DB endpoint
    pub open_trivia: String,
}

impl Endpoints {
    /// Every endpoint rooted at one base URL, for local mirrors and tests.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            open_meteo: format!("{base}/v1/forecast"),
            geocoding: format!("{base}/v1/search"),
            open_library: base.to_string(),
            joke_api: format!("{base}/joke/Any"),
            dog_ceo: format!("{base}/api/breeds/image/random"),
            open_trivia: format!("{base}/api.php"),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            open_meteo: "https://api.open-meteo.com/v1/forecast".into(),
            geocoding: "https://geocoding-api.open-meteo.com/v1/search".into(),
            open_library: "https://openlibrary.org".into(),
            joke_api: "https://v2.jokeapi.dev/joke/Any".into(),
            dog_ceo: "https://dog.ceo/api/breeds/image/random".into(),
            open_trivia: "https://opentdb.com/api.php".into(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or the default location when `None`,
    /// then apply environment overrides:
    ///
    /// - `WIZARD_PROVIDER`, `WIZARD_MODEL`, `WIZARD_API_URL`, `WIZARD_API_KEY`
    /// - `OLLAMA_MODEL` and `OLLAMA_HOST` when the provider is Ollama
    /// - `OPENAI_API_KEY` / `OPENROUTER_API_KEY` for those providers
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);
        let mut config = Self::load_from(&config_path)?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides using `var` as the lookup.
    /// Empty values count as unset.
    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = var("WIZARD_PROVIDER") {
            self.provider = provider;
        }
        let is_ollama = self.provider == "ollama";

        if let Some(model) =
            var("WIZARD_MODEL").or_else(|| is_ollama.then(|| var("OLLAMA_MODEL")).flatten())
        {
            self.model = model;
        }

        if let Some(url) = var("WIZARD_API_URL") {
            self.api_url = Some(url);
        } else if is_ollama && let Some(host) = var("OLLAMA_HOST") {
            self.api_url = Some(ollama_api_url(&host));
        }

        if let Some(key) = var("WIZARD_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = match self.provider.as_str() {
                "openai" => var("OPENAI_API_KEY"),
                "openrouter" => var("OPENROUTER_API_KEY"),
                _ => None,
            };
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".wizard")
    }

    /// Default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::ValidationError("provider must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        for (name, t) in [
            ("temperature", self.temperature),
            ("agent.reflection_temperature", self.agent.reflection_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }
        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.timeout_secs must be at least 1".into(),
            ));
        }
        self.model_retry.validate("model_retry")?;
        self.tool_retry.validate("tool_retry")?;
        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            agent: AgentSettings::default(),
            model_retry: RetryConfig::model(),
            tool_retry: RetryConfig::network(),
            tools: ToolsConfig::default(),
        }
    }
}

/// `OLLAMA_HOST` names the server root; the chat API lives under `/v1`.
fn ollama_api_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let host = if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };
    if host.ends_with("/v1") {
        host
    } else {
        format!("{host}/v1")
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
