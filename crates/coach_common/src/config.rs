//! Configuration management for coachd.
//!
//! Loads settings from a TOML file or uses defaults. Every field carries a
//! serde default, so partial files are valid.
//!
//! Lookup order: explicit path, `COACH_CONFIG`, /etc/coach/config.toml,
//! built-in defaults.

use crate::error::CoachError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/coach/config.toml";

/// Environment variable overriding the config path
pub const CONFIG_ENV: &str = "COACH_CONFIG";

// ============================================================================
// Gateway
// ============================================================================

/// Breaker, timeout and cache settings for the AI gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Consecutive failures before a provider's breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before closing again
    #[serde(default = "default_recovery_window")]
    pub recovery_window_secs: u64,

    /// Per-call timeout when neither the caller nor the provider sets one
    #[serde(default = "default_gateway_timeout")]
    pub default_timeout_secs: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_window() -> u64 {
    300
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_cache_ttl() -> u64 {
    3_600
}

fn default_cache_capacity() -> usize {
    500
}

/// Longest breaker recovery window or cache TTL accepted
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 3_600;

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_window_secs: default_recovery_window(),
            default_timeout_secs: default_gateway_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl GatewayConfig {
    pub fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.recovery_window_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `/v1/chat/completions` (OpenAI, Groq, DeepSeek, OpenRouter, ...)
    OpenaiCompatible,
    /// Ollama `/api/chat`
    Ollama,
}

/// One generative-AI backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub endpoint: String,
    pub model: String,

    /// Environment variable holding the API key (never the key itself)
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Lower is tried first
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Languages this provider is preferred for (ISO 639-1)
    #[serde(default)]
    pub languages: Vec<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_priority() -> u32 {
    100
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Resolve the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

// ============================================================================
// Session
// ============================================================================

/// Conversation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default question target for new sessions
    #[serde(default = "default_total_questions")]
    pub total_questions: u32,

    /// Token budget for intros, questions, feedback and summaries
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_evaluation_max_tokens")]
    pub evaluation_max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_evaluation_temperature")]
    pub evaluation_temperature: f32,
}

fn default_total_questions() -> u32 {
    15
}

fn default_max_tokens() -> u32 {
    400
}

fn default_evaluation_max_tokens() -> u32 {
    900
}

fn default_temperature() -> f32 {
    0.7
}

fn default_evaluation_temperature() -> f32 {
    0.2
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_questions: default_total_questions(),
            max_tokens: default_max_tokens(),
            evaluation_max_tokens: default_evaluation_max_tokens(),
            temperature: default_temperature(),
            evaluation_temperature: default_evaluation_temperature(),
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Background sweeper settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Inactivity window after which a live session times out
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,

    /// Inactivity after which an unfinished session is abandoned
    #[serde(default = "default_abandon_after")]
    pub abandon_after_hours: i64,

    /// Retention for completed sessions before archival
    #[serde(default = "default_archive_after")]
    pub archive_after_days: i64,
}

/// Upper bounds accepted by `CoachConfig::validate`
pub const MAX_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;
pub const MAX_ABANDON_AFTER_HOURS: i64 = 365 * 24;
pub const MAX_ARCHIVE_AFTER_DAYS: i64 = 100 * 365;

fn default_sweep_interval() -> u64 {
    300
}

fn default_timeout_minutes() -> i64 {
    30
}

fn default_abandon_after() -> i64 {
    24
}

fn default_archive_after() -> i64 {
    30
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            timeout_minutes: default_timeout_minutes(),
            abandon_after_hours: default_abandon_after(),
            archive_after_days: default_archive_after(),
        }
    }
}

impl LifecycleConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// None when the value does not fit a `chrono::Duration`
    pub fn timeout_window(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_minutes(self.timeout_minutes)
    }

    pub fn abandon_after(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_hours(self.abandon_after_hours)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Main coachd configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoachConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CoachConfig {
    /// Load config, falling back through the lookup order to defaults
    pub fn load(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            match Self::load_from_path(path) {
                Ok(config) => return config,
                Err(e) => warn!("Config {} unusable: {}", path.display(), e),
            }
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            match Self::load_from_path(Path::new(&path)) {
                Ok(config) => return config,
                Err(e) => warn!("Config {} from {} unusable: {}", path, CONFIG_ENV, e),
            }
        }

        Self::load_from_path(Path::new(CONFIG_PATH)).unwrap_or_else(|e| {
            warn!("Config not found, using defaults: {}", e);
            CoachConfig::default()
        })
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, CoachError> {
        let content = fs::read_to_string(path)
            .map_err(|e| CoachError::Config(format!("read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, CoachError> {
        let config: CoachConfig =
            toml::from_str(content).map_err(|e| CoachError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoachError> {
        if self.gateway.failure_threshold == 0 {
            return Err(CoachError::Config(
                "gateway.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.gateway.cache_capacity == 0 {
            return Err(CoachError::Config(
                "gateway.cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.session.total_questions == 0 {
            return Err(CoachError::Config(
                "session.total_questions must be at least 1".to_string(),
            ));
        }
        if self.gateway.recovery_window_secs > MAX_WINDOW_SECS
            || self.gateway.cache_ttl_secs > MAX_WINDOW_SECS
        {
            return Err(CoachError::Config(format!(
                "gateway recovery window and cache ttl must be at most {} seconds",
                MAX_WINDOW_SECS
            )));
        }
        let lifecycle = &self.lifecycle;
        if !(1..=MAX_TIMEOUT_MINUTES).contains(&lifecycle.timeout_minutes) {
            return Err(CoachError::Config(format!(
                "lifecycle.timeout_minutes must be between 1 and {}",
                MAX_TIMEOUT_MINUTES
            )));
        }
        if !(1..=MAX_ABANDON_AFTER_HOURS).contains(&lifecycle.abandon_after_hours) {
            return Err(CoachError::Config(format!(
                "lifecycle.abandon_after_hours must be between 1 and {}",
                MAX_ABANDON_AFTER_HOURS
            )));
        }
        if !(0..=MAX_ARCHIVE_AFTER_DAYS).contains(&lifecycle.archive_after_days) {
            return Err(CoachError::Config(format!(
                "lifecycle.archive_after_days must be between 0 and {}",
                MAX_ARCHIVE_AFTER_DAYS
            )));
        }
        let mut names: Vec<&str> = self.providers.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(CoachError::Config("duplicate provider name".to_string()));
        }
        Ok(())
    }

    /// Enabled providers sorted by priority (stable for equal priorities)
    pub fn enabled_providers(&self) -> Vec<ProviderConfig> {
        let mut providers: Vec<ProviderConfig> = self
            .providers
            .iter()
            .filter(|p| p.enabled)
            .cloned()
            .collect();
        providers.sort_by_key(|p| p.priority);
        providers
    }
}
