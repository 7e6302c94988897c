//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-enricher\config.toml
//! - macOS: ~/Library/Application Support/music-enricher/config.toml
//! - Linux: ~/.config/music-enricher/config.toml
//!
//! The file provides defaults; values in the database `settings` table
//! (written by the management layer at runtime) take precedence. Both are
//! folded into an [`EnrichmentSettings`] handed to the orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::db::settings as keys;
use crate::enrichment::EnrichmentError;
use crate::enrichment::http::HttpSettings;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API credentials (keep separate for potential future encryption)
    pub credentials: Credentials,

    pub enrichment: EnrichmentConfig,

    /// MBID auto-search
    pub auto_search: AutoSearchConfig,

    /// Outbound HTTP limits
    pub http: HttpConfig,

    pub database: DatabaseConfig,
}

/// API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Last.fm API key (32 hex characters)
    pub lastfm_api_key: Option<String>,

    /// Fanart.tv personal API key
    pub fanart_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Enrich new entities automatically after a library scan
    pub auto_enrich_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSearchConfig {
    /// Search MusicBrainz for entities without an MBID
    pub enabled: bool,

    /// Minimum confidence (0.0 - 1.0, inclusive) for a search hit to count
    pub confidence_threshold: f64,

    /// Assign confident hits without review
    pub auto_apply: bool,
}

impl Default for AutoSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.85,
            auto_apply: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout
    pub timeout_secs: u64,

    /// Simultaneous requests allowed per provider
    pub max_concurrent_per_provider: usize,

    /// Minimum spacing between MusicBrainz requests (they allow 1 req/s)
    pub musicbrainz_min_interval_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_concurrent_per_provider: 2,
            musicbrainz_min_interval_ms: 1100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; `music_enricher.db` in the working directory if unset
    pub path: Option<PathBuf>,
}

// ============================================================================
// Orchestrator Settings
// ============================================================================

/// Auto-search behaviour, as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoSearchSettings {
    pub enabled: bool,
    pub confidence_threshold: f64,
    pub auto_apply: bool,
}

/// Everything the orchestrator needs, resolved from file + settings table.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentSettings {
    pub auto_enrich_enabled: bool,
    pub auto_search: AutoSearchSettings,
    pub lastfm_api_key: Option<String>,
    pub fanart_api_key: Option<String>,
    pub http: HttpSettings,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EnrichmentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auto_enrich_enabled: config.enrichment.auto_enrich_enabled,
            auto_search: AutoSearchSettings {
                enabled: config.auto_search.enabled,
                confidence_threshold: config.auto_search.confidence_threshold,
                auto_apply: config.auto_search.auto_apply,
            },
            lastfm_api_key: non_blank(config.credentials.lastfm_api_key.clone()),
            fanart_api_key: non_blank(config.credentials.fanart_api_key.clone()),
            http: HttpSettings {
                timeout: Duration::from_secs(config.http.timeout_secs),
                max_concurrent_per_provider: config.http.max_concurrent_per_provider,
                musicbrainz_min_interval: Duration::from_millis(
                    config.http.musicbrainz_min_interval_ms,
                ),
            },
        }
    }

    /// Apply values stored in the settings table.
    ///
    /// Unparseable values are logged and skipped.
    pub async fn overlay_from_db(mut self, pool: &SqlitePool) -> Result<Self, EnrichmentError> {
        if let Some(v) = keys::get_setting(pool, keys::AUTO_ENRICH_ENABLED).await? {
            overlay_parsed(&mut self.auto_enrich_enabled, keys::AUTO_ENRICH_ENABLED, &v);
        }
        if let Some(v) = keys::get_setting(pool, keys::LASTFM_API_KEY).await? {
            self.lastfm_api_key = non_blank(Some(v));
        }
        if let Some(v) = keys::get_setting(pool, keys::FANART_API_KEY).await? {
            self.fanart_api_key = non_blank(Some(v));
        }
        if let Some(v) = keys::get_setting(pool, keys::AUTO_SEARCH_ENABLED).await? {
            overlay_parsed(&mut self.auto_search.enabled, keys::AUTO_SEARCH_ENABLED, &v);
        }
        if let Some(v) = keys::get_setting(pool, keys::AUTO_SEARCH_THRESHOLD).await? {
            overlay_parsed(
                &mut self.auto_search.confidence_threshold,
                keys::AUTO_SEARCH_THRESHOLD,
                &v,
            );
        }
        if let Some(v) = keys::get_setting(pool, keys::AUTO_SEARCH_AUTO_APPLY).await? {
            overlay_parsed(&mut self.auto_search.auto_apply, keys::AUTO_SEARCH_AUTO_APPLY, &v);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), EnrichmentError> {
        let threshold = self.auto_search.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(EnrichmentError::Validation(format!(
                "confidence threshold must be between 0 and 1, got {}",
                threshold
            )));
        }
        if self.http.timeout.is_zero() {
            return Err(EnrichmentError::Validation(
                "HTTP timeout must be greater than zero".to_string(),
            ));
        }
        if self.http.max_concurrent_per_provider == 0 {
            return Err(EnrichmentError::Validation(
                "max_concurrent_per_provider must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn overlay_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, raw: &str) {
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = raw, "Ignoring unparseable setting"),
    }
}

// ============================================================================
// API Key Validation
// ============================================================================

/// Result of a format-only key check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValidation {
    pub valid: bool,
    pub message: String,
}

impl KeyValidation {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

const LASTFM_KEY_LEN: usize = 32;
const FANART_KEY_MIN_LEN: usize = 20;

/// Check that a provider API key looks right. Does not contact the provider.
pub fn validate_provider_api_key(service: &str, key: &str) -> Result<KeyValidation, EnrichmentError> {
    let key = key.trim();

    match service.trim().to_ascii_lowercase().as_str() {
        "lastfm" | "last.fm" => Ok(if key.is_empty() {
            KeyValidation::invalid("Last.fm API key is empty")
        } else if key.len() != LASTFM_KEY_LEN {
            KeyValidation::invalid(format!(
                "Last.fm API keys are exactly {} characters (got {})",
                LASTFM_KEY_LEN,
                key.len()
            ))
        } else if !key.chars().all(|c| c.is_ascii_hexdigit()) {
            KeyValidation::invalid("Last.fm API keys contain only hexadecimal characters")
        } else {
            KeyValidation::ok("Last.fm API key format looks valid")
        }),
        "fanart" | "fanart.tv" | "fanarttv" => Ok(if key.is_empty() {
            KeyValidation::invalid("Fanart.tv API key is empty")
        } else if key.len() < FANART_KEY_MIN_LEN {
            KeyValidation::invalid(format!(
                "Fanart.tv API keys are at least {} characters (got {})",
                FANART_KEY_MIN_LEN,
                key.len()
            ))
        } else if !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            KeyValidation::invalid("Fanart.tv API keys contain only letters and digits")
        } else {
            KeyValidation::ok("Fanart.tv API key format looks valid")
        }),
        other => Err(EnrichmentError::Validation(format!(
            "unknown service '{}', expected lastfm or fanart",
            other
        ))),
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-enricher"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a specific file, falling back to defaults.
pub fn load_from(path: &std::path::Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &dir.join("config.toml"))
}

/// Save configuration to a specific file.
pub fn save_to(config: &Config, path: &std::path::Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
