//! Configuration management for Gallerycast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

pub const DEFAULT_FEED_URL: &str = "https://api.imgur.com/3/gallery/top/top/0.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub gallery: GalleryConfig,
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryConfig {
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    pub client_id: String,
    #[serde(default = "default_http_timeout")]
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    pub instance: String,
    pub token_file: String,
    #[serde(default = "default_posting_timeout")]
    pub timeout: String,
}

/// Knobs for the process cycle. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Skip posting while fewer calls than this remain
    pub quota_floor: u32,
    pub lease_size: usize,
    pub visibility_timeout: String,
    /// Pause after a failed post
    pub cooldown: String,
    /// How long a published item stays in the seen cache
    pub seen_ttl: String,
    pub max_media_bytes: u64,
    pub media_timeout: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            quota_floor: 100,
            lease_size: 20,
            visibility_timeout: "30s".to_string(),
            cooldown: "15m".to_string(),
            seen_ttl: "72h".to_string(),
            max_media_bytes: 3_000_000,
            media_timeout: default_http_timeout(),
        }
    }
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_http_timeout() -> String {
    "10s".to_string()
}

fn default_posting_timeout() -> String {
    "30s".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load, apply environment overrides, and validate
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without touching the environment or validating
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// `GALLERYCAST_CLIENT_ID` and `GALLERYCAST_DB_PATH` take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(client_id) = std::env::var("GALLERYCAST_CLIENT_ID") {
            if !client_id.trim().is_empty() {
                self.gallery.client_id = client_id;
            }
        }
        if let Ok(path) = std::env::var("GALLERYCAST_DB_PATH") {
            if !path.trim().is_empty() {
                self.database.path = path;
            }
        }
    }

    /// Reject values that would only fail later, mid-cycle
    pub fn validate(&self) -> Result<()> {
        if self.gallery.client_id.trim().is_empty() {
            return Err(ConfigError::MissingField("gallery.client_id".to_string()).into());
        }
        if self.mastodon.instance.trim().is_empty() {
            return Err(ConfigError::MissingField("mastodon.instance".to_string()).into());
        }
        if self.processing.lease_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "processing.lease_size".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }

        self.gallery.timeout()?;
        self.mastodon.timeout()?;
        self.processing.visibility_timeout()?;
        self.processing.cooldown()?;
        self.processing.seen_ttl()?;
        self.processing.media_timeout()?;

        Ok(())
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/gallerycast/gallerycast.db".to_string(),
            },
            gallery: GalleryConfig {
                feed_url: default_feed_url(),
                client_id: String::new(),
                timeout: default_http_timeout(),
            },
            mastodon: MastodonConfig {
                instance: "https://mastodon.social".to_string(),
                token_file: "~/.config/gallerycast/mastodon.token".to_string(),
                timeout: default_posting_timeout(),
            },
            processing: ProcessingConfig::default(),
        }
    }
}

impl GalleryConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration("gallery.timeout", &self.timeout)
    }
}

impl MastodonConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration("mastodon.timeout", &self.timeout)
    }
}

impl ProcessingConfig {
    pub fn visibility_timeout(&self) -> Result<Duration> {
        parse_duration("processing.visibility_timeout", &self.visibility_timeout)
    }

    pub fn cooldown(&self) -> Result<Duration> {
        parse_duration("processing.cooldown", &self.cooldown)
    }

    pub fn seen_ttl(&self) -> Result<Duration> {
        parse_duration("processing.seen_ttl", &self.seen_ttl)
    }

    pub fn media_timeout(&self) -> Result<Duration> {
        parse_duration("processing.media_timeout", &self.media_timeout)
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' is not a duration ({})", value, e),
        }
        .into()
    })
}

/// Resolve the configuration file path following the XDG Base Directory layout
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("GALLERYCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("gallerycast").join("config.toml"))
}
