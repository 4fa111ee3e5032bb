//! Configuration file parser for `feedcast.toml`.
//!
//! The file holds named profiles under `[profiles.<name>]`. A run selects one
//! profile, which is resolved into a typed [`Config`] at load time: URLs are
//! parsed, the article selector is compiled once, and the timeout is checked.
//! Any problem is a [`ConfigError`] and aborts the process before pipeline work.
use scraper::Selector;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable that overrides the profile's `access_token`.
pub const ACCESS_TOKEN_ENV: &str = "FEEDCAST_ACCESS_TOKEN";

/// Default article body selector.
pub const DEFAULT_ARTICLE_SELECTOR: &str = ".topic-nfo";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Profile '{profile}' not found in config file (available: {available})")]
    UnknownProfile { profile: String, available: String },

    #[error("Profile '{profile}' is missing required key '{key}'")]
    MissingValue { profile: String, key: &'static str },

    #[error("Profile '{profile}' has an invalid '{key}': {reason}")]
    InvalidValue {
        profile: String,
        key: &'static str,
        reason: String,
    },
}

// ============================================================================
// File Schema
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    profiles: HashMap<String, RawProfile>,
}

/// One `[profiles.<name>]` table as written in the file.
#[derive(Default, Deserialize)]
#[serde(default)]
struct RawProfile {
    feed_url: Option<String>,
    publish_url: Option<String>,
    access_token: Option<String>,
    database: Option<String>,
    request_timeout_secs: Option<u64>,
    article_selector: Option<String>,
}

impl std::fmt::Debug for RawProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawProfile")
            .field("feed_url", &self.feed_url)
            .field("publish_url", &self.publish_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("database", &self.database)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("article_selector", &self.article_selector)
            .finish()
    }
}

const KNOWN_KEYS: [&str; 6] = [
    "feed_url",
    "publish_url",
    "access_token",
    "database",
    "request_timeout_secs",
    "article_selector",
];

// ============================================================================
// Resolved Configuration
// ============================================================================

/// Settings for one pipeline run, resolved from a named profile.
///
/// Custom Debug impl masks `access_token`.
pub struct Config {
    /// Name of the profile this was resolved from
    pub profile: String,
    /// Syndication feed to poll
    pub feed_url: Url,
    /// Endpoint receiving the multipart publish POST
    pub publish_url: Url,
    pub access_token: SecretString,
    /// SQLite database file
    pub database: PathBuf,
    /// Bound applied to every outbound request
    pub request_timeout: Duration,
    /// CSS selector of the article body on source pages
    pub article_selector: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("profile", &self.profile)
            .field("feed_url", &self.feed_url.as_str())
            .field("publish_url", &self.publish_url.as_str())
            .field("access_token", &"[REDACTED]")
            .field("database", &self.database)
            .field("request_timeout", &self.request_timeout)
            .field("article_selector", &self.article_selector)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load `profile` from the TOML file at `path`.
    ///
    /// `FEEDCAST_ACCESS_TOKEN`, when set and non-empty, takes precedence over
    /// the file's `access_token`.
    pub fn load(path: &Path, profile: &str) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        let env_token = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());

        let config = Self::parse(&content, profile, env_token)?;
        tracing::info!(
            path = %path.display(),
            profile = %config.profile,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Resolve `profile` from TOML text. `token_override` replaces the
    /// file's `access_token` when present.
    pub fn parse(
        content: &str,
        profile: &str,
        token_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        warn_unknown_keys(content);

        let mut file: ConfigFile = toml::from_str(content)?;
        let raw = match file.profiles.remove(profile) {
            Some(raw) => raw,
            None => {
                let mut names: Vec<&str> = file.profiles.keys().map(String::as_str).collect();
                names.sort_unstable();
                return Err(ConfigError::UnknownProfile {
                    profile: profile.to_string(),
                    available: if names.is_empty() {
                        "none".to_string()
                    } else {
                        names.join(", ")
                    },
                });
            }
        };

        resolve(profile, raw, token_override)
    }
}

fn resolve(
    profile: &str,
    raw: RawProfile,
    token_override: Option<String>,
) -> Result<Config, ConfigError> {
    let missing = |key| ConfigError::MissingValue {
        profile: profile.to_string(),
        key,
    };
    let invalid = |key, reason: String| ConfigError::InvalidValue {
        profile: profile.to_string(),
        key,
        reason,
    };

    let feed_url = parse_http_url(required(raw.feed_url).ok_or_else(|| missing("feed_url"))?)
        .map_err(|reason| invalid("feed_url", reason))?;
    let publish_url =
        parse_http_url(required(raw.publish_url).ok_or_else(|| missing("publish_url"))?)
            .map_err(|reason| invalid("publish_url", reason))?;
    let access_token = token_override
        .or_else(|| required(raw.access_token))
        .ok_or_else(|| missing("access_token"))?;
    let database = required(raw.database).ok_or_else(|| missing("database"))?;

    let timeout_secs = raw
        .request_timeout_secs
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(invalid(
            "request_timeout_secs",
            "must be greater than zero".to_string(),
        ));
    }

    let article_selector =
        required(raw.article_selector).unwrap_or_else(|| DEFAULT_ARTICLE_SELECTOR.to_string());
    Selector::parse(&article_selector)
        .map_err(|e| invalid("article_selector", e.to_string()))?;

    Ok(Config {
        profile: profile.to_string(),
        feed_url,
        publish_url,
        access_token: SecretString::from(access_token),
        database: PathBuf::from(database),
        request_timeout: Duration::from_secs(timeout_secs),
        article_selector,
    })
}

/// Treat blank strings as absent.
fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_http_url(value: String) -> Result<Url, String> {
    let url = Url::parse(&value).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(format!("unsupported scheme '{scheme}' (only http/https)")),
    }
}

/// Log keys inside profile tables that the schema does not know.
fn warn_unknown_keys(content: &str) {
    let Ok(raw) = content.parse::<toml::Table>() else {
        return;
    };
    for key in raw.keys().filter(|k| k.as_str() != "profiles") {
        tracing::warn!(key = %key, "Unknown top-level key in config file, ignoring");
    }
    let Some(profiles) = raw.get("profiles").and_then(|p| p.as_table()) else {
        return;
    };
    for (name, table) in profiles {
        let Some(table) = table.as_table() else {
            continue;
        };
        for key in table.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::warn!(profile = %name, key = %key, "Unknown key in config profile, ignoring");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
