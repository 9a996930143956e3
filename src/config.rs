use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::{
    Result,
    eyre::{OptionExt, WrapErr},
};
use serde::{Deserialize, Serialize};

use crate::services::catalog::{CatalogCredentials, RetryPolicy};

pub const APP_NAME: &str = "best-new-tracks";
const DEFAULT_LISTING_URL: &str = "https://pitchfork.com/reviews/best/tracks/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    pub database: String,
    /// Name stored with every scraped track.
    pub site_name: String,
    pub listing_url: String,
    pub fetch_workers: usize,
    pub request_timeout_secs: u64,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub max_attempts: usize,
    pub default_retry_after_secs: u64,
    /// Search result pages read per track before giving up.
    pub search_pages: u32,
    pub playlist_name: String,
    /// Existing playlists whose name contains this are reused.
    pub playlist_keyword: String,
    pub auth_session_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: format!("~/.local/share/{}/tracks.db", APP_NAME),
            site_name: "Pitchfork".to_string(),
            listing_url: DEFAULT_LISTING_URL.to_string(),
            fetch_workers: 8,
            request_timeout_secs: 10,
            catalog: CatalogConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            max_attempts: 10,
            default_retry_after_secs: 1,
            search_pages: 3,
            playlist_name: "Pitchfork Top Tracks".to_string(),
            playlist_keyword: "Pitchfork".to_string(),
            auth_session_ttl_secs: 600,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Default config file location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join(APP_NAME).join("config.toml"))
    }

    /// Load from `path`, or from the default location. A missing default file
    /// means all defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write a default config file, refusing to overwrite an existing one.
    pub fn create_default(path: &Path) -> Result<()> {
        if path.exists() {
            color_eyre::eyre::bail!("Config file already exists: {}", path.display());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents =
            toml::to_string_pretty(&Self::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Expand ~ to home directory
    fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    pub fn database_path(&self) -> PathBuf {
        Self::expand_path(&self.database)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.catalog.max_attempts,
            Duration::from_secs(self.catalog.default_retry_after_secs),
        )
    }

    /// Catalog app credentials, falling back to environment variables
    pub fn catalog_credentials(&self) -> Result<CatalogCredentials> {
        let value = |configured: &Option<String>, var: &str| {
            configured
                .clone()
                .or_else(|| std::env::var(var).ok())
                .filter(|value| !value.is_empty())
                .ok_or_eyre(format!("Set catalog credentials in the config file or {}", var))
        };

        Ok(CatalogCredentials::new(
            value(&self.catalog.client_id, "CATALOG_CLIENT_ID")?,
            value(&self.catalog.client_secret, "CATALOG_CLIENT_SECRET")?,
            value(&self.catalog.redirect_uri, "CATALOG_REDIRECT_URI")?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            database = "/tmp/tracks.db"
            fetch_workers = 2

            [catalog]
            client_id = "id"
            search_pages = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/tmp/tracks.db"));
        assert_eq!(config.fetch_workers, 2);
        assert_eq!(config.site_name, "Pitchfork");
        assert_eq!(config.catalog.client_id.as_deref(), Some("id"));
        assert_eq!(config.catalog.search_pages, 5);
        assert_eq!(config.catalog.max_attempts, 10);
        assert_eq!(config.catalog.playlist_keyword, "Pitchfork");
    }

    #[test]
    fn test_create_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_default(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.listing_url, DEFAULT_LISTING_URL);
        assert_eq!(loaded.catalog.auth_session_ttl_secs, 600);

        assert_err!(Config::create_default(&path));
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(Config::expand_path("~/x.db"), home.join("x.db"));
        }
        assert_eq!(Config::expand_path("/abs.db"), PathBuf::from("/abs.db"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let mut config = Config::default();
        config.catalog.max_attempts = 0;
        config.catalog.default_retry_after_secs = 3;

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.default_retry_after, Duration::from_secs(3));
    }
}
