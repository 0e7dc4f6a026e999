//! Application configuration management.
//!
//! Settings come from `~/.config/volunteerdash/config.json` (when present)
//! overlaid by environment variables. The Galaxy password is never written
//! to the config file; it comes from the environment or the OS keychain.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{FetchLimit, DEFAULT_BASE_URL};
use crate::auth::GalaxyCredentials;
use crate::cache::DEFAULT_MAX_AGE_DAYS;
use crate::geocode::{DEFAULT_GEOCODE_URL, DEFAULT_MAX_WORKERS};
use crate::snapshot::DEFAULT_SNAPSHOT_FILE;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "volunteerdash";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Subdirectory of the cache dir holding API responses
const RESPONSE_SUBDIR: &str = "api";

/// Volunteers fetched in test mode unless overridden
pub const DEFAULT_TEST_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub api_key: Option<String>,
    pub email: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
    pub geocode_api_key: Option<String>,
    pub geocode_url: String,
    pub cache_dir: Option<PathBuf>,
    pub cache_max_age_days: i64,
    pub use_cache: bool,
    pub test_mode: bool,
    pub test_limit: usize,
    pub geocode_workers: usize,
    pub snapshot_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            email: None,
            password: None,
            geocode_api_key: None,
            geocode_url: DEFAULT_GEOCODE_URL.to_string(),
            cache_dir: None,
            cache_max_age_days: DEFAULT_MAX_AGE_DAYS,
            use_cache: true,
            test_mode: false,
            test_limit: DEFAULT_TEST_LIMIT,
            geocode_workers: DEFAULT_MAX_WORKERS,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
        }
    }
}

impl Config {
    /// Config file (if any) overlaid by the process environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay settings from environment-style variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("GALAXY_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("GALAXY_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = get("GALAXY_EMAIL") {
            self.email = Some(v);
        }
        // Passwords may legitimately have surrounding spaces
        if let Some(v) = lookup("GALAXY_PASSWORD").filter(|v| !v.is_empty()) {
            self.password = Some(v);
        }
        if let Some(v) = get("GOOGLE_MAPS_API_KEY") {
            self.geocode_api_key = Some(v);
        }
        if let Some(v) = get("GEOCODE_BASE_URL") {
            self.geocode_url = v;
        }
        if let Some(v) = get("VOLUNTEERDASH_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CACHE_MAX_AGE_DAYS") {
            self.cache_max_age_days = v.parse().with_context(|| format!("Invalid CACHE_MAX_AGE_DAYS: {}", v))?;
        }
        if let Some(v) = get("USE_CACHE") {
            self.use_cache = parse_flag("USE_CACHE", &v)?;
        }
        if let Some(v) = get("TEST_MODE") {
            self.test_mode = parse_flag("TEST_MODE", &v)?;
        }
        if let Some(v) = get("TEST_LIMIT") {
            self.test_limit = v.parse().with_context(|| format!("Invalid TEST_LIMIT: {}", v))?;
        }
        if let Some(v) = get("GEOCODE_WORKERS") {
            self.geocode_workers = v.parse().with_context(|| format!("Invalid GEOCODE_WORKERS: {}", v))?;
        }
        if let Some(v) = get("SNAPSHOT_PATH") {
            self.snapshot_path = PathBuf::from(v);
        }
        Ok(())
    }

    /// Write settings to `path`. The password is skipped.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// API responses live below the cache dir so the session file is never
    /// mistaken for a cache entry.
    pub fn response_cache_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(RESPONSE_SUBDIR))
    }

    pub fn credentials(&self) -> GalaxyCredentials {
        GalaxyCredentials::new(
            self.api_key.clone().unwrap_or_default(),
            self.email.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        )
    }

    /// Cap on the volunteer fetch when test mode is on.
    pub fn fetch_limit(&self) -> Option<FetchLimit> {
        self.test_mode.then(|| FetchLimit::records(self.test_limit))
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Invalid {}: expected true/false, got {:?}", name, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url, "https://api.galaxydigital.com/api");
        assert_eq!(config.cache_max_age_days, 7);
        assert_eq!(config.test_limit, 10);
        assert_eq!(config.geocode_workers, 8);
        assert_eq!(config.snapshot_path, PathBuf::from("addresses.geojson"));
        assert!(config.use_cache);
        assert_eq!(config.fetch_limit(), None);
    }

    #[test]
    fn test_env_overlay() {
        let vars = env(&[
            ("GALAXY_API_KEY", "key"),
            ("GALAXY_EMAIL", " me@example.org "),
            ("GALAXY_PASSWORD", " pw "),
            ("CACHE_MAX_AGE_DAYS", "3"),
            ("USE_CACHE", "no"),
            ("TEST_MODE", "TRUE"),
            ("TEST_LIMIT", "25"),
            ("VOLUNTEERDASH_CACHE_DIR", "/tmp/vd"),
        ]);
        let mut config = Config::default();
        config.apply_env(|name| vars.get(name).cloned()).unwrap();

        assert_eq!(config.email.as_deref(), Some("me@example.org"));
        assert_eq!(config.password.as_deref(), Some(" pw "));
        assert_eq!(config.cache_max_age_days, 3);
        assert!(!config.use_cache);
        assert_eq!(config.fetch_limit(), Some(FetchLimit::records(25)));
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/vd"));
        assert_eq!(config.response_cache_dir().unwrap(), PathBuf::from("/tmp/vd/api"));
        assert!(config.credentials().missing().is_empty());
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = Config::default();
        let vars = env(&[("TEST_MODE", "maybe")]);
        assert!(config.apply_env(|name| vars.get(name).cloned()).is_err());

        let vars = env(&[("CACHE_MAX_AGE_DAYS", "week")]);
        assert!(config.apply_env(|name| vars.get(name).cloned()).is_err());
    }

    #[test]
    fn test_file_never_carries_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"email": "me@example.org", "password": "leak", "test_mode": true}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.email.as_deref(), Some("me@example.org"));
        assert_eq!(config.password, None);
        assert!(config.test_mode);
        assert_eq!(config.geocode_workers, 8);

        let mut with_password = config.clone();
        with_password.password = Some("secret".into());
        assert!(!serde_json::to_string(&with_password).unwrap().contains("secret"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.email = Some("me@example.org".into());
        config.password = Some("secret".into());
        config.test_limit = 3;
        config.save_to(&path).unwrap();

        assert!(!std::fs::read_to_string(&path).unwrap().contains("secret"));
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.email.as_deref(), Some("me@example.org"));
        assert_eq!(loaded.test_limit, 3);
        assert_eq!(loaded.password, None);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_from(&dir.path().join("none.json")).unwrap(), Config::default());
    }
}
