// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Content kinds understood by the addon protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
    Anime,
    Channel,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Movie,
        ContentType::Series,
        ContentType::Anime,
        ContentType::Channel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Series => "series",
            ContentType::Anime => "anime",
            ContentType::Channel => "channel",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    #[default]
    None,
    GenericProxy,
    Mediaflow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub id: String,
    #[serde(alias = "domain")]
    pub base_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub proxy_mode: ProxyMode,
    /// Fetch listing and search pages through the relay instead of directly.
    #[serde(default, alias = "proxy_for_manifest")]
    pub proxy_pages: bool,
    #[serde(default = "default_content_types", alias = "types")]
    pub content_types: BTreeSet<ContentType>,
}

impl SiteConfig {
    pub fn serves(&self, content_type: ContentType) -> bool {
        self.content_types.contains(&content_type)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Forward proxy used by `generic_proxy` sites.
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default, alias = "mediaflow")]
    pub mediaflow_url: Option<String>,
    #[serde(default)]
    pub mediaflow_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_tmdb_base")]
    pub base_url: String,
    #[serde(default = "default_tmdb_image_base")]
    pub image_base: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_tmdb_base(),
            image_base: default_tmdb_image_base(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Requests per second per client address; 0 disables the limiter.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,
    #[serde(default)]
    pub reload_each_request: bool,
    #[serde(default = "default_catalog_limit")]
    pub catalog_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            rate_limit_per_second: default_rate_limit(),
            reload_each_request: false,
            catalog_limit: default_catalog_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, alias = "domains")]
    pub sites: Vec<SiteConfig>,
    #[serde(default, alias = "Proxy_Settings")]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub tmdb: TmdbConfig,
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_true() -> bool {
    true
}

fn default_content_types() -> BTreeSet<ContentType> {
    BTreeSet::from([ContentType::Movie, ContentType::Series])
}

fn default_tmdb_base() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_image_base() -> String {
    "https://image.tmdb.org/t/p/w500".to_string()
}

fn default_language() -> String {
    "it-IT".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_accept_language() -> String {
    "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_rate_limit() -> u32 {
    10
}

fn default_catalog_limit() -> usize {
    50
}

impl Config {
    /// An example document for `init-config`.
    pub fn example() -> Self {
        Self {
            sites: vec![
                SiteConfig {
                    id: "CB01".to_string(),
                    base_url: "https://cb01.example".to_string(),
                    enabled: true,
                    proxy_mode: ProxyMode::None,
                    proxy_pages: false,
                    content_types: default_content_types(),
                },
                SiteConfig {
                    id: "AW".to_string(),
                    base_url: "https://animeworld.example".to_string(),
                    enabled: false,
                    proxy_mode: ProxyMode::Mediaflow,
                    proxy_pages: false,
                    content_types: BTreeSet::from([ContentType::Anime]),
                },
            ],
            proxy: ProxySettings {
                http_proxy: None,
                mediaflow_url: Some("https://mediaflow.example".to_string()),
                mediaflow_password: Some("change-me".to_string()),
            },
            ..Self::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = if is_toml(path) {
            Self::from_toml(&content)?
        } else {
            Self::from_json(&content)?
        };

        debug!(
            "Loaded {} site(s) from {}",
            config.sites.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        use anyhow::Context;

        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?
        } else {
            serde_json::to_string_pretty(self)
                .with_context(|| "Failed to serialize config to JSON")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for site in &self.sites {
            if site.id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "site with base URL '{}' has an empty id",
                    site.base_url
                )));
            }
            match url::Url::parse(&site.base_url) {
                Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "site '{}' has an invalid base URL '{}'",
                        site.id, site.base_url
                    )));
                }
            }
        }

        for (key, value) in [
            ("proxy.http_proxy", &self.proxy.http_proxy),
            ("proxy.mediaflow_url", &self.proxy.mediaflow_url),
        ] {
            if let Some(v) = value {
                url::Url::parse(v)
                    .map_err(|e| ConfigError::Invalid(format!("{key} '{v}': {e}")))?;
            }
        }

        Ok(())
    }

    pub fn enabled_sites(&self) -> impl Iterator<Item = &SiteConfig> {
        self.sites.iter().filter(|s| s.enabled)
    }

    pub fn site(&self, id: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

/// Resolves the config file location: explicit flag, then `STREAMSCOUT_CONFIG`,
/// then `./config.json`, then the user config directory.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Ok(path) = std::env::var("STREAMSCOUT_CONFIG") {
        return PathBuf::from(path);
    }
    let local = PathBuf::from("config.json");
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|p| p.join("streamscout").join("config.json"))
        .unwrap_or(local)
}

/// Listen address: `--bind`, then `PORT` on all interfaces, then `server.bind`.
pub fn resolve_bind(explicit: Option<String>, port: Option<String>, configured: &str) -> String {
    if let Some(bind) = explicit.filter(|b| !b.trim().is_empty()) {
        return bind;
    }
    match port.as_deref().map(str::trim).map(str::parse::<u16>) {
        Some(Ok(port)) => format!("0.0.0.0:{}", port),
        Some(Err(_)) => {
            warn!("Ignoring invalid PORT value, using {}", configured);
            configured.to_string()
        }
        None => configured.to_string(),
    }
}

/// Holds the current configuration. Readers get an immutable snapshot; a
/// reload swaps the whole document.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let config = Config::load(&path)?;
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn from_config(path: PathBuf, config: Config) -> Self {
        Self {
            path,
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Re-reads the document. On failure the previous configuration stays.
    pub fn reload(&self) -> Result<Arc<Config>, ConfigError> {
        let config = Arc::new(Config::load(&self.path)?);
        match self.current.write() {
            Ok(mut guard) => *guard = config.clone(),
            Err(poisoned) => *poisoned.into_inner() = config.clone(),
        }
        info!("Reloaded configuration from {}", self.path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_json_with_defaults() {
        let config = Config::from_json(
            r#"{"sites": [{"id": "CB01", "base_url": "https://cb01.test"}]}"#,
        )
        .unwrap();

        let site = &config.sites[0];
        assert!(site.enabled);
        assert_eq!(site.proxy_mode, ProxyMode::None);
        assert!(site.serves(ContentType::Movie));
        assert!(!site.serves(ContentType::Channel));
        assert_eq!(config.scraping.timeout_secs, 10);
        assert_eq!(config.server.catalog_limit, 50);
    }

    #[test]
    fn accepts_legacy_key_names() {
        let config = Config::from_json(
            r#"{
                "domains": [{"id": "SW", "domain": "https://sw.test", "proxy_for_manifest": true}],
                "Proxy_Settings": {"mediaflow": "https://relay.test", "mediaflow_password": "pw"}
            }"#,
        )
        .unwrap();

        assert!(config.sites[0].proxy_pages);
        assert_eq!(config.proxy.mediaflow_url.as_deref(), Some("https://relay.test"));
    }

    #[test]
    fn parses_toml_document() {
        let config = Config::from_toml(
            r#"
            [[sites]]
            id = "AW"
            base_url = "https://aw.test"
            proxy_mode = "mediaflow"
            content_types = ["anime"]
            "#,
        )
        .unwrap();

        assert_eq!(config.sites[0].proxy_mode, ProxyMode::Mediaflow);
        assert!(config.sites[0].serves(ContentType::Anime));
    }

    #[test]
    fn rejects_relative_base_url() {
        let err = Config::from_json(r#"{"sites": [{"id": "X", "base_url": "/relative"}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_document() {
        assert!(matches!(
            Config::from_json("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load("/nonexistent/streamscout.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn bind_prefers_flag_then_port_env() {
        let configured = "0.0.0.0:8080";
        assert_eq!(
            resolve_bind(Some("127.0.0.1:9000".into()), Some("7000".into()), configured),
            "127.0.0.1:9000"
        );
        assert_eq!(resolve_bind(None, Some("7000".into()), configured), "0.0.0.0:7000");
        assert_eq!(resolve_bind(None, Some("nope".into()), configured), configured);
        assert_eq!(resolve_bind(None, None, configured), configured);
    }

    #[test]
    fn store_reload_swaps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"sites": []}"#).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        assert!(store.snapshot().sites.is_empty());

        fs::write(
            &path,
            r#"{"sites": [{"id": "CB01", "base_url": "https://cb01.test"}]}"#,
        )
        .unwrap();
        store.reload().unwrap();
        assert_eq!(store.snapshot().sites.len(), 1);

        fs::write(&path, "garbage").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.snapshot().sites.len(), 1);
    }

    #[test]
    fn example_round_trips_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::example().save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.sites.len(), 2);
    }
}
