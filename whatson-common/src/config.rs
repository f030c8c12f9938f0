//! Configuration loading
//!
//! Both binaries read the same TOML file. Every key has a compiled default, so
//! an empty or missing file yields a working configuration.
//!
//! Config file resolution order:
//! 1. Path given on the command line (highest priority)
//! 2. `WHATSON_CONFIG` environment variable
//! 3. `~/.config/whatson/config.toml` (platform config dir) if it exists
//! 4. Compiled defaults

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{Error, ItemType, Platform, Result};

pub const CONFIG_ENV_VAR: &str = "WHATSON_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhatsonConfig {
    /// SQLite database file shared by ingest and api
    pub database_path: PathBuf,
    pub api: ApiConfig,
    pub query: QueryConfig,
    pub ingest: IngestConfig,
}

impl Default for WhatsonConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            api: ApiConfig::default(),
            query: QueryConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl WhatsonConfig {
    /// Resolve and load the configuration file
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.query.default_limit == 0 {
            return Err(Error::Config("query.default_limit must be positive".to_string()));
        }
        if self.query.showtimes_page_size == 0 {
            return Err(Error::Config("query.showtimes_page_size must be positive".to_string()));
        }
        if self.ingest.popularity.max_diff < 0.0 {
            return Err(Error::Config("ingest.popularity.max_diff must not be negative".to_string()));
        }
        Ok(())
    }
}

fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("whatson").join("config.toml"))
        .filter(|p| p.exists())
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("whatson").join("whatson.db"))
        .unwrap_or_else(|| PathBuf::from("./whatson.db"))
}

/// HTTP query service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
        }
    }
}

/// Query defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size when the request gives no `limit`
    pub default_limit: u32,
    /// Highest season count listed as an exact value; `seasons_number=N` with
    /// N at or above it means "N or more"
    pub max_seasons_number: u32,
    /// Showtimes listing prefix, completed with `{cinema_id}/d-0/p-{page}/`
    pub showtimes_base_url: String,
    /// Number of showtimes per listing page
    pub showtimes_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_seasons_number: 5,
            showtimes_base_url: "https://www.allocine.fr/_/showtimes/theater-".to_string(),
            showtimes_page_size: 15,
        }
    }
}

/// Ingest batch settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Prefix joined with the relative URLs of the ids file
    pub allocine_base_url: String,
    pub films_ids_path: PathBuf,
    pub series_ids_path: PathBuf,
    /// Popularity listing (`rank,url` per line) for movies
    pub films_popularity_url: Option<String>,
    /// Popularity listing (`rank,url` per line) for TV shows
    pub series_popularity_url: Option<String>,
    pub tmdb_base_url: String,
    /// TMDB adapter is only registered when a key is configured
    pub tmdb_api_key: Option<String>,
    /// Maximum TMDB requests per second
    pub tmdb_requests_per_second: u32,
    /// Attempts for a transiently failing fetch before it counts as one failure
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Platform whose details (title, image, trailer, seasons, status) win
    pub primary_details_source: Platform,
    /// Top-level document keys expected on stored items
    pub keys_to_check: Vec<String>,
    pub error_thresholds: ErrorThresholds,
    pub popularity: PopularityConfig,
    /// Third-party services probed before a run
    pub services: Vec<ServiceConfig>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allocine_base_url: "https://www.allocine.fr".to_string(),
            films_ids_path: PathBuf::from("./assets/films_ids.txt"),
            series_ids_path: PathBuf::from("./assets/series_ids.txt"),
            films_popularity_url: None,
            series_popularity_url: None,
            tmdb_base_url: "https://api.themoviedb.org/3".to_string(),
            tmdb_api_key: None,
            tmdb_requests_per_second: 20,
            retries: 3,
            retry_delay_ms: 3000,
            primary_details_source: Platform::Allocine,
            keys_to_check: default_keys_to_check(),
            error_thresholds: ErrorThresholds::default(),
            popularity: PopularityConfig::default(),
            services: Vec::new(),
        }
    }
}

impl IngestConfig {
    pub fn ids_path(&self, item_type: ItemType) -> &Path {
        match item_type {
            ItemType::Movie => &self.films_ids_path,
            ItemType::Tvshow => &self.series_ids_path,
        }
    }

    pub fn popularity_url(&self, item_type: ItemType) -> Option<&str> {
        match item_type {
            ItemType::Movie => self.films_popularity_url.as_deref(),
            ItemType::Tvshow => self.series_popularity_url.as_deref(),
        }
    }
}

fn default_keys_to_check() -> Vec<String> {
    [
        "_id",
        "id",
        "item_type",
        "is_active",
        "title",
        "image",
        "trailer",
        "release_date",
        "genres",
        "tagline",
        "seasons_number",
        "status",
        "ratings_average",
        "popularity_average",
        "updated_at",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

/// Consecutive-failure thresholds per source
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ErrorThresholds {
    pub default: u32,
    /// Per-source overrides keyed by adapter name
    pub overrides: HashMap<String, u32>,
}

impl Default for ErrorThresholds {
    fn default() -> Self {
        let mut overrides = HashMap::new();
        overrides.insert("rotten_tomatoes".to_string(), 10);
        Self {
            default: 5,
            overrides,
        }
    }
}

impl ErrorThresholds {
    pub fn for_source(&self, source: &str) -> u32 {
        self.overrides.get(source).copied().unwrap_or(self.default)
    }
}

/// Popularity cross-validation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PopularityConfig {
    pub primary: Platform,
    pub secondary: Platform,
    /// Largest rank difference at which both figures are averaged
    pub max_diff: f64,
}

impl Default for PopularityConfig {
    fn default() -> Self {
        Self {
            primary: Platform::Allocine,
            secondary: Platform::Imdb,
            max_diff: 50.0,
        }
    }
}

/// Third-party service probed by the preflight check
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
}
