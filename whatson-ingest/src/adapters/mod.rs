//! Source adapters
//!
//! Each adapter observes one title on one platform. Adapters never fail the
//! batch themselves: failures are reported as `AdapterResult::Failed` and the
//! guard decides when enough is enough.

pub mod popularity_file;
pub mod tmdb;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use whatson_common::config::IngestConfig;
use whatson_common::models::SourceRating;
use whatson_common::{ItemType, Platform, Status};

use crate::error::AdapterError;
use crate::ids_file::TitleReference;

pub use popularity_file::PopularityFileAdapter;
pub use tmdb::TmdbAdapter;

/// Descriptive fields a platform may supply alongside its ratings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleDetails {
    pub title: Option<String>,
    pub image: Option<String>,
    pub trailer_url: Option<String>,
    pub seasons_number: Option<u32>,
    pub status: Option<Status>,
    /// `YYYY-MM-DD`; first air date for TV shows
    pub release_date: Option<String>,
    pub genres: Option<Vec<String>>,
    pub tagline: Option<String>,
}

/// What one adapter saw for one title
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub rating: SourceRating,
    pub details: Option<TitleDetails>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdapterResult {
    Observed(Observation),
    /// The platform has nothing for this title; counts as success
    NotApplicable,
    Failed(AdapterError),
}

impl AdapterResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, AdapterResult::Failed(_))
    }
}

impl From<Result<AdapterResult, AdapterError>> for AdapterResult {
    fn from(result: Result<AdapterResult, AdapterError>) -> Self {
        result.unwrap_or_else(AdapterResult::Failed)
    }
}

/// Uniform interface over rating platforms
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Name used for failure accounting and thresholds
    fn name(&self) -> &str {
        self.platform().as_str()
    }

    /// Platform the observation is filed under
    fn platform(&self) -> Platform;

    async fn fetch(&self, reference: &TitleReference) -> AdapterResult;
}

/// Adapters available for `item_type` under the given configuration
pub fn build_adapters(
    config: &IngestConfig,
    item_type: ItemType,
) -> Result<Vec<Arc<dyn SourceAdapter>>, AdapterError> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if let Some(api_key) = &config.tmdb_api_key {
        adapters.push(Arc::new(TmdbAdapter::new(
            &config.tmdb_base_url,
            api_key,
            config.tmdb_requests_per_second,
        )?));
    }

    if let Some(url) = config.popularity_url(item_type) {
        adapters.push(Arc::new(PopularityFileAdapter::new(
            config.popularity.primary,
            url,
        )?));
    }

    info!(
        item_type = %item_type,
        adapters = ?adapters.iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
        "Source adapters configured"
    );

    Ok(adapters)
}
