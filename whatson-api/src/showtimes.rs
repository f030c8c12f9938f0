//! Cinema showtimes lookup
//!
//! Resolves a cinema id to the AlloCiné ids of the movies it currently shows.
//! The listing is paged; pages are fetched until one comes back short.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// Upper bound on listing pages fetched for one cinema
const MAX_PAGES: u32 = 50;

#[async_trait]
pub trait ShowtimesProvider: Send + Sync {
    async fn movie_ids(&self, cinema_id: &str) -> ApiResult<Vec<i64>>;
}

#[derive(Debug, Deserialize)]
struct ShowtimesPage {
    #[serde(default)]
    results: Vec<ShowtimesEntry>,
}

#[derive(Debug, Deserialize)]
struct ShowtimesEntry {
    movie: Option<ShowtimesMovie>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShowtimesMovie {
    internal_id: i64,
}

/// AlloCiné JSON showtimes listing
pub struct AllocineShowtimes {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl AllocineShowtimes {
    pub fn new(base_url: &str, page_size: usize) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            page_size,
        })
    }

    async fn fetch_page(&self, cinema_id: &str, page: u32) -> ApiResult<ShowtimesPage> {
        let url = format!("{}{}/d-0/p-{}/", self.base_url, cinema_id, page);
        debug!(url = %url, "Fetching showtimes page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Showtimes request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "Showtimes listing returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Invalid showtimes listing: {}", e)))
    }
}

/// Cinema ids are interpolated into the listing URL
fn validate_cinema_id(cinema_id: &str) -> ApiResult<()> {
    if cinema_id.is_empty() || !cinema_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::BadRequest(format!("Invalid cinema id: {}", cinema_id)));
    }
    Ok(())
}

#[async_trait]
impl ShowtimesProvider for AllocineShowtimes {
    async fn movie_ids(&self, cinema_id: &str) -> ApiResult<Vec<i64>> {
        validate_cinema_id(cinema_id)?;

        let mut ids = Vec::new();
        for page in 1..=MAX_PAGES {
            let listing = self.fetch_page(cinema_id, page).await?;
            let count = listing.results.len();

            for id in listing.results.into_iter().filter_map(|r| r.movie).map(|m| m.internal_id) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }

            if count < self.page_size {
                break;
            }
        }

        debug!(cinema_id = %cinema_id, movies = ids.len(), "Resolved showtimes");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cinema_id_validation() {
        assert!(validate_cinema_id("C0159").is_ok());
        assert!(validate_cinema_id("").is_err());
        assert!(validate_cinema_id("C0159/../x").is_err());
    }

    #[test]
    fn test_listing_shape() {
        let page: ShowtimesPage = serde_json::from_value(serde_json::json!({
            "results": [
                {"movie": {"internalId": 27405, "title": "Les Évadés"}},
                {"movie": null},
                {"other": true}
            ]
        }))
        .unwrap();

        let ids: Vec<i64> = page.results.into_iter().filter_map(|r| r.movie).map(|m| m.internal_id).collect();
        assert_eq!(ids, vec![27405]);
    }
}
