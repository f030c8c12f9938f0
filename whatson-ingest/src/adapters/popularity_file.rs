//! Popularity listing adapter
//!
//! The listing is a remote text file with one `rank,url` pair per line, most
//! popular first. It is downloaded once per run; a title's popularity is the
//! rank of the first line mentioning its URL.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use whatson_common::models::SourceRating;
use whatson_common::Platform;

use super::{AdapterResult, Observation, SourceAdapter};
use crate::error::AdapterError;
use crate::ids_file::TitleReference;

/// Lines inspected by the sanity check
const SANITY_CHECK_LINES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct PopularityEntry {
    pub rank: f64,
    pub url: String,
}

pub struct PopularityFileAdapter {
    name: String,
    platform: Platform,
    client: reqwest::Client,
    url: String,
    entries: OnceCell<Vec<PopularityEntry>>,
}

impl PopularityFileAdapter {
    pub fn new(platform: Platform, url: &str) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AdapterError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: format!("{}_popularity", platform.as_str()),
            platform,
            client,
            url: url.to_string(),
            entries: OnceCell::new(),
        })
    }

    async fn entries(&self) -> Result<&[PopularityEntry], AdapterError> {
        let entries = self
            .entries
            .get_or_try_init(|| async {
                let response = self.client.get(&self.url).send().await?;
                if !response.status().is_success() {
                    return Err(AdapterError::Status {
                        status: response.status().as_u16(),
                    });
                }
                let content = response.text().await?;
                let entries = parse_listing(&content)?;
                info!(url = %self.url, entries = entries.len(), "Loaded popularity listing");
                Ok::<_, AdapterError>(entries)
            })
            .await?;

        Ok(entries.as_slice())
    }
}

/// Parse a listing, rejecting files whose head does not look like title pages
pub fn parse_listing(content: &str) -> Result<Vec<PopularityEntry>, AdapterError> {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

    if lines.is_empty() {
        return Err(AdapterError::Invalid("Popularity listing is empty".to_string()));
    }
    if !lines.iter().take(SANITY_CHECK_LINES).all(|l| l.contains(".html")) {
        return Err(AdapterError::Invalid(
            "Popularity listing does not reference title pages".to_string(),
        ));
    }

    let entries = lines
        .iter()
        .filter_map(|line| {
            let (rank, url) = line.split_once(',')?;
            Some(PopularityEntry {
                rank: rank.trim().parse().ok()?,
                url: url.trim().to_string(),
            })
        })
        .collect();

    Ok(entries)
}

/// Rank of the first entry mentioning `relative_url`
pub fn rank_of(entries: &[PopularityEntry], relative_url: &str) -> Option<f64> {
    entries
        .iter()
        .find(|e| e.url.contains(relative_url))
        .map(|e| e.rank)
}

#[async_trait]
impl SourceAdapter for PopularityFileAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, reference: &TitleReference) -> AdapterResult {
        let entries = match self.entries().await {
            Ok(entries) => entries,
            Err(e) => return AdapterResult::Failed(e),
        };

        match rank_of(entries, &reference.relative_url) {
            Some(rank) => {
                debug!(url = %reference.relative_url, rank, "Popularity rank found");
                AdapterResult::Observed(Observation {
                    rating: SourceRating {
                        popularity: Some(rank),
                        ..Default::default()
                    },
                    details: None,
                })
            }
            None => AdapterResult::NotApplicable,
        }
    }
}
