//! The Movie Database adapter
//!
//! Supplies the TMDB users rating (0..10), title, poster, trailer, genres,
//! release date and tagline. TV shows also get season count and broadcast status.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;
use whatson_common::models::{SourceId, SourceRating};
use whatson_common::{ItemType, Platform, Status};

use super::{AdapterResult, Observation, SourceAdapter, TitleDetails};
use crate::error::AdapterError;
use crate::ids_file::TitleReference;

const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

#[derive(Debug, Deserialize)]
struct TmdbTitle {
    id: i64,
    /// Movies
    title: Option<String>,
    /// TV shows
    name: Option<String>,
    poster_path: Option<String>,
    vote_average: Option<f64>,
    #[serde(default)]
    vote_count: u64,
    status: Option<String>,
    number_of_seasons: Option<u32>,
    /// Movies
    release_date: Option<String>,
    /// TV shows
    first_air_date: Option<String>,
    tagline: Option<String>,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    #[serde(default)]
    videos: TmdbVideos,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct TmdbVideos {
    #[serde(default)]
    results: Vec<TmdbVideo>,
}

#[derive(Debug, Deserialize)]
struct TmdbVideo {
    key: String,
    site: String,
    #[serde(rename = "type")]
    kind: String,
}

pub struct TmdbAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl TmdbAdapter {
    pub fn new(base_url: &str, api_key: &str, requests_per_second: u32) -> Result<Self, AdapterError> {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));

        let client = reqwest::Client::builder()
            .user_agent(concat!("whatson/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AdapterError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    async fn fetch_title(&self, reference: &TitleReference, tmdb_id: i64) -> Result<AdapterResult, AdapterError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}/{}", self.base_url, path_segment(reference.item_type), tmdb_id);
        debug!(url = %url, "Fetching TMDB title");

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("append_to_response", "videos")])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(AdapterResult::NotApplicable);
        }
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
            });
        }

        let title: TmdbTitle = response.json().await?;
        Ok(AdapterResult::Observed(observation(reference.item_type, title)))
    }
}

#[async_trait]
impl SourceAdapter for TmdbAdapter {
    fn platform(&self) -> Platform {
        Platform::Tmdb
    }

    async fn fetch(&self, reference: &TitleReference) -> AdapterResult {
        let Some(tmdb_id) = reference.tmdb_id else {
            return AdapterResult::NotApplicable;
        };
        self.fetch_title(reference, tmdb_id).await.into()
    }
}

fn path_segment(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Movie => "movie",
        ItemType::Tvshow => "tv",
    }
}

/// TMDB TV status label to broadcast status
pub fn tv_status(label: &str) -> Status {
    match label {
        "Returning Series" => Status::Ongoing,
        "Ended" => Status::Ended,
        "Canceled" | "Cancelled" => Status::Canceled,
        "In Production" | "Planned" => Status::Soon,
        "Pilot" => Status::Pilot,
        _ => Status::Unknown,
    }
}

fn observation(item_type: ItemType, title: TmdbTitle) -> Observation {
    let trailer_url = title
        .videos
        .results
        .iter()
        .find(|v| v.site == "YouTube" && v.kind == "Trailer")
        .map(|v| format!("https://www.youtube.com/watch?v={}", v.key));

    let (seasons_number, status) = match item_type {
        ItemType::Movie => (None, None),
        ItemType::Tvshow => (title.number_of_seasons, title.status.as_deref().map(tv_status)),
    };

    // TMDB sends "" for unknown dates and taglines
    let release_date = title
        .release_date
        .or(title.first_air_date)
        .filter(|d| !d.is_empty());
    let tagline = title.tagline.filter(|t| !t.is_empty());
    let genres: Vec<String> = title.genres.into_iter().map(|g| g.name).collect();

    // TMDB reports 0.0 for titles nobody voted on
    let users_rating = title.vote_average.filter(|_| title.vote_count > 0);

    Observation {
        rating: SourceRating {
            id: Some(SourceId::Numeric(title.id)),
            url: Some(format!(
                "https://www.themoviedb.org/{}/{}",
                path_segment(item_type),
                title.id
            )),
            users_rating,
            ..Default::default()
        },
        details: Some(TitleDetails {
            title: title.title.or(title.name),
            image: title.poster_path.map(|p| format!("{}{}", IMAGE_BASE_URL, p)),
            trailer_url,
            seasons_number,
            status,
            release_date,
            genres: (!genres.is_empty()).then_some(genres),
            tagline,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> TmdbTitle {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_movie_observation() {
        let title = parse(serde_json::json!({
            "id": 278,
            "title": "The Shawshank Redemption",
            "poster_path": "/q6y0Go1tsGEsmtFryDOJo3dEmqu.jpg",
            "vote_average": 8.7,
            "vote_count": 26000,
            "status": "Released",
            "release_date": "1994-09-23",
            "tagline": "Fear can hold you prisoner. Hope can set you free.",
            "genres": [{"id": 18, "name": "Drama"}, {"id": 80, "name": "Crime"}],
            "videos": {"results": [
                {"key": "abc", "site": "Vimeo", "type": "Trailer"},
                {"key": "xyz", "site": "YouTube", "type": "Trailer"}
            ]}
        }));

        let obs = observation(ItemType::Movie, title);
        assert_eq!(obs.rating.users_rating, Some(8.7));
        assert_eq!(obs.rating.id, Some(SourceId::Numeric(278)));

        let details = obs.details.unwrap();
        assert_eq!(details.title.as_deref(), Some("The Shawshank Redemption"));
        assert_eq!(details.trailer_url.as_deref(), Some("https://www.youtube.com/watch?v=xyz"));
        assert_eq!(details.status, None);
        assert!(details.image.unwrap().ends_with("/q6y0Go1tsGEsmtFryDOJo3dEmqu.jpg"));
        assert_eq!(details.release_date.as_deref(), Some("1994-09-23"));
        assert_eq!(details.genres, Some(vec!["Drama".to_string(), "Crime".to_string()]));
        assert_eq!(
            details.tagline.as_deref(),
            Some("Fear can hold you prisoner. Hope can set you free.")
        );
    }

    #[test]
    fn test_tv_observation() {
        let title = parse(serde_json::json!({
            "id": 1396,
            "name": "Breaking Bad",
            "vote_average": 0.0,
            "vote_count": 0,
            "status": "Ended",
            "number_of_seasons": 5,
            "first_air_date": "2008-01-20",
            "tagline": "",
            "genres": []
        }));

        let obs = observation(ItemType::Tvshow, title);
        assert_eq!(obs.rating.users_rating, None);

        let details = obs.details.unwrap();
        assert_eq!(details.title.as_deref(), Some("Breaking Bad"));
        assert_eq!(details.seasons_number, Some(5));
        assert_eq!(details.status, Some(Status::Ended));
        assert_eq!(details.trailer_url, None);
        assert_eq!(details.release_date.as_deref(), Some("2008-01-20"));
        assert_eq!(details.tagline, None);
        assert_eq!(details.genres, None);
    }

    #[test]
    fn test_tv_status_labels() {
        assert_eq!(tv_status("Returning Series"), Status::Ongoing);
        assert_eq!(tv_status("In Production"), Status::Soon);
        assert_eq!(tv_status("Something new"), Status::Unknown);
    }
}
