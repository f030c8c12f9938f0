//! Canonical item model
//!
//! One `CanonicalItem` exists per title. Per-platform observations live in
//! `source_ratings` and are serialized flattened at the top level of the stored
//! document (`"allocine": {...}`, `"imdb": {...}`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{content_address, Error, Result};

/// Kind of title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Movie,
    Tvshow,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Movie => "movie",
            ItemType::Tvshow => "tvshow",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(ItemType::Movie),
            "tvshow" => Ok(ItemType::Tvshow),
            other => Err(Error::InvalidInput(format!("Unknown item type: {}", other))),
        }
    }
}

/// Platform a rating was observed on
///
/// Declaration order is the serialization order of `source_ratings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Allocine,
    Betaseries,
    Imdb,
    Letterboxd,
    Metacritic,
    RottenTomatoes,
    Senscritique,
    Tmdb,
    Trakt,
    TvTime,
}

impl Platform {
    pub const ALL: [Platform; 10] = [
        Platform::Allocine,
        Platform::Betaseries,
        Platform::Imdb,
        Platform::Letterboxd,
        Platform::Metacritic,
        Platform::RottenTomatoes,
        Platform::Senscritique,
        Platform::Tmdb,
        Platform::Trakt,
        Platform::TvTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Allocine => "allocine",
            Platform::Betaseries => "betaseries",
            Platform::Imdb => "imdb",
            Platform::Letterboxd => "letterboxd",
            Platform::Metacritic => "metacritic",
            Platform::RottenTomatoes => "rotten_tomatoes",
            Platform::Senscritique => "senscritique",
            Platform::Tmdb => "tmdb",
            Platform::Trakt => "trakt",
            Platform::TvTime => "tv_time",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown platform: {}", s)))
    }
}

/// Broadcast status of a TV show (movies carry no status)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Soon,
    Canceled,
    Ongoing,
    Pilot,
    Ended,
    Unknown,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Soon,
        Status::Canceled,
        Status::Ongoing,
        Status::Pilot,
        Status::Ended,
        Status::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Soon => "Soon",
            Status::Canceled => "Canceled",
            Status::Ongoing => "Ongoing",
            Status::Pilot => "Pilot",
            Status::Ended => "Ended",
            Status::Unknown => "Unknown",
        }
    }
}

impl FromStr for Status {
    type Err = Error;

    /// Case-insensitive (`ongoing`, `Ongoing` and `ONGOING` all parse)
    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown status: {}", s)))
    }
}

/// Platform-specific identifier (AlloCiné uses integers, IMDb uses `tt` strings)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceId {
    Numeric(i64),
    Text(String),
}

impl SourceId {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SourceId::Numeric(id) => Some(*id),
            SourceId::Text(text) => text.parse().ok(),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Numeric(id) => write!(f, "{}", id),
            SourceId::Text(text) => f.write_str(text),
        }
    }
}

/// One critic's rating in a platform's critic breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticRating {
    pub critic_name: String,
    #[serde(default)]
    pub critic_rating: Option<f64>,
}

/// Observation of one title on one platform
///
/// Every field is independently optional: `None` means unknown, never zero.
/// `critics_rating_details` is omitted from output when `None` so that
/// projections can drop it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRating {
    #[serde(default)]
    pub id: Option<SourceId>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub users_rating: Option<f64>,
    #[serde(default)]
    pub critics_rating: Option<f64>,
    #[serde(default)]
    pub critics_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critics_rating_details: Option<Vec<CriticRating>>,
    #[serde(default)]
    pub popularity: Option<f64>,
}

impl SourceRating {
    /// Fill fields that are still unknown from `other`; known fields are kept.
    pub fn merge(&mut self, other: SourceRating) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        fill(&mut self.id, other.id);
        fill(&mut self.url, other.url);
        fill(&mut self.users_rating, other.users_rating);
        fill(&mut self.critics_rating, other.critics_rating);
        fill(&mut self.critics_number, other.critics_number);
        fill(&mut self.critics_rating_details, other.critics_rating_details);
        fill(&mut self.popularity, other.popularity);
    }
}

/// Merged per-title record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    /// Storage key, see [`content_address::resolve`]
    #[serde(rename = "_id")]
    pub content_address: String,
    /// The Movie Database id
    #[serde(rename = "id")]
    pub external_id: i64,
    pub item_type: ItemType,
    pub is_active: bool,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(rename = "trailer", default)]
    pub trailer_url: Option<String>,
    /// `YYYY-MM-DD`; first air date for TV shows
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub seasons_number: Option<u32>,
    #[serde(default)]
    pub status: Option<Status>,
    /// Top-level keys that are not platforms are ignored on read
    #[serde(flatten, deserialize_with = "platform_blocks")]
    pub source_ratings: BTreeMap<Platform, SourceRating>,
    #[serde(default)]
    pub ratings_average: Option<f64>,
    #[serde(default)]
    pub popularity_average: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Collect the platform blocks among a document's remaining top-level keys
fn platform_blocks<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<Platform, SourceRating>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;

    let mut blocks = BTreeMap::new();
    for (key, value) in entries {
        let Ok(platform) = key.parse::<Platform>() else {
            continue;
        };
        let rating = SourceRating::deserialize(value).map_err(serde::de::Error::custom)?;
        blocks.insert(platform, rating);
    }
    Ok(blocks)
}

impl CanonicalItem {
    pub fn rating(&self, platform: Platform) -> Option<&SourceRating> {
        self.source_ratings.get(&platform)
    }

    /// AlloCiné id, used to match titles showing at a venue
    pub fn allocine_id(&self) -> Option<i64> {
        self.rating(Platform::Allocine)
            .and_then(|r| r.id.as_ref())
            .and_then(SourceId::as_i64)
    }

    /// Canonical source URL this item's address was derived from
    pub fn canonical_url(&self) -> Result<String> {
        content_address::reverse(&self.content_address)
    }

    /// Mark the title as no longer tracked.
    ///
    /// Popularity is only meaningful for tracked titles, so every popularity
    /// value is dropped along with the flag. Ratings are kept.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.popularity_average = None;
        for rating in self.source_ratings.values_mut() {
            rating.popularity = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_item() -> CanonicalItem {
        let mut source_ratings = BTreeMap::new();
        source_ratings.insert(
            Platform::Allocine,
            SourceRating {
                id: Some(SourceId::Numeric(27405)),
                users_rating: Some(4.2),
                popularity: Some(12.0),
                ..Default::default()
            },
        );
        source_ratings.insert(
            Platform::Imdb,
            SourceRating {
                id: Some(SourceId::Text("tt0111161".to_string())),
                users_rating: Some(9.3),
                popularity: Some(40.0),
                ..Default::default()
            },
        );

        CanonicalItem {
            content_address: content_address::resolve(
                "https://www.allocine.fr/film/fichefilm_gen_cfilm=27405.html",
            ),
            external_id: 278,
            item_type: ItemType::Movie,
            is_active: true,
            title: "Les Évadés".to_string(),
            image: Some("https://example.org/poster.jpg".to_string()),
            trailer_url: None,
            release_date: None,
            genres: None,
            tagline: None,
            seasons_number: None,
            status: None,
            source_ratings,
            ratings_average: Some(4.4),
            popularity_average: Some(26.0),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_document_shape_flattens_platforms() {
        let value = serde_json::to_value(sample_item()).unwrap();

        assert_eq!(value["id"], json!(278));
        assert_eq!(value["item_type"], json!("movie"));
        assert_eq!(value["allocine"]["id"], json!(27405));
        assert_eq!(value["imdb"]["id"], json!("tt0111161"));
        assert!(value.get("source_ratings").is_none());
        assert!(value["allocine"].get("critics_rating_details").is_none());
        assert!(value["trailer"].is_null());
    }

    #[test]
    fn test_document_decodes_back() {
        let item = sample_item();
        let encoded = serde_json::to_string(&item).unwrap();
        let decoded: CanonicalItem = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, item);
    }

    #[test]
    fn test_deactivate_drops_popularity_keeps_ratings() {
        let mut item = sample_item();
        item.deactivate();

        assert!(!item.is_active);
        assert_eq!(item.popularity_average, None);
        assert!(item.source_ratings.values().all(|r| r.popularity.is_none()));
        assert_eq!(item.rating(Platform::Allocine).unwrap().users_rating, Some(4.2));
    }

    #[test]
    fn test_merge_keeps_known_fields() {
        let mut rating = SourceRating {
            users_rating: Some(3.5),
            ..Default::default()
        };
        rating.merge(SourceRating {
            users_rating: Some(1.0),
            popularity: Some(7.0),
            ..Default::default()
        });

        assert_eq!(rating.users_rating, Some(3.5));
        assert_eq!(rating.popularity, Some(7.0));
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("ongoing".parse::<Status>().unwrap(), Status::Ongoing);
        assert_eq!("CANCELED".parse::<Status>().unwrap(), Status::Canceled);
        assert!("airing".parse::<Status>().is_err());
    }

    #[test]
    fn test_platform_names() {
        assert_eq!("rotten_tomatoes".parse::<Platform>().unwrap(), Platform::RottenTomatoes);
        assert_eq!(Platform::TvTime.to_string(), "tv_time");
        assert_eq!(sample_item().allocine_id(), Some(27405));
    }

    #[test]
    fn test_unknown_top_level_keys_are_ignored() {
        let item = sample_item();
        let mut document = serde_json::to_value(&item).unwrap();
        document["platforms_links"] = json!([]);
        document["directors"] = json!(["Frank Darabont"]);

        let decoded: CanonicalItem = serde_json::from_value(document).unwrap();
        assert_eq!(decoded, item);
    }
}
