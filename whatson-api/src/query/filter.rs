//! Query parameter parsing
//!
//! Parameters are lenient: unknown tokens in a list are dropped, and a list
//! left empty falls back to its default. Only the shape of the request is
//! validated here; matching happens in the pipeline.

use serde::Deserialize;
use std::collections::BTreeSet;
use whatson_common::config::QueryConfig;
use whatson_common::db::items::SeasonsMatch;
use whatson_common::ratings::{self, RatingField, RATING_FIELDS};
use whatson_common::{CanonicalItem, ItemType, Platform, Status};

/// Query string as received
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuery {
    pub item_type: Option<String>,
    pub is_active: Option<String>,
    pub cinema_id: Option<String>,
    pub seasons_number: Option<String>,
    pub status: Option<String>,
    pub title: Option<String>,
    pub ratings_filters: Option<String>,
    pub popularity_filters: Option<String>,
    pub minimum_ratings: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub critics_rating_details: Option<String>,
    #[serde(rename = "allData")]
    pub all_data: Option<String>,
}

/// Popularity rank a result list can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopularityField {
    Allocine,
    Imdb,
    Average,
}

impl PopularityField {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "allocine_popularity" => Some(PopularityField::Allocine),
            "imdb_popularity" => Some(PopularityField::Imdb),
            "popularity_average" => Some(PopularityField::Average),
            _ => None,
        }
    }

    pub fn value(&self, item: &CanonicalItem) -> Option<f64> {
        match self {
            PopularityField::Allocine => item.rating(Platform::Allocine).and_then(|r| r.popularity),
            PopularityField::Imdb => item.rating(Platform::Imdb).and_then(|r| r.popularity),
            PopularityField::Average => item.popularity_average,
        }
    }
}

/// Fields a response may leave out
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProjectedField {
    CriticsRatingDetails,
}

/// Exclusion set applied to every returned item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    excluded: BTreeSet<ProjectedField>,
}

impl Projection {
    pub fn from_flags(critics_rating_details: bool) -> Self {
        let mut excluded = BTreeSet::new();
        if !critics_rating_details {
            excluded.insert(ProjectedField::CriticsRatingDetails);
        }
        Self { excluded }
    }

    pub fn excludes(&self, field: ProjectedField) -> bool {
        self.excluded.contains(&field)
    }

    pub fn apply(&self, item: &mut CanonicalItem) {
        if self.excludes(ProjectedField::CriticsRatingDetails) {
            for rating in item.source_ratings.values_mut() {
                rating.critics_rating_details = None;
            }
        }
    }
}

/// Parsed and defaulted query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilterSpec {
    /// Set by the single-title routes only
    pub external_id: Option<i64>,
    pub item_types: Vec<ItemType>,
    /// Empty means active and inactive titles
    pub is_active: Vec<bool>,
    pub cinema_id: Option<String>,
    pub seasons: Option<SeasonsMatch>,
    pub statuses: Option<Vec<Option<Status>>>,
    pub title: Option<String>,
    pub rating_fields: Vec<&'static RatingField>,
    /// `None` sorts by rating
    pub popularity: Option<PopularityField>,
    pub minimum_rating: Option<f64>,
    pub page: u32,
    pub limit: u32,
    pub projection: Projection,
    pub all_data: bool,
}

impl QueryFilterSpec {
    pub fn parse(raw: &RawQuery, config: &QueryConfig) -> Self {
        let item_types = parse_list(raw.item_type.as_deref(), |t| t.parse::<ItemType>().ok());
        let is_active = parse_list(raw.is_active.as_deref(), |t| t.parse::<bool>().ok());

        Self {
            external_id: None,
            item_types: if item_types.is_empty() {
                vec![ItemType::Movie]
            } else {
                item_types
            },
            is_active: if is_active.is_empty() { vec![true] } else { is_active },
            cinema_id: non_empty(raw.cinema_id.as_deref()),
            seasons: parse_seasons(raw.seasons_number.as_deref(), config.max_seasons_number),
            statuses: parse_statuses(raw.status.as_deref()),
            title: non_empty(raw.title.as_deref()),
            rating_fields: parse_rating_fields(raw.ratings_filters.as_deref()),
            popularity: raw
                .popularity_filters
                .as_deref()
                .and_then(|p| PopularityField::parse(p.trim())),
            minimum_rating: parse_minimum_rating(raw.minimum_ratings.as_deref()),
            page: parse_positive(raw.page.as_deref()).unwrap_or(1),
            limit: parse_positive(raw.limit.as_deref()).unwrap_or(config.default_limit),
            projection: Projection::from_flags(is_true(raw.critics_rating_details.as_deref())),
            all_data: is_true(raw.all_data.as_deref()),
        }
    }

    /// Query for one title by TMDB id, whatever its active flag
    pub fn single(external_id: i64, item_type: ItemType, raw: &RawQuery, config: &QueryConfig) -> Self {
        Self {
            external_id: Some(external_id),
            item_types: vec![item_type],
            is_active: Vec::new(),
            cinema_id: None,
            seasons: None,
            statuses: None,
            title: None,
            popularity: None,
            minimum_rating: None,
            page: 1,
            limit: 1,
            all_data: false,
            ..Self::parse(raw, config)
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn is_true(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim() == "true")
}

fn parse_positive(value: Option<&str>) -> Option<u32> {
    value.and_then(|v| v.trim().parse::<u32>().ok()).filter(|n| *n > 0)
}

fn parse_list<T, F>(value: Option<&str>, parse: F) -> Vec<T>
where
    T: PartialEq,
    F: Fn(&str) -> Option<T>,
{
    let mut parsed = Vec::new();
    for token in value.unwrap_or_default().split(',') {
        if let Some(v) = parse(token.trim()) {
            if !parsed.contains(&v) {
                parsed.push(v);
            }
        }
    }
    parsed
}

/// Season counts at or above `max` select "that many seasons or more"
fn parse_seasons(value: Option<&str>, max: u32) -> Option<SeasonsMatch> {
    let counts = parse_list(value, |t| t.parse::<u32>().ok());
    if counts.is_empty() {
        return None;
    }

    let exact = counts.iter().copied().filter(|n| *n < max).collect();
    let at_least = counts.iter().copied().filter(|n| *n >= max).min();
    Some(SeasonsMatch { exact, at_least })
}

/// An empty token selects titles without status (`status=ended,` is Ended or none)
fn parse_statuses(value: Option<&str>) -> Option<Vec<Option<Status>>> {
    let value = value?;
    let statuses = parse_list(Some(value), |t| {
        if t.is_empty() {
            Some(None)
        } else {
            t.parse::<Status>().ok().map(Some)
        }
    });
    (!statuses.is_empty()).then_some(statuses)
}

fn parse_rating_fields(value: Option<&str>) -> Vec<&'static RatingField> {
    let selected = match value.map(str::trim) {
        None | Some("") | Some("all") => Vec::new(),
        Some(list) => parse_list(Some(list), ratings::find_field),
    };

    if selected.is_empty() {
        RATING_FIELDS.iter().collect()
    } else {
        selected
    }
}

/// Smallest valid value of the list
fn parse_minimum_rating(value: Option<&str>) -> Option<f64> {
    parse_list(value, |t| t.parse::<f64>().ok().filter(|v| v.is_finite()))
        .into_iter()
        .reduce(f64::min)
}
