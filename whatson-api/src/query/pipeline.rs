//! Aggregation pipeline
//!
//! A query is an ordered list of stages: match, derive, threshold, sort,
//! paginate. The match stage runs in the store; the others run over the
//! matched items in memory.

use serde::Serialize;
use sqlx::SqlitePool;
use std::cmp::Ordering;
use whatson_common::db::items::{find_matching, ItemMatch};
use whatson_common::ratings::{self, RatingField};
use whatson_common::{CanonicalItem, Result};

use super::filter::{PopularityField, QueryFilterSpec};

pub const NO_ITEMS_MESSAGE: &str = "No items have been found.";

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortKey {
    /// Derived rating, highest first
    RatingsDesc,
    /// Popularity rank, most popular (lowest rank) first
    PopularityAsc(PopularityField),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(ItemMatch),
    /// Recompute `ratings_average` over these fields
    Derive(Vec<&'static RatingField>),
    /// Keep items whose derived average is at least this value
    Threshold(f64),
    Sort(SortKey),
    Paginate { page: u32, limit: u32 },
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
    pub total_results: usize,
    pub results: Vec<CanonicalItem>,
}

/// "Nothing to show" payload, returned with HTTP 200
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sentinel {
    pub message: String,
}

impl Sentinel {
    pub fn no_items() -> Self {
        Self {
            message: NO_ITEMS_MESSAGE.to_string(),
        }
    }

    pub fn no_items_for_page(page: u32) -> Self {
        Self {
            message: format!("No items have been found for page {}.", page),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PageResult {
    Page(Page),
    Sentinel(Sentinel),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Stages for a parsed query. `allocine_ids` restricts the match to titles
    /// showing at the requested cinema.
    pub fn build(spec: &QueryFilterSpec, allocine_ids: Option<Vec<i64>>) -> Self {
        let mut stages = vec![
            Stage::Match(ItemMatch {
                external_id: spec.external_id,
                allocine_ids,
                item_types: spec.item_types.clone(),
                is_active: spec.is_active.clone(),
                statuses: spec.statuses.clone(),
                seasons: spec.seasons.clone(),
                title_contains: spec.title.clone(),
            }),
            Stage::Derive(spec.rating_fields.clone()),
        ];

        if let Some(minimum) = spec.minimum_rating {
            stages.push(Stage::Threshold(minimum));
        }

        stages.push(Stage::Sort(match spec.popularity {
            Some(field) => SortKey::PopularityAsc(field),
            None => SortKey::RatingsDesc,
        }));
        stages.push(Stage::Paginate {
            page: spec.page,
            limit: spec.limit,
        });

        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub async fn execute(&self, pool: &SqlitePool) -> Result<PageResult> {
        let mut items = Vec::new();
        for stage in &self.stages {
            match stage {
                Stage::Match(criteria) => items = find_matching(pool, criteria).await?,
                Stage::Derive(fields) => derive(&mut items, fields),
                Stage::Threshold(minimum) => threshold(&mut items, *minimum),
                Stage::Sort(key) => sort(&mut items, *key),
                Stage::Paginate { page, limit } => return Ok(paginate(items, *page, *limit)),
            }
        }

        Ok(paginate(items, 1, u32::MAX))
    }
}

fn derive(items: &mut [CanonicalItem], fields: &[&'static RatingField]) {
    for item in items {
        item.ratings_average = ratings::normalized_mean(fields.iter().copied(), &item.source_ratings);
    }
}

fn threshold(items: &mut Vec<CanonicalItem>, minimum: f64) {
    items.retain(|item| item.ratings_average.is_some_and(|r| r >= minimum));
}

/// Present values before missing ones
fn cmp_present(a: Option<f64>, b: Option<f64>, order: impl Fn(f64, f64) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => order(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sort(items: &mut [CanonicalItem], key: SortKey) {
    items.sort_by(|a, b| {
        let primary = match key {
            SortKey::RatingsDesc => cmp_present(a.ratings_average, b.ratings_average, |a, b| b.total_cmp(&a)),
            SortKey::PopularityAsc(field) => cmp_present(field.value(a), field.value(b), |a, b| a.total_cmp(&b)),
        };
        primary.then_with(|| a.content_address.cmp(&b.content_address))
    });
}

pub fn paginate(items: Vec<CanonicalItem>, page: u32, limit: u32) -> PageResult {
    let total_results = items.len();
    if total_results == 0 {
        return PageResult::Sentinel(Sentinel::no_items());
    }

    let skip = (page.max(1) as usize - 1).saturating_mul(limit as usize);
    if skip >= total_results {
        return PageResult::Sentinel(Sentinel::no_items_for_page(page));
    }

    PageResult::Page(Page {
        page,
        limit,
        total_results,
        results: items.into_iter().skip(skip).take(limit as usize).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use whatson_common::models::SourceRating;
    use whatson_common::{ItemType, Platform};

    fn item(address: &str, rating: Option<f64>, popularity: Option<f64>) -> CanonicalItem {
        let mut source_ratings = BTreeMap::new();
        source_ratings.insert(
            Platform::Allocine,
            SourceRating {
                users_rating: rating,
                popularity,
                ..Default::default()
            },
        );
        CanonicalItem {
            content_address: address.to_string(),
            external_id: 1,
            item_type: ItemType::Movie,
            is_active: true,
            title: address.to_string(),
            image: None,
            trailer_url: None,
            release_date: None,
            genres: None,
            tagline: None,
            seasons_number: None,
            status: None,
            source_ratings,
            ratings_average: rating,
            popularity_average: popularity,
            updated_at: Utc::now(),
        }
    }

    fn addresses(items: &[CanonicalItem]) -> Vec<&str> {
        items.iter().map(|i| i.content_address.as_str()).collect()
    }

    #[test]
    fn test_rating_sort_puts_missing_last_and_breaks_ties() {
        let mut items = vec![
            item("d", None, None),
            item("c", Some(3.0), None),
            item("a", Some(4.5), None),
            item("b", Some(3.0), None),
        ];
        sort(&mut items, SortKey::RatingsDesc);
        assert_eq!(addresses(&items), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_popularity_sort_is_ascending() {
        let mut items = vec![
            item("a", None, Some(30.0)),
            item("b", None, None),
            item("c", None, Some(2.0)),
        ];
        sort(&mut items, SortKey::PopularityAsc(PopularityField::Allocine));
        assert_eq!(addresses(&items), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_threshold_drops_unrated_items() {
        let mut items = vec![item("a", Some(4.0), None), item("b", Some(2.0), None), item("c", None, None)];
        threshold(&mut items, 3.0);
        assert_eq!(addresses(&items), vec!["a"]);
    }

    #[test]
    fn test_pagination_and_sentinels() {
        let items: Vec<_> = (0..45).map(|n| item(&format!("{:02}", n), Some(3.0), None)).collect();

        let PageResult::Page(page) = paginate(items.clone(), 3, 20) else {
            panic!("expected a page");
        };
        assert_eq!(page.total_results, 45);
        assert_eq!(page.results.len(), 5);
        assert_eq!(page.results[0].content_address, "40");

        assert_eq!(
            paginate(items, 4, 20),
            PageResult::Sentinel(Sentinel {
                message: "No items have been found for page 4.".into()
            })
        );
        assert_eq!(paginate(Vec::new(), 1, 20), PageResult::Sentinel(Sentinel::no_items()));
    }

    #[test]
    fn test_sentinel_serializes_as_message() {
        let value = serde_json::to_value(PageResult::Sentinel(Sentinel::no_items())).unwrap();
        assert_eq!(value, serde_json::json!({"message": "No items have been found."}));
    }
}
