//! Reconciliation merge
//!
//! Builds one canonical item from everything the adapters observed for a
//! title reference. Adapter calls for a single title run concurrently; their
//! results are merged in adapter order so the outcome does not depend on which
//! call finished first.

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};
use whatson_common::config::IngestConfig;
use whatson_common::models::{SourceId, SourceRating};
use whatson_common::ratings::{self, RATING_FIELDS};
use whatson_common::{CanonicalItem, ItemType, Platform};

use crate::adapters::{AdapterResult, SourceAdapter, TitleDetails};
use crate::cross_validator::cross_validate;
use crate::error::GuardTripped;
use crate::guard::ErrorThresholdGuard;
use crate::ids_file::TitleReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingExternalId,
    MissingTitle,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingExternalId => f.write_str("missing TMDB id"),
            SkipReason::MissingTitle => f.write_str("no source supplied a title"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Reconciled(CanonicalItem),
    Skipped(SkipReason),
}

pub struct Reconciler {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    guard: ErrorThresholdGuard,
    config: Arc<IngestConfig>,
}

impl Reconciler {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, guard: ErrorThresholdGuard, config: Arc<IngestConfig>) -> Self {
        Self {
            adapters,
            guard,
            config,
        }
    }

    pub fn guard(&self) -> &ErrorThresholdGuard {
        &self.guard
    }

    /// Reconcile one title.
    ///
    /// `Err` means a source exceeded its error threshold; nothing may be
    /// written for this title.
    pub async fn reconcile(&self, reference: &TitleReference) -> Result<Reconciliation, GuardTripped> {
        let Some(external_id) = reference.tmdb_id else {
            error!(url = %reference.canonical_url, "Skipping title without TMDB id");
            return Ok(Reconciliation::Skipped(SkipReason::MissingExternalId));
        };

        let calls = self.adapters.iter().map(|adapter| async move {
            let outcome = self.guard.call(adapter.name(), || adapter.fetch(reference)).await;
            (adapter.platform(), outcome)
        });
        let outcomes = join_all(calls).await;

        let mut source_ratings = seed_ratings(reference);
        let mut details: Vec<(Platform, TitleDetails)> = Vec::new();

        for (platform, outcome) in outcomes {
            match outcome? {
                AdapterResult::Observed(observation) => {
                    source_ratings.entry(platform).or_default().merge(observation.rating);
                    if let Some(d) = observation.details {
                        details.push((platform, d));
                    }
                }
                AdapterResult::NotApplicable | AdapterResult::Failed(_) => {}
            }
        }

        // Primary platform first, others keep adapter order
        let primary = self.config.primary_details_source;
        details.sort_by_key(|(platform, _)| *platform != primary);

        let Some(title) = details.iter().find_map(|(_, d)| d.title.clone()) else {
            error!(url = %reference.canonical_url, "Skipping title without a resolvable title");
            return Ok(Reconciliation::Skipped(SkipReason::MissingTitle));
        };

        let popularity_average = self.validate_popularity(&mut source_ratings);
        let ratings_average = ratings::normalized_mean(RATING_FIELDS, &source_ratings);

        let (seasons_number, status) = match reference.item_type {
            ItemType::Movie => (None, None),
            ItemType::Tvshow => (
                details.iter().find_map(|(_, d)| d.seasons_number),
                details.iter().find_map(|(_, d)| d.status),
            ),
        };

        let mut item = CanonicalItem {
            content_address: reference.content_address.clone(),
            external_id,
            item_type: reference.item_type,
            is_active: reference.is_active,
            title,
            image: details.iter().find_map(|(_, d)| d.image.clone()),
            trailer_url: details.iter().find_map(|(_, d)| d.trailer_url.clone()),
            release_date: details.iter().find_map(|(_, d)| d.release_date.clone()),
            genres: details.iter().find_map(|(_, d)| d.genres.clone()),
            tagline: details.iter().find_map(|(_, d)| d.tagline.clone()),
            seasons_number,
            status,
            source_ratings,
            ratings_average,
            popularity_average,
            updated_at: Utc::now(),
        };

        if !item.is_active {
            item.deactivate();
        }

        debug!(
            url = %reference.canonical_url,
            title = %item.title,
            ratings_average = ?item.ratings_average,
            popularity_average = ?item.popularity_average,
            "Reconciled title"
        );

        Ok(Reconciliation::Reconciled(item))
    }

    /// Cross-validate the two popularity ranks in place and average what survives
    fn validate_popularity(&self, source_ratings: &mut BTreeMap<Platform, SourceRating>) -> Option<f64> {
        let settings = &self.config.popularity;
        let primary = source_ratings.get(&settings.primary).and_then(|r| r.popularity);
        let secondary = source_ratings.get(&settings.secondary).and_then(|r| r.popularity);

        let (primary, secondary) = cross_validate(primary, secondary, settings.max_diff);
        if secondary.is_none() {
            if let Some(rating) = source_ratings.get_mut(&settings.secondary) {
                rating.popularity = None;
            }
        }

        ratings::mean(primary.into_iter().chain(secondary))
    }
}

/// Identifiers known from the ids file before any adapter runs
fn seed_ratings(reference: &TitleReference) -> BTreeMap<Platform, SourceRating> {
    let mut ratings = BTreeMap::new();

    ratings.insert(
        Platform::Allocine,
        SourceRating {
            id: reference.allocine_id.map(SourceId::Numeric),
            url: Some(reference.canonical_url.clone()),
            ..Default::default()
        },
    );

    if let Some(imdb_id) = &reference.imdb_id {
        ratings.insert(
            Platform::Imdb,
            SourceRating {
                id: Some(SourceId::Text(imdb_id.clone())),
                url: Some(format!("https://www.imdb.com/title/{}/", imdb_id)),
                ..Default::default()
            },
        );
    }

    if let Some(id) = &reference.betaseries_id {
        ratings.insert(
            Platform::Betaseries,
            SourceRating {
                id: Some(SourceId::Text(id.clone())),
                ..Default::default()
            },
        );
    }

    if let Some(id) = &reference.metacritic_id {
        ratings.insert(
            Platform::Metacritic,
            SourceRating {
                id: Some(SourceId::Text(id.clone())),
                ..Default::default()
            },
        );
    }

    ratings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Observation;
    use crate::error::AdapterError;
    use async_trait::async_trait;
    use whatson_common::{content_address, Status};

    struct Fixed {
        platform: Platform,
        result: AdapterResult,
    }

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(&self, _reference: &TitleReference) -> AdapterResult {
            self.result.clone()
        }
    }

    fn observed(users_rating: Option<f64>, popularity: Option<f64>, details: Option<TitleDetails>) -> AdapterResult {
        AdapterResult::Observed(Observation {
            rating: SourceRating {
                users_rating,
                popularity,
                ..Default::default()
            },
            details,
        })
    }

    fn details(title: &str) -> TitleDetails {
        TitleDetails {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    fn reference(item_type: ItemType) -> TitleReference {
        let canonical_url = "https://www.allocine.fr/series/ficheserie_gen_cserie=7157.html".to_string();
        TitleReference {
            item_type,
            relative_url: "/series/ficheserie_gen_cserie=7157.html".to_string(),
            content_address: content_address::resolve(&canonical_url),
            canonical_url,
            allocine_id: Some(7157),
            tmdb_id: Some(1396),
            imdb_id: Some("tt0903747".to_string()),
            betaseries_id: None,
            metacritic_id: None,
            is_active: true,
        }
    }

    fn reconciler(adapters: Vec<Fixed>) -> Reconciler {
        let config = IngestConfig {
            retry_delay_ms: 0,
            ..Default::default()
        };
        let adapters = adapters
            .into_iter()
            .map(|a| Arc::new(a) as Arc<dyn SourceAdapter>)
            .collect();
        Reconciler::new(adapters, ErrorThresholdGuard::from_config(&config), Arc::new(config))
    }

    #[tokio::test]
    async fn test_ratings_average_normalizes_scales() {
        let reconciler = reconciler(vec![
            Fixed {
                platform: Platform::Allocine,
                result: observed(Some(4.0), None, Some(details("Breaking Bad"))),
            },
            Fixed {
                platform: Platform::Imdb,
                result: observed(Some(8.0), None, None),
            },
        ]);

        let Reconciliation::Reconciled(item) = reconciler.reconcile(&reference(ItemType::Movie)).await.unwrap() else {
            panic!("expected a reconciled item");
        };
        assert_eq!(item.ratings_average, Some(4.0));
        assert_eq!(item.title, "Breaking Bad");
        assert_eq!(item.allocine_id(), Some(7157));
        assert_eq!(item.rating(Platform::Imdb).unwrap().id, Some(SourceId::Text("tt0903747".into())));
    }

    #[tokio::test]
    async fn test_divergent_secondary_popularity_dropped() {
        let reconciler = reconciler(vec![
            Fixed {
                platform: Platform::Allocine,
                result: observed(None, Some(10.0), Some(details("Heat"))),
            },
            Fixed {
                platform: Platform::Imdb,
                result: observed(None, Some(500.0), None),
            },
        ]);

        let Reconciliation::Reconciled(item) = reconciler.reconcile(&reference(ItemType::Movie)).await.unwrap() else {
            panic!("expected a reconciled item");
        };
        assert_eq!(item.rating(Platform::Allocine).unwrap().popularity, Some(10.0));
        assert_eq!(item.rating(Platform::Imdb).unwrap().popularity, None);
        assert_eq!(item.popularity_average, Some(10.0));
    }

    #[tokio::test]
    async fn test_primary_details_win_with_fallback() {
        let reconciler = reconciler(vec![
            Fixed {
                platform: Platform::Tmdb,
                result: observed(
                    None,
                    None,
                    Some(TitleDetails {
                        title: Some("Breaking Bad (TMDB)".into()),
                        image: Some("tmdb.jpg".into()),
                        seasons_number: Some(5),
                        status: Some(Status::Ended),
                        release_date: Some("2008-01-20".into()),
                        genres: Some(vec!["Drama".into(), "Crime".into()]),
                        ..Default::default()
                    }),
                ),
            },
            Fixed {
                platform: Platform::Allocine,
                result: observed(None, None, Some(details("Breaking Bad"))),
            },
        ]);

        let Reconciliation::Reconciled(item) = reconciler.reconcile(&reference(ItemType::Tvshow)).await.unwrap() else {
            panic!("expected a reconciled item");
        };
        assert_eq!(item.title, "Breaking Bad");
        assert_eq!(item.image.as_deref(), Some("tmdb.jpg"));
        assert_eq!(item.seasons_number, Some(5));
        assert_eq!(item.status, Some(Status::Ended));
        assert_eq!(item.release_date.as_deref(), Some("2008-01-20"));
        assert_eq!(item.genres, Some(vec!["Drama".to_string(), "Crime".to_string()]));
        assert_eq!(item.tagline, None);
    }

    #[tokio::test]
    async fn test_missing_ids_and_titles_skip() {
        let reconciler = reconciler(vec![Fixed {
            platform: Platform::Imdb,
            result: observed(Some(7.0), None, None),
        }]);

        let mut no_id = reference(ItemType::Movie);
        no_id.tmdb_id = None;
        assert_eq!(
            reconciler.reconcile(&no_id).await.unwrap(),
            Reconciliation::Skipped(SkipReason::MissingExternalId)
        );
        assert_eq!(
            reconciler.reconcile(&reference(ItemType::Movie)).await.unwrap(),
            Reconciliation::Skipped(SkipReason::MissingTitle)
        );
    }

    #[tokio::test]
    async fn test_failed_adapter_is_tolerated_below_threshold() {
        let reconciler = reconciler(vec![
            Fixed {
                platform: Platform::Allocine,
                result: observed(Some(3.0), None, Some(details("Heat"))),
            },
            Fixed {
                platform: Platform::Imdb,
                result: AdapterResult::Failed(AdapterError::Invalid("captcha".into())),
            },
        ]);

        let outcome = reconciler.reconcile(&reference(ItemType::Movie)).await.unwrap();
        assert!(matches!(outcome, Reconciliation::Reconciled(_)));
        assert_eq!(reconciler.guard().failures("imdb"), 1);
    }
}
