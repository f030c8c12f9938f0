//! Rating field registry
//!
//! Each platform publishes ratings on its own scale. A rating field names one
//! (platform, users|critics) pair and the divisor that brings it onto the shared
//! 0..5 scale. The registry is fixed: adding a platform means adding rows here.

use std::collections::BTreeMap;

use crate::{Platform, SourceRating};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingKind {
    Users,
    Critics,
}

/// One normalizable rating
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingField {
    /// Public name used in `ratings_filters` and `minimum_ratings`
    pub key: &'static str,
    pub platform: Platform,
    pub kind: RatingKind,
    pub divisor: f64,
}

impl RatingField {
    /// Rating on the platform's native scale
    pub fn raw(&self, ratings: &BTreeMap<Platform, SourceRating>) -> Option<f64> {
        let rating = ratings.get(&self.platform)?;
        match self.kind {
            RatingKind::Users => rating.users_rating,
            RatingKind::Critics => rating.critics_rating,
        }
    }

    /// Rating on the 0..5 scale
    pub fn normalized(&self, ratings: &BTreeMap<Platform, SourceRating>) -> Option<f64> {
        self.raw(ratings).map(|value| value / self.divisor)
    }
}

const fn field(key: &'static str, platform: Platform, kind: RatingKind, divisor: f64) -> RatingField {
    RatingField {
        key,
        platform,
        kind,
        divisor,
    }
}

pub const RATING_FIELDS: &[RatingField] = &[
    field("allocine_critics", Platform::Allocine, RatingKind::Critics, 1.0),
    field("allocine_users", Platform::Allocine, RatingKind::Users, 1.0),
    field("betaseries_users", Platform::Betaseries, RatingKind::Users, 1.0),
    field("imdb_users", Platform::Imdb, RatingKind::Users, 2.0),
    field("letterboxd_users", Platform::Letterboxd, RatingKind::Users, 1.0),
    field("metacritic_critics", Platform::Metacritic, RatingKind::Critics, 20.0),
    field("metacritic_users", Platform::Metacritic, RatingKind::Users, 2.0),
    field("rottentomatoes_critics", Platform::RottenTomatoes, RatingKind::Critics, 20.0),
    field("rottentomatoes_users", Platform::RottenTomatoes, RatingKind::Users, 20.0),
    field("senscritique_users", Platform::Senscritique, RatingKind::Users, 2.0),
    field("tmdb_users", Platform::Tmdb, RatingKind::Users, 2.0),
    field("trakt_users", Platform::Trakt, RatingKind::Users, 20.0),
    field("tvtime_users", Platform::TvTime, RatingKind::Users, 2.0),
];

pub fn find_field(key: &str) -> Option<&'static RatingField> {
    RATING_FIELDS.iter().find(|f| f.key == key)
}

/// Arithmetic mean of the present values, `None` when there are none
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Mean of the normalized values of `fields` that are present on the item
pub fn normalized_mean<'a, I>(fields: I, ratings: &BTreeMap<Platform, SourceRating>) -> Option<f64>
where
    I: IntoIterator<Item = &'a RatingField>,
{
    mean(fields.into_iter().filter_map(|f| f.normalized(ratings)))
}
