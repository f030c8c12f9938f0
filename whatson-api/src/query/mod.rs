//! Query aggregation engine

pub mod filter;
pub mod pipeline;

use sqlx::SqlitePool;
use tracing::debug;

pub use filter::{PopularityField, Projection, QueryFilterSpec, RawQuery};
pub use pipeline::{Page, PageResult, Pipeline, Sentinel};

use crate::error::ApiResult;
use crate::showtimes::ShowtimesProvider;

/// Run a query end to end: resolve the cinema, execute the pipeline, project
pub async fn run_query(
    pool: &SqlitePool,
    spec: &QueryFilterSpec,
    showtimes: &dyn ShowtimesProvider,
) -> ApiResult<PageResult> {
    let allocine_ids = match &spec.cinema_id {
        Some(cinema_id) => Some(showtimes.movie_ids(cinema_id).await?),
        None => None,
    };

    let pipeline = Pipeline::build(spec, allocine_ids);
    debug!(stages = ?pipeline.stages(), "Executing query pipeline");

    let mut result = pipeline.execute(pool).await?;
    if let PageResult::Page(page) = &mut result {
        for item in &mut page.results {
            spec.projection.apply(item);
        }
    }

    Ok(result)
}
