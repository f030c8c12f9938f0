//! Item query endpoints
//!
//! `GET /` runs the full query engine. `GET /movie/:id` and `GET /tv/:id` look
//! up one title by TMDB id; when `ratings_filters` is given the title goes
//! through the pipeline so its `ratings_average` reflects the selection.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use tracing::debug;
use whatson_common::db::items::find_by_external_id;
use whatson_common::{CanonicalItem, ItemType};

use crate::error::{ApiError, ApiResult};
use crate::query::{run_query, PageResult, QueryFilterSpec, RawQuery};
use crate::AppState;

/// Body of `GET /`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ListResponse {
    /// `allData=true`: page envelope or sentinel
    Envelope(PageResult),
    /// Bare results array
    Results(Vec<CanonicalItem>),
}

/// GET /
pub async fn list_items(
    State(state): State<AppState>,
    Query(raw): Query<RawQuery>,
) -> ApiResult<Json<ListResponse>> {
    let spec = QueryFilterSpec::parse(&raw, &state.config);
    debug!(?spec, "Listing items");

    let result = run_query(&state.db, &spec, state.showtimes.as_ref()).await?;

    Ok(Json(match result {
        PageResult::Page(page) if !spec.all_data => ListResponse::Results(page.results),
        other => ListResponse::Envelope(other),
    }))
}

/// GET /movie/:id
pub async fn get_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(raw): Query<RawQuery>,
) -> ApiResult<Json<CanonicalItem>> {
    get_single(&state, ItemType::Movie, &id, &raw).await.map(Json)
}

/// GET /tv/:id
pub async fn get_tv(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(raw): Query<RawQuery>,
) -> ApiResult<Json<CanonicalItem>> {
    get_single(&state, ItemType::Tvshow, &id, &raw).await.map(Json)
}

async fn get_single(state: &AppState, item_type: ItemType, id: &str, raw: &RawQuery) -> ApiResult<CanonicalItem> {
    let external_id: i64 = id
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid id: {}", id)))?;

    let spec = QueryFilterSpec::single(external_id, item_type, raw, &state.config);
    let not_found = || ApiError::NotFound(format!("{} {}", item_type, external_id));

    if raw.ratings_filters.is_some() {
        return match run_query(&state.db, &spec, state.showtimes.as_ref()).await? {
            PageResult::Page(page) => page.results.into_iter().next().ok_or_else(not_found),
            PageResult::Sentinel(_) => Err(not_found()),
        };
    }

    let mut item = find_by_external_id(&state.db, item_type, external_id)
        .await?
        .ok_or_else(not_found)?;
    spec.projection.apply(&mut item);
    Ok(item)
}
