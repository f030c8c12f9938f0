//! whatson-api library - read-only query service over the item store

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use whatson_common::config::QueryConfig;

pub mod api;
pub mod error;
pub mod query;
pub mod showtimes;

pub use error::{ApiError, ApiResult};
pub use showtimes::{AllocineShowtimes, ShowtimesProvider};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<QueryConfig>,
    /// Cinema lookup used by `cinema_id` queries
    pub showtimes: Arc<dyn ShowtimesProvider>,
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(db: SqlitePool, config: QueryConfig, showtimes: Arc<dyn ShowtimesProvider>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            showtimes,
            startup_time: Instant::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/", get(api::list_items))
        .route("/movie/:id", get(api::get_movie))
        .route("/tv/:id", get(api::get_tv))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
