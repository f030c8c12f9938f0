//! HTTP API handlers for whatson-api

pub mod health;
pub mod items;

pub use health::health_routes;
pub use items::{get_movie, get_tv, list_items};
