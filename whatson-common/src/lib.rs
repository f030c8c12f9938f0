//! # What's On Common Library
//!
//! Shared code for the What's On services:
//! - Canonical item model and per-platform ratings
//! - Content addressing (URL to storage key)
//! - Rating field registry and normalization
//! - Configuration loading
//! - SQLite item store

pub mod config;
pub mod content_address;
pub mod db;
pub mod error;
pub mod models;
pub mod ratings;

pub use error::{Error, Result};
pub use models::{CanonicalItem, ItemType, Platform, SourceRating, Status};
