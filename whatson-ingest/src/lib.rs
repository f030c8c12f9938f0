//! whatson-ingest library
//!
//! Refresh batch for the What's On item store: reads the identifier file of an
//! item type, asks every configured source adapter about each title, merges the
//! answers into one canonical item and upserts it.

pub mod adapters;
pub mod batch;
pub mod cross_validator;
pub mod error;
pub mod guard;
pub mod ids_file;
pub mod preflight;
pub mod reconcile;

pub use adapters::{AdapterResult, Observation, SourceAdapter, TitleDetails};
pub use batch::{run_batch, BatchOptions, BatchReport};
pub use error::{AdapterError, BatchError, GuardTripped};
pub use guard::ErrorThresholdGuard;
pub use ids_file::TitleReference;
pub use reconcile::{Reconciler, Reconciliation, SkipReason};
