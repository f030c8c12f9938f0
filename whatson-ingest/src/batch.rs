//! Refresh batch driver
//!
//! Walks the title references of one item type in file order, reconciling and
//! upserting each title. A run can be resumed from any index after an abort.

use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{error, info, warn};
use whatson_common::db::items;
use whatson_common::{content_address, ItemType};

use crate::error::{BatchError, BatchResult};
use crate::ids_file::{active_addresses, TitleReference};
use crate::reconcile::{Reconciler, Reconciliation, SkipReason};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Index (into the selected references) to start from
    pub start_index: usize,
    /// Leave titles already in the store untouched
    pub skip_existing: bool,
    /// Process rows whose `IS_ACTIVE_1` is not `TRUE` too
    pub include_inactive: bool,
    /// Deactivate stored titles missing from the active rows before the run.
    /// Resumed runs (`start_index > 0`) skip it: the aborted run already swept.
    pub sweep: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            start_index: 0,
            skip_existing: false,
            include_inactive: false,
            sweep: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub index: usize,
    pub url: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub upserted: usize,
    pub skipped: Vec<SkippedItem>,
    pub fast_path_skips: usize,
    pub deactivated: u64,
}

/// References a run will walk through, in order
pub fn select_references<'a>(references: &'a [TitleReference], options: &BatchOptions) -> Vec<&'a TitleReference> {
    references
        .iter()
        .filter(|r| options.include_inactive || r.is_active)
        .collect()
}

pub async fn run_batch(
    pool: &SqlitePool,
    reconciler: &Reconciler,
    item_type: ItemType,
    references: &[TitleReference],
    options: &BatchOptions,
    expected_keys: &[String],
) -> BatchResult<BatchReport> {
    let mut report = BatchReport::default();

    if options.sweep && options.start_index == 0 {
        let active = active_addresses(references);
        report.deactivated = items::deactivate_missing(pool, item_type, &active).await?;
        info!(item_type = %item_type, deactivated = report.deactivated, "Deactivated titles missing from the ids file");
    }

    let selected = select_references(references, options);
    info!(
        item_type = %item_type,
        total = selected.len(),
        start_index = options.start_index,
        "Starting refresh batch"
    );

    for (index, reference) in selected.iter().enumerate().skip(options.start_index) {
        if options.skip_existing
            && items::skip_fast_path(pool, &reference.content_address, expected_keys)
                .await?
                .is_some()
        {
            report.fast_path_skips += 1;
            continue;
        }

        let outcome = reconciler.reconcile(reference).await.map_err(|tripped| {
            error!(
                index,
                url = %reference.canonical_url,
                "Aborting batch, resume with --start-index {}",
                index
            );
            BatchError::Aborted {
                index,
                url: reference.canonical_url.clone(),
                tripped,
            }
        })?;

        report.processed += 1;
        match outcome {
            Reconciliation::Reconciled(mut item) => {
                items::upsert_item(pool, &mut item).await?;
                report.upserted += 1;
            }
            Reconciliation::Skipped(reason) => {
                report.skipped.push(SkippedItem {
                    index,
                    url: reference.canonical_url.clone(),
                    reason,
                });
            }
        }

        if report.processed % 100 == 0 {
            info!(index, processed = report.processed, "Refresh progress");
        }
    }

    info!(
        item_type = %item_type,
        processed = report.processed,
        upserted = report.upserted,
        skipped = report.skipped.len(),
        fast_path_skips = report.fast_path_skips,
        deactivated = report.deactivated,
        "Refresh batch complete"
    );

    Ok(report)
}

/// Stored title no longer listed in the ids file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    pub content_address: String,
    /// Decoded canonical URL, `None` when the address does not decode
    pub url: Option<String>,
}

/// Stored addresses of `item_type` that no row of the ids file resolves to
pub async fn find_orphans(
    pool: &SqlitePool,
    item_type: ItemType,
    references: &[TitleReference],
) -> BatchResult<Vec<Orphan>> {
    let listed: HashSet<&str> = references.iter().map(|r| r.content_address.as_str()).collect();
    let stored = items::addresses_by_type(pool, item_type).await?;

    let orphans = stored
        .into_iter()
        .filter(|address| !listed.contains(address.as_str()))
        .map(|address| {
            let url = match content_address::reverse(&address) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(content_address = %address, error = %e, "Stored address does not decode");
                    None
                }
            };
            Orphan {
                content_address: address,
                url,
            }
        })
        .collect();

    Ok(orphans)
}
