//! Item store operations
//!
//! The ingest batch is the only writer. Every write is a single statement or a
//! single transaction, so readers never see a half-written item.

use chrono::Utc;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::{CanonicalItem, ItemType, Result, Status};

/// Insert or replace an item by content address.
///
/// Refreshes `updated_at` on the item before writing it.
pub async fn upsert_item(pool: &SqlitePool, item: &mut CanonicalItem) -> Result<()> {
    item.updated_at = Utc::now();
    let document = serde_json::to_string(item)?;

    sqlx::query(
        r#"
        INSERT INTO items (
            content_address, external_id, item_type, allocine_id, title,
            is_active, status, seasons_number, document, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(content_address) DO UPDATE SET
            external_id = excluded.external_id,
            item_type = excluded.item_type,
            allocine_id = excluded.allocine_id,
            title = excluded.title,
            is_active = excluded.is_active,
            status = excluded.status,
            seasons_number = excluded.seasons_number,
            document = excluded.document,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&item.content_address)
    .bind(item.external_id)
    .bind(item.item_type.as_str())
    .bind(item.allocine_id())
    .bind(&item.title)
    .bind(item.is_active)
    .bind(item.status.map(|s| s.as_str()))
    .bind(item.seasons_number.map(i64::from))
    .bind(&document)
    .bind(item.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    debug!(content_address = %item.content_address, title = %item.title, "Upserted item");
    Ok(())
}

pub async fn load_item(pool: &SqlitePool, content_address: &str) -> Result<Option<CanonicalItem>> {
    let document: Option<String> =
        sqlx::query_scalar("SELECT document FROM items WHERE content_address = ?")
            .bind(content_address)
            .fetch_optional(pool)
            .await?;

    document
        .map(|d| serde_json::from_str::<CanonicalItem>(&d).map_err(Into::into))
        .transpose()
}

/// Stored item for a TMDB id, if any
pub async fn find_by_external_id(
    pool: &SqlitePool,
    item_type: ItemType,
    external_id: i64,
) -> Result<Option<CanonicalItem>> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT content_address, document FROM items WHERE item_type = ? AND external_id = ? ORDER BY content_address LIMIT 1",
    )
    .bind(item_type.as_str())
    .bind(external_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|(address, document)| decode_served(&address, &document)))
}

/// Decode a document for a read path; a row that no longer decodes is left out
fn decode_served(content_address: &str, document: &str) -> Option<CanonicalItem> {
    match serde_json::from_str(document) {
        Ok(item) => Some(item),
        Err(e) => {
            warn!(content_address = %content_address, error = %e, "Skipping stored document that no longer decodes");
            None
        }
    }
}

/// Every stored content address of a type
pub async fn addresses_by_type(pool: &SqlitePool, item_type: ItemType) -> Result<Vec<String>> {
    let addresses = sqlx::query_scalar(
        "SELECT content_address FROM items WHERE item_type = ? ORDER BY content_address",
    )
    .bind(item_type.as_str())
    .fetch_all(pool)
    .await?;

    Ok(addresses)
}

/// Deactivate every stored item of `item_type` whose address is not in `active`.
///
/// Returns the number of items touched. Runs in one transaction.
pub async fn deactivate_missing(
    pool: &SqlitePool,
    item_type: ItemType,
    active: &HashSet<String>,
) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT content_address, document FROM items WHERE item_type = ?")
            .bind(item_type.as_str())
            .fetch_all(&mut *tx)
            .await?;

    let mut deactivated = 0u64;
    for (address, document) in rows {
        if active.contains(&address) {
            continue;
        }

        let mut item: CanonicalItem = serde_json::from_str(&document)?;
        item.deactivate();

        sqlx::query("UPDATE items SET is_active = 0, document = ? WHERE content_address = ?")
            .bind(serde_json::to_string(&item)?)
            .bind(&address)
            .execute(&mut *tx)
            .await?;

        deactivated += 1;
    }

    tx.commit().await?;
    Ok(deactivated)
}

/// Stored item eligible for the skip-existing fast path.
///
/// The stored document's top-level keys are compared with `expected_keys`;
/// a mismatch is logged but does not prevent the skip. A document that no
/// longer decodes is reported as absent so that it gets re-ingested.
pub async fn skip_fast_path(
    pool: &SqlitePool,
    content_address: &str,
    expected_keys: &[String],
) -> Result<Option<CanonicalItem>> {
    let document: Option<String> =
        sqlx::query_scalar("SELECT document FROM items WHERE content_address = ?")
            .bind(content_address)
            .fetch_optional(pool)
            .await?;

    let Some(document) = document else {
        return Ok(None);
    };

    let value: Value = serde_json::from_str(&document)?;
    let mismatch = key_mismatch(&value, expected_keys);
    if !mismatch.is_empty() {
        warn!(
            content_address = %content_address,
            missing = ?mismatch.missing,
            unexpected = ?mismatch.unexpected,
            "Stored document keys differ from expected keys"
        );
    }

    match serde_json::from_value(value) {
        Ok(item) => Ok(Some(item)),
        Err(e) => {
            warn!(content_address = %content_address, error = %e, "Stored document no longer decodes");
            Ok(None)
        }
    }
}

/// Difference between a document's top-level keys and the expected set
#[derive(Debug, Default, PartialEq, Eq)]
pub struct KeyMismatch {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

impl KeyMismatch {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Compare a document's keys with the expected set.
///
/// Platform blocks (`allocine`, `imdb`, ...) are optional and never reported
/// as unexpected.
pub fn key_mismatch(document: &Value, expected_keys: &[String]) -> KeyMismatch {
    let Some(object) = document.as_object() else {
        return KeyMismatch {
            missing: expected_keys.to_vec(),
            unexpected: Vec::new(),
        };
    };

    let missing = expected_keys
        .iter()
        .filter(|k| !object.contains_key(k.as_str()))
        .cloned()
        .collect();

    let unexpected = object
        .keys()
        .filter(|k| !expected_keys.iter().any(|e| e == *k))
        .filter(|k| k.parse::<crate::Platform>().is_err())
        .cloned()
        .collect();

    KeyMismatch { missing, unexpected }
}

/// Season count criterion: exact values, or "at least" for the top bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeasonsMatch {
    pub exact: Vec<u32>,
    pub at_least: Option<u32>,
}

/// Criteria evaluated by the store. Empty vectors mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemMatch {
    pub external_id: Option<i64>,
    /// Restrict to these AlloCiné ids; an empty list matches nothing
    pub allocine_ids: Option<Vec<i64>>,
    pub item_types: Vec<ItemType>,
    pub is_active: Vec<bool>,
    /// `None` inside the list matches items without a status
    pub statuses: Option<Vec<Option<Status>>>,
    pub seasons: Option<SeasonsMatch>,
    /// Case-insensitive substring of the title
    pub title_contains: Option<String>,
}

/// Items satisfying every criterion, ordered by content address
pub async fn find_matching(pool: &SqlitePool, criteria: &ItemMatch) -> Result<Vec<CanonicalItem>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT content_address, document FROM items WHERE 1 = 1");

    if let Some(external_id) = criteria.external_id {
        qb.push(" AND external_id = ").push_bind(external_id);
    }

    if let Some(ids) = &criteria.allocine_ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        qb.push(" AND allocine_id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
    }

    if !criteria.item_types.is_empty() {
        qb.push(" AND item_type IN (");
        let mut separated = qb.separated(", ");
        for item_type in &criteria.item_types {
            separated.push_bind(item_type.as_str());
        }
        separated.push_unseparated(")");
    }

    if !criteria.is_active.is_empty() {
        qb.push(" AND is_active IN (");
        let mut separated = qb.separated(", ");
        for active in &criteria.is_active {
            separated.push_bind(*active);
        }
        separated.push_unseparated(")");
    }

    if let Some(statuses) = &criteria.statuses {
        let named: Vec<&'static str> = statuses.iter().flatten().map(|s| s.as_str()).collect();
        let include_null = statuses.iter().any(Option::is_none);

        qb.push(" AND (0 = 1");
        if !named.is_empty() {
            qb.push(" OR status IN (");
            let mut separated = qb.separated(", ");
            for status in named {
                separated.push_bind(status);
            }
            separated.push_unseparated(")");
        }
        if include_null {
            qb.push(" OR status IS NULL");
        }
        qb.push(")");
    }

    if let Some(seasons) = &criteria.seasons {
        qb.push(" AND (0 = 1");
        if !seasons.exact.is_empty() {
            qb.push(" OR seasons_number IN (");
            let mut separated = qb.separated(", ");
            for n in &seasons.exact {
                separated.push_bind(i64::from(*n));
            }
            separated.push_unseparated(")");
        }
        if let Some(min) = seasons.at_least {
            qb.push(" OR seasons_number >= ").push_bind(i64::from(min));
        }
        qb.push(")");
    }

    qb.push(" ORDER BY content_address");

    let rows: Vec<(String, String)> = qb.build_query_as::<(String, String)>().fetch_all(pool).await?;

    // SQLite's lower() only folds ASCII, titles are matched here instead
    let needle = criteria.title_contains.as_ref().map(|t| t.to_lowercase());

    let mut items = Vec::with_capacity(rows.len());
    for (address, document) in rows {
        let Some(item) = decode_served(&address, &document) else {
            continue;
        };
        if let Some(needle) = &needle {
            if !item.title.to_lowercase().contains(needle.as_str()) {
                continue;
            }
        }
        items.push(item);
    }

    Ok(items)
}
