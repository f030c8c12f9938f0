//! Identifier file parsing
//!
//! One file per item type, comma-delimited, with the header
//! `URL,THEMOVIEDB_ID,IMDB_ID,BETASERIES_ID,METACRITIC_ID,IS_ACTIVE_1`.
//! The literal `null` marks a missing identifier.

use std::collections::HashSet;
use std::path::Path;
use tracing::debug;
use whatson_common::{content_address, ItemType};

use crate::error::{BatchError, BatchResult};

pub const IDS_FILE_HEADER: &str = "URL,THEMOVIEDB_ID,IMDB_ID,BETASERIES_ID,METACRITIC_ID,IS_ACTIVE_1";

const COLUMN_COUNT: usize = 6;

/// One row of the identifier file, resolved against the AlloCiné base URL
#[derive(Debug, Clone, PartialEq)]
pub struct TitleReference {
    pub item_type: ItemType,
    /// Path as written in the file (`/film/fichefilm_gen_cfilm=27405.html`)
    pub relative_url: String,
    pub canonical_url: String,
    pub content_address: String,
    pub allocine_id: Option<i64>,
    /// The Movie Database id; rows without one are skipped
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub betaseries_id: Option<String>,
    pub metacritic_id: Option<String>,
    pub is_active: bool,
}

/// AlloCiné id embedded in a title URL (`...cfilm=27405.html` gives 27405)
pub fn allocine_id_from_url(url: &str) -> Option<i64> {
    let (_, tail) = url.rsplit_once('=')?;
    let (id, _) = tail.split_once('.')?;
    id.parse().ok()
}

fn optional_field(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "null" {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn parse_ids(content: &str, item_type: ItemType, base_url: &str) -> BatchResult<Vec<TitleReference>> {
    let mut lines = content.lines().enumerate();

    match lines.next() {
        Some((_, header)) if header.trim() == IDS_FILE_HEADER => {}
        Some((_, header)) => {
            return Err(BatchError::Input(format!("Unexpected ids file header: {}", header.trim())));
        }
        None => return Err(BatchError::Input("Empty ids file".to_string())),
    }

    let mut references = Vec::new();
    for (line_index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }

        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() != COLUMN_COUNT {
            return Err(BatchError::Input(format!(
                "Line {}: expected {} columns, found {}",
                line_index + 1,
                COLUMN_COUNT,
                columns.len()
            )));
        }

        let relative_url = columns[0].trim().to_string();
        if relative_url.is_empty() {
            return Err(BatchError::Input(format!("Line {}: empty URL", line_index + 1)));
        }
        let canonical_url = format!("{}{}", base_url, relative_url);

        references.push(TitleReference {
            item_type,
            allocine_id: allocine_id_from_url(&relative_url),
            content_address: content_address::resolve(&canonical_url),
            canonical_url,
            relative_url,
            tmdb_id: optional_field(columns[1]).and_then(|id| id.parse().ok()),
            imdb_id: optional_field(columns[2]),
            betaseries_id: optional_field(columns[3]),
            metacritic_id: optional_field(columns[4]),
            is_active: columns[5].trim() == "TRUE",
        });
    }

    debug!(item_type = %item_type, rows = references.len(), "Parsed ids file");
    Ok(references)
}

pub fn load_ids_file(path: &Path, item_type: ItemType, base_url: &str) -> BatchResult<Vec<TitleReference>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BatchError::Input(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_ids(&content, item_type, base_url)
}

/// Content addresses of the active rows
pub fn active_addresses(references: &[TitleReference]) -> HashSet<String> {
    references
        .iter()
        .filter(|r| r.is_active)
        .map(|r| r.content_address.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.allocine.fr";

    fn sample() -> String {
        [
            IDS_FILE_HEADER,
            "/film/fichefilm_gen_cfilm=27405.html,278,tt0111161,null,the-shawshank-redemption,TRUE",
            "/series/ficheserie_gen_cserie=7157.html,1396,tt0903747,breaking-bad,null,FALSE",
            "",
            "/film/fichefilm_gen_cfilm=1.html,null,null,null,null,TRUE",
        ]
        .join("\n")
    }

    #[test]
    fn test_parse_rows() {
        let refs = parse_ids(&sample(), ItemType::Movie, BASE).unwrap();
        assert_eq!(refs.len(), 3);

        let first = &refs[0];
        assert_eq!(first.canonical_url, "https://www.allocine.fr/film/fichefilm_gen_cfilm=27405.html");
        assert_eq!(first.content_address, content_address::resolve(&first.canonical_url));
        assert_eq!(first.allocine_id, Some(27405));
        assert_eq!(first.tmdb_id, Some(278));
        assert_eq!(first.imdb_id.as_deref(), Some("tt0111161"));
        assert_eq!(first.betaseries_id, None);
        assert!(first.is_active);

        assert!(!refs[1].is_active);
        assert_eq!(refs[2].tmdb_id, None);
    }

    #[test]
    fn test_active_addresses_skip_inactive_rows() {
        let refs = parse_ids(&sample(), ItemType::Movie, BASE).unwrap();
        let active = active_addresses(&refs);
        assert_eq!(active.len(), 2);
        assert!(!active.contains(&refs[1].content_address));
    }

    #[test]
    fn test_bad_header_rejected() {
        let result = parse_ids("url,id\n/a.html,1", ItemType::Movie, BASE);
        assert!(matches!(result, Err(BatchError::Input(_))));
    }

    #[test]
    fn test_wrong_column_count_rejected() {
        let content = format!("{}\n/film/x=1.html,1,null", IDS_FILE_HEADER);
        assert!(matches!(parse_ids(&content, ItemType::Movie, BASE), Err(BatchError::Input(_))));
    }

    #[test]
    fn test_allocine_id_from_url() {
        assert_eq!(allocine_id_from_url("/series/ficheserie_gen_cserie=7157.html"), Some(7157));
        assert_eq!(allocine_id_from_url("/film/no-id.html"), None);
    }
}
