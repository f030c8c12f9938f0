//! Content addressing
//!
//! A title's storage key is the standard base64 encoding of its canonical source
//! URL. The mapping is pure, so re-ingesting the same URL always lands on the same
//! document, and it is invertible so stored keys can be traced back to URLs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::{Error, Result};

/// Derive the storage key for a canonical URL
pub fn resolve(canonical_url: &str) -> String {
    STANDARD.encode(canonical_url.as_bytes())
}

/// Recover the canonical URL a storage key was derived from
pub fn reverse(address: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(address)
        .map_err(|e| Error::InvalidInput(format!("Invalid content address {}: {}", address, e)))?;

    String::from_utf8(bytes)
        .map_err(|e| Error::InvalidInput(format!("Content address {} is not UTF-8: {}", address, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.allocine.fr/series/ficheserie_gen_cserie=7157.html";

    #[test]
    fn test_resolve_is_deterministic() {
        assert_eq!(resolve(URL), resolve(URL));
        assert_ne!(resolve(URL), resolve("https://www.allocine.fr/series/ficheserie_gen_cserie=7158.html"));
    }

    #[test]
    fn test_reverse_inverts_resolve() {
        assert_eq!(reverse(&resolve(URL)).unwrap(), URL);
        assert_eq!(reverse(&resolve("https://example.org/é")).unwrap(), "https://example.org/é");
    }

    #[test]
    fn test_reverse_rejects_garbage() {
        assert!(reverse("not base64 !!").is_err());
    }
}
