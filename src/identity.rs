use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Hosts that never identify a business website: social platforms, URL
/// shorteners, and the review site itself. Records pointing at these are
/// unusable for enrichment, not errors.
pub const DENY_HOSTS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "linkedin.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "youtube.com",
    "youtu.be",
    "goo.gl",
    "bit.ly",
    "tinyurl.com",
    "yelp.com",
];

const PLACEHOLDERS: &[&str] = &["", "nan", "none", "-", "null", "n/a"];

static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").unwrap());

/// Derive the canonical domain from a raw website value.
///
/// Returns `None` for blank/placeholder input, deny-listed hosts, and
/// anything that fails to parse; any parse error degrades to `None`, never an
/// error. The result is lowercase with scheme, port, and leading `www.`
/// stripped, so whitespace/case/scheme variants of the same URL all map to the
/// same identity key.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let s = raw.trim();
    if PLACEHOLDERS.contains(&s.to_ascii_lowercase().as_str()) {
        return None;
    }
    // Keep only the first whitespace-separated token; freeform cells sometimes
    // hold "example.com (under construction)".
    let s = s.split_whitespace().next()?;

    let with_scheme = if SCHEME_RE.is_match(s) {
        s.to_string()
    } else {
        format!("http://{s}")
    };

    let parsed = Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() || DENY_HOSTS.contains(&host) {
        return None;
    }
    Some(host.to_string())
}

/// Build a stable identity key from several weak fields (e.g. title, phone,
/// website) when no single field is canonical. Parts are trimmed and
/// lowercased before hashing; all-blank parts yield `None`.
pub fn composite_key(parts: &[&str]) -> Option<String> {
    let cleaned: Vec<String> = parts
        .iter()
        .map(|p| p.trim().to_lowercase())
        .collect();
    if cleaned.iter().all(|p| p.is_empty()) {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(cleaned.join("|").as_bytes());
    Some(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_case_and_www() {
        assert_eq!(
            normalize_domain("HTTP://WWW.Example.com/"),
            Some("example.com".to_string())
        );
        assert_eq!(normalize_domain("example.com"), Some("example.com".to_string()));
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(
            normalize_domain(" http://Example.org "),
            Some("example.org".to_string())
        );
    }

    #[test]
    fn deny_listed_hosts_map_to_none() {
        assert_eq!(normalize_domain("facebook.com/somepage"), None);
        assert_eq!(normalize_domain("https://www.yelp.com/biz/foo"), None);
        assert_eq!(normalize_domain("bit.ly/abc"), None);
    }

    #[test]
    fn placeholders_map_to_none() {
        for raw in ["", "  ", "n/a", "-", "NaN", "None", "null"] {
            assert_eq!(normalize_domain(raw), None, "raw={raw:?}");
        }
    }

    #[test]
    fn strips_port_and_path() {
        assert_eq!(
            normalize_domain("https://shop.example.com:8080/page?x=1"),
            Some("shop.example.com".to_string())
        );
    }

    #[test]
    fn first_token_only() {
        assert_eq!(
            normalize_domain("example.com (under construction)"),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let first = normalize_domain("HTTP://WWW.Example.com/").unwrap();
        assert_eq!(normalize_domain(&first), Some(first.clone()));
    }

    #[test]
    fn composite_key_is_stable_and_case_insensitive() {
        let a = composite_key(&["Acme Clinic", "555-0100", "acme.com"]);
        let b = composite_key(&[" acme clinic ", "555-0100", "ACME.com"]);
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_ne!(a, composite_key(&["Other Clinic", "555-0100", "acme.com"]));
    }

    #[test]
    fn composite_key_of_blanks_is_none() {
        assert_eq!(composite_key(&["", "  ", ""]), None);
    }
}
