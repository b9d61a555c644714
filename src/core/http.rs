//! HTTP utilities for MLB Stats API communication

use crate::Result;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};

pub const USER_AGENT: &str = concat!("mlb-pitchers/", env!("CARGO_PKG_VERSION"));

const API_KEY_HEADER: &str = "x-api-key";

/// Build the default request headers, adding `X-API-Key` when a key is set.
pub fn default_header_map(api_key: Option<&str>) -> Result<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        let mut value = HeaderValue::from_str(key.trim())?;
        value.set_sensitive(true);
        h.insert(HeaderName::from_static(API_KEY_HEADER), value);
    }
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_header_map_with_key() {
        let headers = default_header_map(Some("secret-key")).unwrap();
        assert!(headers.contains_key(ACCEPT));
        assert_eq!(headers.get(API_KEY_HEADER).unwrap(), "secret-key");
        assert!(headers.get(API_KEY_HEADER).unwrap().is_sensitive());
    }

    #[test]
    fn test_default_header_map_without_key() {
        let headers = default_header_map(None).unwrap();
        assert!(headers.contains_key(ACCEPT));
        assert!(!headers.contains_key(API_KEY_HEADER));
    }

    #[test]
    fn test_default_header_map_invalid_key() {
        assert!(default_header_map(Some("bad\nkey")).is_err());
    }
}
