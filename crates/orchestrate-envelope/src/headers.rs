//! Header conventions carried across a sequence.

use std::collections::HashMap;
use uuid::Uuid;

/// Correlation id shared by every invocation of a sequence.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Marks an invocation as a fan-out descendant.
pub const FAN_OUT_HEADER: &str = "X-Fan-Out";

/// Unique per-child correlation id under a fan-out parent.
pub const CHILD_CORRELATION_ID_HEADER: &str = "X-Child-CorrelationId";

/// Count of self-invocations of the same function within one chain.
pub const CALL_DEPTH_HEADER: &str = "X-Call-Depth";

/// Mint a fresh correlation id.
pub fn mint_correlation_id() -> String {
    format!("c-{}", Uuid::new_v4())
}

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Return the inbound correlation id, minting and storing one when absent.
pub fn ensure_correlation_id(headers: &mut HashMap<String, String>) -> String {
    if let Some(existing) = header_value(headers, CORRELATION_ID_HEADER) {
        if !existing.is_empty() {
            return existing.to_string();
        }
    }
    let minted = mint_correlation_id();
    headers.insert(CORRELATION_ID_HEADER.to_string(), minted.clone());
    minted
}

/// Current call depth from the inbound headers; zero when absent or malformed.
pub fn call_depth(headers: &HashMap<String, String>) -> u32 {
    header_value(headers, CALL_DEPTH_HEADER)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_correlation_id_propagates_existing() {
        let mut headers = HashMap::new();
        headers.insert("x-correlation-id".to_string(), "c-1".to_string());

        assert_eq!(ensure_correlation_id(&mut headers), "c-1");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_ensure_correlation_id_mints_when_absent() {
        let mut headers = HashMap::new();
        let minted = ensure_correlation_id(&mut headers);

        assert!(minted.starts_with("c-"));
        assert_eq!(headers.get(CORRELATION_ID_HEADER), Some(&minted));
    }

    #[test]
    fn test_call_depth_parses_and_defaults() {
        let mut headers = HashMap::new();
        assert_eq!(call_depth(&headers), 0);

        headers.insert(CALL_DEPTH_HEADER.to_string(), "3".to_string());
        assert_eq!(call_depth(&headers), 3);

        headers.insert(CALL_DEPTH_HEADER.to_string(), "junk".to_string());
        assert_eq!(call_depth(&headers), 0);
    }
}
