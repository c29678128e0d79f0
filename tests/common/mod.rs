#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use brrtbind::{Api, BindConfig, WireResponse};
use serde_json::Value;

/// Api with default configuration.
pub fn api() -> Api {
    Api::new(BindConfig::default())
}

/// Parse a problem document, checking the content type on the way.
pub fn problem(response: &WireResponse) -> Value {
    assert_eq!(
        response.get_header("content-type"),
        Some("application/problem+json"),
        "unexpected content type for {}",
        response.body_str()
    );
    response.json().expect("problem body is JSON")
}

/// `(location, message)` pairs of a problem document, in order.
pub fn entries(problem: &Value) -> Vec<(String, String)> {
    problem["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .map(|e| {
                    (
                        e["location"].as_str().unwrap_or_default().to_string(),
                        e["message"].as_str().unwrap_or_default().to_string(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Borrowing view over [`entries`] for terse assertions.
pub fn pairs(entries: &[(String, String)]) -> Vec<(&str, &str)> {
    entries
        .iter()
        .map(|(l, m)| (l.as_str(), m.as_str()))
        .collect()
}
