//! Param extraction and splat-tail scenarios against the public `PatternRegistry` API.

use waypoint::pattern::{PatternRegistry, PatternRegistryConfig};

#[test]
fn dynamic_param_extracted_from_winning_pattern() {
    let mut registry = PatternRegistry::new(PatternRegistryConfig::default());
    for p in ["/", "/api", "/api/:version", "/api/v1"] {
        registry.register(p).unwrap();
    }

    let m = registry.find_best_match("/api/v2").unwrap();
    assert_eq!(m.pattern.normalized_pattern, "/api/:version");
    assert_eq!(m.params.get("version").map(String::as_str), Some("v2"));

    // a path that matches a registered static pattern exactly wins over the dynamic one
    let exact = registry.find_best_match("/api/v1").unwrap();
    assert_eq!(exact.pattern.normalized_pattern, "/api/v1");
    assert!(exact.params.is_empty());
}

#[test]
fn splat_absorbs_remaining_segments() {
    let mut registry = PatternRegistry::new(PatternRegistryConfig::default());
    registry.register("/files").unwrap();
    registry.register("/files/*").unwrap();

    let m = registry.find_best_match("/files/2024/reports/q1.pdf").unwrap();
    assert_eq!(m.pattern.normalized_pattern, "/files/*");
    assert_eq!(m.splat_values, vec!["2024", "reports", "q1.pdf"]);
}

#[test]
fn no_match_for_unregistered_path() {
    let mut registry = PatternRegistry::new(PatternRegistryConfig::default());
    registry.register("/known").unwrap();
    assert!(registry.find_best_match("/unknown").is_none());
}
