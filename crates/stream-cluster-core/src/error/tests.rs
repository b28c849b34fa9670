//! Tests for error module.

use super::*;

// ========== Classification ==========

#[test]
fn test_is_recoverable() {
    // Recoverable errors
    assert!(ClusterError::parse(4, "bad token").is_recoverable());
    assert!(ClusterError::numeric_anomaly("ss overflow").is_recoverable());

    // Fatal errors
    assert!(!ClusterError::invalid_parameter("threshold").is_recoverable());
    assert!(!ClusterError::dimension_mismatch(2, 3).is_recoverable());
    assert!(!ClusterError::invalid_state("done").is_recoverable());
    assert!(!ClusterError::corrupt_snapshot("root").is_recoverable());
    assert!(!ClusterError::Serialization("x".to_string()).is_recoverable());

    let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
    assert!(!ClusterError::from(io).is_recoverable());

    println!("[PASS] Error taxonomy classified correctly");
}

// ========== Messages ==========

#[test]
fn test_error_messages_name_the_problem() {
    let e = ClusterError::parse(12, "invalid float literal 'abc'");
    assert_eq!(
        e.to_string(),
        "Parse error at record 12: invalid float literal 'abc'"
    );

    let e = ClusterError::invalid_parameter("branching_factor must be >= 2, got 1");
    assert!(e.to_string().contains("branching_factor"));

    let e = ClusterError::dimension_mismatch(128, 64);
    assert!(e.to_string().contains("128"));
    assert!(e.to_string().contains("64"));

    println!("[PASS] Error messages carry context");
}

// ========== Conversions ==========

#[test]
fn test_json_error_converts_to_serialization() {
    let err = serde_json::from_str::<Vec<f64>>("[1.0,").unwrap_err();
    let converted: ClusterError = err.into();
    assert!(
        matches!(converted, ClusterError::Serialization(ref m) if m.starts_with("JSON")),
        "expected Serialization, got {:?}",
        converted
    );
}

#[test]
fn test_toml_error_converts_to_serialization() {
    let err = toml::from_str::<toml::Table>("threshold = = 1").unwrap_err();
    let converted: ClusterError = err.into();
    assert!(matches!(converted, ClusterError::Serialization(ref m) if m.starts_with("TOML")));
}
