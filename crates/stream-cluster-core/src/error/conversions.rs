//! From implementations for error type conversions.
//!
//! Connects serializer errors from `serde_json` and `toml` to
//! [`ClusterError::Serialization`].

use super::ClusterError;

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            return ClusterError::Io(e.into());
        }
        ClusterError::Serialization(format!("JSON: {}", e))
    }
}

impl From<toml::de::Error> for ClusterError {
    fn from(e: toml::de::Error) -> Self {
        ClusterError::Serialization(format!("TOML: {}", e))
    }
}

impl From<toml::ser::Error> for ClusterError {
    fn from(e: toml::ser::Error) -> Self {
        ClusterError::Serialization(format!("TOML: {}", e))
    }
}
