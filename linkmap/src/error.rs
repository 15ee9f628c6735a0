//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Structural failures of a list operation.
///
/// Every variant leaves the list exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    /// An insert named a key that is already present.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// An adjacent insert named an anchor key that is not present.
    #[error("target not found: {0}")]
    TargetNotFound(String),

    /// An update named a key that is not present.
    #[error("data not found: {0}")]
    DataNotFound(String),

    /// The operation exists in the API but has no implementation.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

/// Result alias for list operations.
pub type Result<T> = std::result::Result<T, ListError>;

/// Failure loading a [`ListConfig`](crate::ListConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {field} = {value} exceeds the maximum of {max}")]
    OutOfRange {
        field: &'static str,
        value: usize,
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_key() {
        assert_eq!(
            ListError::DuplicateKey("x".into()).to_string(),
            "duplicate key: x"
        );
        assert_eq!(
            ListError::TargetNotFound("missing".into()).to_string(),
            "target not found: missing"
        );
        assert_eq!(
            ListError::DataNotFound("k".into()).to_string(),
            "data not found: k"
        );
        assert_eq!(
            ListError::NotImplemented("sort").to_string(),
            "sort is not implemented"
        );
    }
}
