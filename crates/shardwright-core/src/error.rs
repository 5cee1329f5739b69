//! Error types for Shardwright core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Model Errors
    #[error("Invalid shard range: {0}")]
    InvalidRange(String),

    #[error("Invalid state transition for {shard}: {from} -> {to}")]
    InvalidTransition {
        shard: String,
        from: String,
        to: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Inventory Errors
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Inventory error: {0}")]
    Inventory(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidRange(_) => "InvalidRange",
            Error::InvalidTransition { .. } => "InvalidTransition",
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::RecordNotFound(_) => "RecordNotFound",
            Error::Inventory(_) => "InventoryError",
            Error::Config(_) => "ConfigError",
            Error::Serialization(_) => "SerializationError",
            Error::Io(_) => "IoError",
        }
    }

    /// Whether the error was raised before anything was changed and the
    /// caller can retry after correcting its input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidRange(_) | Error::InvalidTransition { .. } | Error::InvalidArgument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::InvalidRange("gap at 500".into());
        assert_eq!(err.code(), "InvalidRange");
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Invalid shard range: gap at 500");

        let err = Error::Inventory("backend down".into());
        assert!(!err.is_validation());
    }
}
