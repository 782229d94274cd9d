//! Error types for the dataplane module

use thiserror::Error;

/// Result type alias for dataplane operations
pub type Result<T> = std::result::Result<T, DataplaneError>;

/// Comprehensive error types for dataplane operations
#[derive(Error, Debug)]
pub enum DataplaneError {
    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source unavailable: {source_name} - {message}")]
    SourceUnavailable { source_name: String, message: String },

    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Invalid market record: {message}")]
    InvalidMarket { message: String },

    #[error("Invalid position: {message}")]
    InvalidPosition { message: String },

    #[error("Price unavailable for asset: {0}")]
    PriceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DataplaneError {
    /// Create a new source unavailable error
    pub fn source_unavailable<S: Into<String>>(source_name: S, message: S) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid market error
    pub fn invalid_market<S: Into<String>>(message: S) -> Self {
        Self::InvalidMarket {
            message: message.into(),
        }
    }

    /// Create a new invalid position error
    pub fn invalid_position<S: Into<String>>(message: S) -> Self {
        Self::InvalidPosition {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataplaneError::SourceUnavailable { .. }
                | DataplaneError::Timeout { .. }
                | DataplaneError::Io(_)
        )
    }

    /// Get the error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            DataplaneError::InvalidChain(_) => "validation",
            DataplaneError::Config(_) => "config",
            DataplaneError::Serialization(_) => "serialization",
            DataplaneError::Yaml(_) => "serialization",
            DataplaneError::Io(_) => "io",
            DataplaneError::SourceUnavailable { .. } => "source",
            DataplaneError::Timeout { .. } => "timeout",
            DataplaneError::InvalidMarket { .. } => "validation",
            DataplaneError::InvalidPosition { .. } => "validation",
            DataplaneError::PriceUnavailable(_) => "price",
            DataplaneError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DataplaneError::source_unavailable("aave", "rpc down").is_retryable());
        assert!(DataplaneError::Timeout {
            operation: "markets".into(),
            timeout_ms: 10
        }
        .is_retryable());
        assert!(!DataplaneError::invalid_market("utilization > 1").is_retryable());
        assert!(!DataplaneError::PriceUnavailable("WETH".into()).is_retryable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(DataplaneError::internal("x").category(), "internal");
        assert_eq!(
            DataplaneError::PriceUnavailable("USDC".into()).category(),
            "price"
        );
    }
}
