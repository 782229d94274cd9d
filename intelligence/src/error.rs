//! Error types for the yield engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, IntelligenceError>;

/// Errors raised by the decision layer.
///
/// Low yield, high risk and empty results are data, not errors. Only bad
/// configuration, bad caller input and infrastructure faults surface here.
#[derive(Error, Debug)]
pub enum IntelligenceError {
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Dataplane error: {0}")]
    Dataplane(#[from] yieldwise_dataplane::DataplaneError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Execution error: {message}")]
    Execution { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntelligenceError {
    /// Create an invalid configuration error
    pub fn invalid_config<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution<S: Into<String>>(message: S) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            IntelligenceError::Dataplane(e) => e.is_retryable(),
            IntelligenceError::Io(_) | IntelligenceError::Execution { .. } => true,
            _ => false,
        }
    }

    /// Error category for logs and metrics labels
    pub fn category(&self) -> &'static str {
        match self {
            IntelligenceError::InvalidConfig { .. } | IntelligenceError::Config(_) => "config",
            IntelligenceError::InvalidInput { .. } => "input",
            IntelligenceError::Dataplane(_) => "dataplane",
            IntelligenceError::Serialization(_) | IntelligenceError::Yaml(_) => "serialization",
            IntelligenceError::Io(_) => "io",
            IntelligenceError::Execution { .. } => "execution",
            IntelligenceError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yieldwise_dataplane::DataplaneError;

    #[test]
    fn test_invalid_config_message() {
        let err = IntelligenceError::invalid_config("max_slippage", "must be within [0, 100]");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: max_slippage - must be within [0, 100]"
        );
        assert_eq!(err.category(), "config");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_dataplane_errors_keep_retryability() {
        let err: IntelligenceError =
            DataplaneError::source_unavailable("aave_v3", "connection reset").into();
        assert!(err.is_retryable());
        assert_eq!(err.category(), "dataplane");

        let err: IntelligenceError = DataplaneError::invalid_market("bad utilization").into();
        assert!(!err.is_retryable());
    }
}
