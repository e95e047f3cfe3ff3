//! Error types for courier

/// Main error type for courier
///
/// Dispatch, listening and subscription bookkeeping never fail; errors only
/// come from turning declarative strings and config documents into specs.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// A `"channel topic"` route could not be parsed
    #[error("Invalid route '{0}': expected \"channel topic\"")]
    InvalidRoute(String),

    /// A `"topic"` or `"channel topic"` reference could not be parsed
    #[error("Invalid topic reference '{0}': expected \"topic\" or \"channel topic\"")]
    InvalidTopic(String),

    /// A messaging config document could not be read
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CourierError::InvalidRoute("Kitchen".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid route 'Kitchen': expected \"channel topic\""
        );

        let err: CourierError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, CourierError::Config(_)));
    }
}
