use std::time::Duration;

use http::StatusCode;
use prism_core::HttpError;
use thiserror::Error;

/// Errors that can occur while serving a chat completion
#[derive(Debug, Error)]
pub enum LlmError {
    /// Invalid provider or alias setup, detected at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Client sent a malformed or invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider call exceeded its deadline
    #[error("provider {provider} did not answer within {after:?}")]
    UpstreamTimeout { provider: &'static str, after: Duration },

    /// Upstream provider returned an error
    #[error("upstream error: {0}")]
    Upstream(String),

    /// No call slot became free within the queue timeout
    #[error("too many concurrent calls to {provider}")]
    Overloaded { provider: &'static str },

    /// Provider lacks the requested capability
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Upstream failed after streaming began
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) | Self::Streaming(_) => StatusCode::BAD_GATEWAY,
            Self::Overloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::UpstreamTimeout { .. } => "timeout_error",
            Self::Upstream(_) => "upstream_error",
            Self::Overloaded { .. } => "overloaded_error",
            Self::Unsupported(_) => "unsupported_error",
            Self::Streaming(_) => "streaming_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) | Self::Configuration(_) => "an internal error occurred".to_owned(),
            Self::UpstreamTimeout { .. } => "the upstream provider timed out".to_owned(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_gateway_timeout_with_generic_message() {
        let err = LlmError::UpstreamTimeout {
            provider: "gemini",
            after: Duration::from_secs(30),
        };

        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.error_type(), "timeout_error");
        assert_eq!(err.client_message(), "the upstream provider timed out");
    }

    #[test]
    fn upstream_failure_is_bad_gateway() {
        let err = LlmError::Upstream("provider returned 500".to_owned());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = LlmError::Internal(anyhow::anyhow!("join error: task panicked"));
        assert_eq!(err.client_message(), "an internal error occurred");
    }

    #[test]
    fn validation_is_client_error() {
        let err = LlmError::InvalidRequest("messages must not be empty".to_owned());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "invalid request: messages must not be empty");
    }
}
