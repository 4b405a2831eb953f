//! Error taxonomy across the client boundary.
//!
//! Every provider failure is normalized into one [`LlmError`] kind so
//! callers can branch on retryability instead of vendor-specific payloads.

use thiserror::Error;

/// Provider-neutral LLM client error.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Retryable; `retry_after` is the server's backoff hint in seconds.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<f64>,
    },

    /// Retryable.
    #[error("server error: {0}")]
    ServerError(String),

    #[error("content filtered: {0}")]
    ContentFilter(String),

    #[error("context length exceeded: {0}")]
    ContextLength(String),

    #[error("quota exhausted: {0}")]
    Quota(String),

    /// Retryable.
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request aborted: {0}")]
    Aborted(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Whether the caller may retry the same request.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimit { .. } | LlmError::ServerError(_) | LlmError::Timeout(_)
        )
    }

    /// Server backoff hint, when one was provided.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            LlmError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Maps an HTTP status code to an error kind.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 | 422 => LlmError::InvalidRequest(message),
            401 => LlmError::Authentication(message),
            403 => LlmError::AccessDenied(message),
            404 => LlmError::NotFound(message),
            408 => LlmError::Timeout(message),
            413 => LlmError::ContextLength(message),
            429 => LlmError::RateLimit {
                message,
                retry_after: None,
            },
            500..=599 => LlmError::ServerError(message),
            _ => LlmError::InvalidRequest(message),
        }
    }

    /// Variant of `from_status` carrying a Retry-After hint.
    pub fn from_status_with_retry_after(
        status: u16,
        message: impl Into<String>,
        retry_after: Option<f64>,
    ) -> Self {
        match Self::from_status(status, message) {
            LlmError::RateLimit { message, .. } => LlmError::RateLimit {
                message,
                retry_after,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert!(matches!(LlmError::from_status(400, "m"), LlmError::InvalidRequest(_)));
        assert!(matches!(LlmError::from_status(422, "m"), LlmError::InvalidRequest(_)));
        assert!(matches!(LlmError::from_status(401, "m"), LlmError::Authentication(_)));
        assert!(matches!(LlmError::from_status(403, "m"), LlmError::AccessDenied(_)));
        assert!(matches!(LlmError::from_status(404, "m"), LlmError::NotFound(_)));
        assert!(matches!(LlmError::from_status(408, "m"), LlmError::Timeout(_)));
        assert!(matches!(LlmError::from_status(413, "m"), LlmError::ContextLength(_)));
        assert!(matches!(LlmError::from_status(429, "m"), LlmError::RateLimit { .. }));
        assert!(matches!(LlmError::from_status(500, "m"), LlmError::ServerError(_)));
        assert!(matches!(LlmError::from_status(503, "m"), LlmError::ServerError(_)));
    }

    #[test]
    fn retryable_kinds() {
        assert!(LlmError::from_status(429, "m").retryable());
        assert!(LlmError::from_status(500, "m").retryable());
        assert!(LlmError::from_status(408, "m").retryable());
        assert!(!LlmError::from_status(401, "m").retryable());
        assert!(!LlmError::from_status(400, "m").retryable());
    }

    #[test]
    fn retry_after_carried_on_rate_limit() {
        let err = LlmError::from_status_with_retry_after(429, "slow down", Some(1.5));
        assert_eq!(err.retry_after(), Some(1.5));
        let err = LlmError::from_status_with_retry_after(500, "oops", Some(1.5));
        assert_eq!(err.retry_after(), None);
    }
}
