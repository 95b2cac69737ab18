//! AI error taxonomy.

use std::time::Duration;

/// Errors from text generation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AiError {
    /// Transient transport failure (connection reset, 5xx, ...).
    #[error("ai transport failure: {reason}")]
    Transport {
        /// Provider-specific failure detail.
        reason: String,
    },

    /// The provider rate-limited the request.
    #[error("ai rate limited{}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited {
        /// Provider-suggested wait, if any.
        retry_after: Option<Duration>,
    },

    /// The model explicitly refused the request. Never retried.
    #[error("ai refused: {reason}")]
    Refused {
        /// The refusal text.
        reason: String,
    },

    /// The call exceeded its deadline.
    #[error("ai call timed out after {:?}", deadline)]
    Timeout {
        /// The deadline that expired.
        deadline: Duration,
    },

    /// The request itself was malformed. Never retried.
    #[error("invalid ai request: {reason}")]
    InvalidRequest {
        /// What was wrong.
        reason: String,
    },
}

impl AiError {
    /// Whether bounded retry may recover this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::RateLimited { .. })
    }
}
