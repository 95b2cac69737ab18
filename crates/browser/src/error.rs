//! Browser errors.

use std::time::Duration;

use webpilot_ai::AiError;
use webpilot_store::StoreError;

/// Errors from browser operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrowserError {
    /// The named tab does not exist.
    #[error("tab not found: {name}")]
    TabNotFound {
        /// The missing tab name.
        name: String,
    },

    /// A selector matched nothing (or an element action on it failed).
    #[error("selector failed: {selector} ({reason})")]
    SelectorFailed {
        /// The selector that failed.
        selector: String,
        /// Driver-specific detail.
        reason: String,
    },

    /// Navigation landed somewhere unexpected, or an operation that was
    /// expected to progress the page did not.
    #[error("navigation failed: {reason}")]
    NavigationFailed {
        /// What mismatched.
        reason: String,
    },

    /// The operation as requested is not executable.
    #[error("invalid browser operation: {reason}")]
    InvalidOperation {
        /// What was wrong.
        reason: String,
    },

    /// A browser operation exceeded its deadline.
    #[error("browser operation {op} timed out after {:?}", deadline)]
    Timeout {
        /// The operation that timed out.
        op: String,
        /// The expired deadline.
        deadline: Duration,
    },

    /// An AI page operation failed.
    #[error(transparent)]
    Ai(#[from] AiError),

    /// Persisting the browser state failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Backend-specific driver failure.
    #[error("browser driver failure: {reason}")]
    Driver {
        /// Driver-specific detail.
        reason: String,
    },
}

impl BrowserError {
    /// Whether this is a transient AI fault that bounded retry may
    /// recover. Deterministic browser failures are never retryable.
    #[must_use]
    pub fn is_transient_ai(&self) -> bool {
        matches!(self, Self::Ai(err) if err.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_ai_detection() {
        let transient = BrowserError::Ai(AiError::Transport {
            reason: "reset".into(),
        });
        assert!(transient.is_transient_ai());

        let refused = BrowserError::Ai(AiError::Refused {
            reason: "no".into(),
        });
        assert!(!refused.is_transient_ai());

        let selector = BrowserError::SelectorFailed {
            selector: "#x".into(),
            reason: "not found".into(),
        };
        assert!(!selector.is_transient_ai());
    }
}
