//! Error types for concierge-core

use thiserror::Error;

/// Shown by front-ends for any failure other than cancellation.
pub const FALLBACK_MESSAGE: &str = "Our assistant is taking a short break. \
You can still reach us on WhatsApp and we'll take your order from there.";

/// Chat client error type
#[derive(Debug, Error)]
pub enum ChatError {
    /// Every gateway candidate failed its health probe
    #[error("no chat gateway is available")]
    NoGatewayAvailable,

    /// The chat-completions call returned a non-2xx status
    #[error("gateway error ({status}): {message}")]
    Gateway { status: u16, message: String },

    /// The request could not be delivered to the gateway
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was missing, broke off, or carried no content
    #[error("stream error: {0}")]
    Stream(String),

    /// The caller cancelled the call
    #[error("cancelled")]
    Cancelled,
}

impl ChatError {
    /// Cancellation is not a failure; front-ends suppress the error message for it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }

    /// Errors caused by the gateway being unreachable or refusing the request.
    pub fn is_gateway_failure(&self) -> bool {
        matches!(
            self,
            ChatError::NoGatewayAvailable | ChatError::Gateway { .. } | ChatError::Transport(_)
        )
    }

    /// User-facing text for this error, `None` when nothing should be shown.
    pub fn fallback_message(&self) -> Option<&'static str> {
        if self.is_cancelled() {
            None
        } else {
            Some(FALLBACK_MESSAGE)
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(ChatError::Cancelled.is_cancelled());
        assert!(!ChatError::Cancelled.is_gateway_failure());
        assert!(ChatError::Cancelled.fallback_message().is_none());
    }

    #[test]
    fn test_gateway_failures_grouped() {
        let err = ChatError::Gateway {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert!(err.is_gateway_failure());
        assert!(ChatError::NoGatewayAvailable.is_gateway_failure());
        assert!(!ChatError::Stream("eof".to_string()).is_gateway_failure());
        assert_eq!(err.fallback_message(), Some(FALLBACK_MESSAGE));
    }

    #[test]
    fn test_display_carries_server_message() {
        let err = ChatError::Gateway {
            status: 429,
            message: "Rate limit reached".to_string(),
        };
        assert_eq!(err.to_string(), "gateway error (429): Rate limit reached");
    }
}
