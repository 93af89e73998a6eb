//! Intake error type.

use league::VerificationError;
use thiserror::Error;

/// Reasons a webhook delivery was not processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    /// The delivery failed signature verification; the body was not decoded.
    #[error("Webhook rejected: {0}")]
    Unauthenticated(#[from] VerificationError),

    /// The body was authentic but could not be decoded.
    #[error("Unparseable webhook body: {message}")]
    UnparseableWebhookBody {
        /// Decoder error description.
        message: String,
    },
}

impl IntakeError {
    pub(crate) fn unparseable(message: impl std::fmt::Display) -> Self {
        Self::UnparseableWebhookBody {
            message: message.to_string(),
        }
    }
}
