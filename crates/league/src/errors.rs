//! Error and retry-policy types for the league domain.
//!
//! Each component owns its error enum: [`ScheduleError`] for input validation,
//! [`FacilityError`] for the external trigger facility port,
//! [`VerificationError`] for inbound webhook authentication. [`LeagueError`]
//! covers conditions that abort startup of the owning service.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SecretIdentity, TriggerGroup, TriggerName};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let callers decide whether to
/// re-invoke an idempotent operation (trigger upsert or cancel).
///
/// - `Retryable` errors: facility timeouts, transport failures, throttling.
/// - `NonRetryable` errors: rejected input, name conflicts, invalid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried without changing the input.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Scheduling input errors
// ---------------------------------------------------------------------------

/// One invalid field found while validating a scheduling request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProblem {
    /// Wire name of the offending field (e.g. `"seasonStartDate"`).
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl FieldProblem {
    /// Creates a new [`FieldProblem`].
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors produced before any external call is made for a scheduling request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ScheduleError {
    /// A date string matched none of the accepted formats.
    #[error("Invalid date format: '{value}' (expected YYYY-MM-DD or M/D/YY)")]
    InvalidDateFormat {
        /// The offending input string.
        value: String,
    },

    /// One or more request fields are invalid.
    ///
    /// Every problem found is reported together; validation never stops at
    /// the first one.
    #[error("Invalid schedule input: {}", join_problems(.problems))]
    InvalidScheduleInput {
        /// All field problems found, in field order.
        problems: Vec<FieldProblem>,
    },
}

fn join_problems(problems: &[FieldProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Trigger facility errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`crate::TriggerFacility`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FacilityError {
    /// A trigger with the same name already exists in the group.
    ///
    /// The facility forbids in-place mutation; the registrar deletes first.
    #[error("Trigger '{name}' already exists in group '{group}'")]
    Conflict {
        /// Trigger name.
        name: TriggerName,
        /// Trigger group.
        group: TriggerGroup,
    },

    /// The facility rejected the request as invalid.
    #[error("Facility rejected the request ({status}): {message}")]
    Rejected {
        /// Status code reported by the facility.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The facility asked the caller to slow down.
    #[error("Facility throttled the request")]
    Throttled {
        /// Suggested delay before retrying, in seconds.
        retry_after_secs: Option<u64>,
    },

    /// The facility refused the credential.
    #[error("Facility credential was refused")]
    Unauthorized,

    /// The call did not complete within the configured timeout.
    #[error("Facility call timed out after {after_ms} ms")]
    Timeout {
        /// Timeout that elapsed, in milliseconds.
        after_ms: u64,
    },

    /// Connection, TLS, or response-decoding failure.
    #[error("Facility transport error: {message}")]
    Transport {
        /// Underlying error description.
        message: String,
    },
}

impl FacilityError {
    /// Returns whether the failed call may be retried unchanged.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } | Self::Unauthorized => {
                RetryPolicy::Retryable { after: None }
            }
            Self::Throttled { retry_after_secs } => RetryPolicy::Retryable {
                after: retry_after_secs.map(Duration::from_secs),
            },
            Self::Conflict { .. } | Self::Rejected { .. } => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Webhook verification errors
// ---------------------------------------------------------------------------

/// Reasons an inbound webhook failed authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum VerificationError {
    /// The signature header was absent or empty.
    #[error("Webhook signature header is missing")]
    SignatureMissing,

    /// The timestamp header required by the timestamp-keyed scheme was absent.
    #[error("Webhook timestamp header is missing")]
    TimestampMissing,

    /// No configured secret produced the provided signature.
    #[error("Webhook signature does not match any configured secret")]
    SignatureMismatch,

    /// No secret is configured for the provider (or the named identity).
    #[error("No webhook secret configured for {provider}{}", identity_suffix(.identity))]
    SecretNotConfigured {
        /// Provider name (`"commerce"` or `"chat"`).
        provider: String,
        /// The explicitly requested identity, if any.
        identity: Option<SecretIdentity>,
    },
}

fn identity_suffix(identity: &Option<SecretIdentity>) -> String {
    identity
        .as_ref()
        .map(|i| format!(" (identity '{i}')"))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Service-level errors
// ---------------------------------------------------------------------------

/// Errors that prevent the owning service from starting.
///
/// Individual requests never produce these; they are surfaced once, at load
/// time, and the service does not start with an invalid configuration.
#[derive(Debug, Error)]
pub enum LeagueError {
    /// The service configuration is invalid or incomplete.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_problems_are_listed_in_display() {
        let err = ScheduleError::InvalidScheduleInput {
            problems: vec![
                FieldProblem::new("seasonStartDate", "invalid date format: '13/45/26'"),
                FieldProblem::new("basePrice", "must be a non-negative number"),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("seasonStartDate"));
        assert!(text.contains("basePrice"));
    }

    #[test]
    fn conflicts_are_not_retryable_but_timeouts_are() {
        let conflict = FacilityError::Conflict {
            name: TriggerName::new("price-1-tier-0").unwrap(),
            group: TriggerGroup::new("price-changes").unwrap(),
        };
        assert_eq!(conflict.retry_policy(), RetryPolicy::NonRetryable);

        let timeout = FacilityError::Timeout { after_ms: 10_000 };
        assert_eq!(timeout.retry_policy(), RetryPolicy::Retryable { after: None });

        let throttled = FacilityError::Throttled {
            retry_after_secs: Some(3),
        };
        assert_eq!(
            throttled.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(3))
            }
        );
    }
}
