//! Crate-level and domain error types.
//!
//! `TextLedgerError` is the coarse error surface the embedding application
//! sees; `SmsError` carries the structured detail callers need to act on a
//! failure (shortfall amounts, gateway detail, duplicate references).

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TextLedgerError>;

/// The main error type for textledger operations.
#[derive(Debug, thiserror::Error)]
pub enum TextLedgerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Domain errors for credit accounting and SMS delivery.
///
/// Validation and balance errors are detected before any external call and
/// carry the structured data a caller needs (required/available/shortfall),
/// not just a message. SMS gateway failures and replayed payment references
/// are deliberately absent: those surface as result values
/// (`DispatchOutcome`, `ReconcileOutcome`), not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsError {
    /// Malformed input: empty message, no recipients.
    InvalidRequest { reason: String },
    /// Every supplied recipient failed phone validation.
    NoValidRecipients { supplied: usize },
    /// The organization has no approved sender id configured.
    MissingSenderId { organization_id: String },
    /// The balance cannot cover the send.
    InsufficientBalance {
        required: u64,
        available: u64,
        shortfall: u64,
    },
    /// The payment gateway did not report a successful payment.
    VerificationFailed { reference: String, status: String },
    /// The payment metadata names a bundle missing from the catalog.
    UnknownBundle { bundle_id: String },
    /// The payment gateway API call itself failed.
    PaymentApiError {
        operation: String,
        message: String,
        http_status: Option<u16>,
    },
    /// An unexpected internal error.
    Internal { message: String },
}

impl fmt::Display for SmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { reason } => {
                write!(f, "Invalid request: {}", reason)
            }
            Self::NoValidRecipients { supplied } => {
                write!(f, "None of the {} supplied recipients is a valid phone number", supplied)
            }
            Self::MissingSenderId { organization_id } => {
                write!(f, "Organization '{}' has no approved sender id", organization_id)
            }
            Self::InsufficientBalance { required, available, shortfall } => {
                write!(
                    f,
                    "Insufficient SMS balance: {} units required, {} available ({} short)",
                    required, available, shortfall
                )
            }
            Self::VerificationFailed { reference, status } => {
                write!(f, "Payment '{}' verification failed with status '{}'", reference, status)
            }
            Self::UnknownBundle { bundle_id } => {
                write!(f, "Unknown credit bundle: {}", bundle_id)
            }
            Self::PaymentApiError { operation, message, http_status } => {
                write!(f, "Payment gateway error during '{}': {}", operation, message)?;
                if let Some(status) = http_status {
                    write!(f, " [HTTP {}]", status)?;
                }
                Ok(())
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for SmsError {}

impl From<SmsError> for TextLedgerError {
    fn from(err: SmsError) -> Self {
        match &err {
            SmsError::InvalidRequest { .. }
            | SmsError::NoValidRecipients { .. }
            | SmsError::MissingSenderId { .. }
            | SmsError::UnknownBundle { .. } => TextLedgerError::BadRequest(err.to_string()),

            SmsError::InsufficientBalance { .. } | SmsError::VerificationFailed { .. } => {
                TextLedgerError::Forbidden(err.to_string())
            }

            SmsError::PaymentApiError { http_status, .. } => match http_status {
                Some(429) | Some(500..=599) | None => {
                    TextLedgerError::ServiceUnavailable(err.to_string())
                }
                Some(400..=499) => TextLedgerError::BadRequest(err.to_string()),
                _ => TextLedgerError::Internal(err.to_string()),
            },

            SmsError::Internal { .. } => TextLedgerError::Internal(err.to_string()),
        }
    }
}

impl SmsError {
    /// Check if this is a client error (caller can fix the request).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidRequest { .. }
            | Self::NoValidRecipients { .. }
            | Self::MissingSenderId { .. }
            | Self::InsufficientBalance { .. }
            | Self::UnknownBundle { .. }
            | Self::VerificationFailed { .. } => true,
            Self::PaymentApiError { http_status, .. } => {
                matches!(http_status, Some(400..=499))
            }
            _ => false,
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PaymentApiError { http_status, .. } => {
                matches!(http_status, Some(429) | Some(500..=599) | None)
            }
            _ => false,
        }
    }
}
