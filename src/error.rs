//! Error types for salon operations
//!
//! Errors are classified by how the caller should react:
//! - Retryable: the remote store or a provider was unreachable
//! - NonRetryable: missing records, invalid input, bad configuration
//! - RequiresUserAction: sign-in or role problems, declined payments,
//!   charges that went through but could not be recorded

use thiserror::Error;

use crate::auth::AuthError;
use crate::payments::PaymentError;
use crate::store::RemoteError;

/// Error type surfaced by repositories and services
#[derive(Debug, Error)]
pub enum SalonError {
    // Retryable errors
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    // Non-retryable errors
    #[error("{collection} record not found: {id}")]
    NotFound { collection: String, id: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Requires user action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Payment failed ({code}): {message}")]
    Payment { code: String, message: String },

    /// The card was charged but the payment record was not stored.
    #[error("Payment {payment_intent_id} charged but not recorded: {reason}")]
    PaymentUnrecorded {
        payment_intent_id: String,
        reason: String,
    },
}

impl SalonError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        SalonError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, SalonError::RemoteUnavailable(_))
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            SalonError::Unauthorized(_)
                | SalonError::Payment { .. }
                | SalonError::PaymentUnrecorded { .. }
        )
    }

    /// Short, human-readable notice for the person who triggered the write
    pub fn user_message(&self) -> String {
        match self {
            SalonError::RemoteUnavailable(_) => {
                "We couldn't reach the booking system. Please try again.".to_string()
            }
            SalonError::NotFound { collection, .. } => match collection.as_str() {
                "appointments" => "Appointment not found.".to_string(),
                "customers" => "Customer not found.".to_string(),
                "payments" => "Payment not found.".to_string(),
                _ => "That record no longer exists.".to_string(),
            },
            SalonError::ValidationFailed(msg) => format!("Please check the form: {}", msg),
            SalonError::Configuration(_) => {
                "The site is not configured correctly. Please contact the salon.".to_string()
            }
            SalonError::Unauthorized(_) => "Please log in to continue.".to_string(),
            SalonError::Payment { message, .. } => format!("Payment failed: {}", message),
            SalonError::PaymentUnrecorded {
                payment_intent_id, ..
            } => format!(
                "Your payment went through but we couldn't save it. Please don't pay again; \
                 quote reference {} to the salon.",
                payment_intent_id
            ),
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SalonError::RemoteUnavailable(_) => "Check your internet connection and try again.",
            SalonError::NotFound { .. } => "Refresh the page to load the latest records.",
            SalonError::ValidationFailed(_) => "Fill in the missing fields and submit again.",
            SalonError::Configuration(_) => "Check the settings in ~/.salondesk/config.json",
            SalonError::Unauthorized(_) => "Sign in with an account that has access.",
            SalonError::Payment { .. } => "Try another card or pay at the salon.",
            SalonError::PaymentUnrecorded { .. } => "Contact the salon with your payment reference.",
        }
    }
}

impl From<RemoteError> for SalonError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound { collection, id } => SalonError::NotFound { collection, id },
            RemoteError::Unavailable(msg) => SalonError::RemoteUnavailable(msg),
            RemoteError::PermissionDenied(msg) => SalonError::Unauthorized(msg),
            RemoteError::Rejected(msg) => SalonError::ValidationFailed(msg),
        }
    }
}

impl From<AuthError> for SalonError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unavailable(msg) => SalonError::RemoteUnavailable(msg),
            other => SalonError::Unauthorized(other.to_string()),
        }
    }
}

impl From<PaymentError> for SalonError {
    fn from(err: PaymentError) -> Self {
        SalonError::Payment {
            code: err.code,
            message: err.message,
        }
    }
}

/// Serializable notice for a failed write, shown to the user
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresUserAction,
}

impl From<&SalonError> for ErrorNotice {
    fn from(err: &SalonError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        ErrorNotice {
            message: err.user_message(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
