//! Error types for referral bridge operations
//!
//! This module defines every error that can surface while building, sending,
//! receiving or materializing a referral message.

use thiserror::Error;

/// Referral bridge error types
///
/// All operations in this library return `Result<T, ReferralError>`. Every
/// variant is recoverable at the call boundary; none is process-fatal.
#[derive(Error, Debug)]
pub enum ReferralError {
    /// An outbound message could not be built from the given record
    ///
    /// This error occurs when:
    /// - A required patient field (identifier, email, a name) is empty
    /// - A value contains a segment terminator (CR or LF), which cannot be escaped
    ///
    /// Nothing was written to the wire when this error is returned.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Raw bytes could not be decoded into a clinical message
    ///
    /// This error occurs when:
    /// - The header segment is missing or not the first segment
    /// - The delimiter declaration is malformed
    /// - The input is truncated (last segment not terminated)
    /// - A mandatory segment (e.g. demographics) is absent
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// A decoded field is semantically incomplete or invalid
    ///
    /// # Example
    /// ```no_run
    /// # use clinic_referral::error::ReferralError;
    /// let err = ReferralError::Validation {
    ///     field: "email",
    ///     reason: "required field is empty".to_string(),
    /// };
    /// ```
    #[error("Validation error on `{field}`: {reason}")]
    Validation {
        /// Name of the offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// The remote could not be reached or replied with something unreadable
    ///
    /// Delivery is unknown: the referral may or may not have arrived.
    #[error("Transport failed: {0}")]
    TransportFailed(String),

    /// The remote received the referral and declined it
    ///
    /// Carries the remote-reported error text verbatim.
    #[error("Referral rejected: {0}")]
    Rejected(String),

    /// An inbound record collides with an existing one on its identity field
    #[error("Patient already exists: {identity}")]
    DuplicateRecord {
        /// The identity (email) that already exists in the store
        identity: String,
    },

    /// Failure reported by the external patient store, propagated unchanged
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Frame payload exceeds the configured maximum
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Bytes buffered so far
        size: usize,
        /// Configured maximum payload size
        max: usize,
    },

    /// I/O error on the listener side (bind, accept, read, write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of failure reported by a [`PatientStore`](crate::store::PatientStore)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The store's uniqueness constraint on the identity field was violated
    UniqueViolation,
    /// The store could not be reached
    Unavailable,
    /// Anything else
    Other,
}

/// Opaque error from the external patient store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Store error ({kind:?}): {message}")]
pub struct StoreError {
    /// Failure category
    pub kind: StoreErrorKind,
    /// Store-provided description
    pub message: String,
}

impl StoreError {
    /// Create a store error of the given kind
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        StoreError {
            kind,
            message: message.into(),
        }
    }

    /// Uniqueness constraint violation on the identity field
    pub fn unique_violation(identity: &str) -> Self {
        Self::new(
            StoreErrorKind::UniqueViolation,
            format!("identity `{}` already exists", identity),
        )
    }
}

/// Result type alias for referral operations
pub type Result<T> = std::result::Result<T, ReferralError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_transparent() {
        let store_err = StoreError::new(StoreErrorKind::Unavailable, "connection refused");
        let err: ReferralError = store_err.clone().into();
        assert_eq!(err.to_string(), store_err.to_string());
        assert!(matches!(err, ReferralError::Store(e) if e == store_err));
    }

    #[test]
    fn test_duplicate_message() {
        let err = ReferralError::DuplicateRecord {
            identity: "j@d.com".to_string(),
        };
        assert_eq!(err.to_string(), "Patient already exists: j@d.com");
    }
}
