//! Error types for the admission-control core.
//!
//! Input errors never reach a store. Store errors are never turned into a verdict.
//! Informational outcomes ("already whitelisted", "not found") are not errors at
//! all (see [`crate::admin`]).
use std::time::Duration;

/// Boxed driver error carried inside [`StoreError::Backend`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures raised by a bucket or access-list store.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Optimistic updates for a key kept losing races.
    #[error("store contention on key {key:?}: gave up after {attempts} attempts")]
    Contention {
        /// Bucket key being updated.
        key: String,
        /// Number of compare-and-set attempts made.
        attempts: usize,
    },
    /// A stored value could not be decoded.
    #[error("corrupt value for {key:?}: {detail}")]
    Corrupt {
        /// Key or row identifier.
        key: String,
        /// What was wrong with it.
        detail: String,
    },
    /// Error reported by a store driver.
    #[error("store backend: {0}")]
    Backend(#[source] BoxError),
}

impl StoreError {
    /// Wrap a driver error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }

    /// Check if the failure was caused by CAS contention.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }
}

/// Unified error type for the decision engine, resolver and list admin.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum BouncerError {
    /// Subnet text is not a valid CIDR.
    #[error("invalid subnet {input:?}: {reason}")]
    InvalidSubnet {
        /// Raw caller input.
        input: String,
        /// Parser message.
        reason: String,
    },
    /// IP text is not a valid address.
    #[error("invalid IP address {0:?}")]
    InvalidIp(String),
    /// Reset called without any identifier.
    #[error("IP or login must be provided")]
    MissingIdentifier,
    /// Capacity or leak rate out of range.
    #[error("invalid rate limit: {0}")]
    InvalidLimit(String),
    /// Store failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The call deadline expired before the store answered.
    #[error("operation timed out after {elapsed:?} (limit: {timeout:?})")]
    Timeout {
        /// Time spent in the call.
        elapsed: Duration,
        /// Deadline budget of the call.
        timeout: Duration,
    },
    /// The caller cancelled the call.
    #[error("operation cancelled")]
    Cancelled,
}

impl BouncerError {
    /// Check if this error was caused by caller input.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSubnet { .. }
                | Self::InvalidIp(_)
                | Self::MissingIdentifier
                | Self::InvalidLimit(_)
        )
    }

    /// Check if this error came from a store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Check if this error is due to the call deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the caller cancelled the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Borrow the store error if present.
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }

    /// Access timeout details as `(elapsed, timeout)`.
    pub fn timeout_details(&self) -> Option<(Duration, Duration)> {
        match self {
            Self::Timeout { elapsed, timeout } => Some((*elapsed, *timeout)),
            _ => None,
        }
    }

    pub(crate) fn invalid_subnet(input: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidSubnet { input: input.to_string(), reason: reason.to_string() }
    }
}
