//! ABOUTME: Error taxonomy shared by every kernel component
//! ABOUTME: KernelError carries a classifiable ErrorKind so retry policy stays centralized

use thiserror::Error;

/// The five error kinds from the design. This is a classification, not a
/// type hierarchy: callers route on `ErrorKind`, never on the concrete
/// `KernelError` variant, so new failure sources can be added without
/// touching retry/propagation logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network, rate-limit, timeout — retry with exponential backoff + jitter.
    Transient,
    /// Auth, validation, malformed-input, policy-violation — never retried.
    Permanent,
    /// Memory/disk/connection exhaustion — retried with doubled delay, triggers governor degrade.
    Resource,
    /// Compliance check failed — not raised, appended to the error-feedback channel.
    Policy,
    /// Cooperative cancellation — terminal.
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Resource)
    }
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("budget exhausted: used {tokens_used}/{tokens_total} tokens")]
    BudgetExhausted { tokens_used: u64, tokens_total: u64 },

    #[error("cell cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("transient error: {message}")]
    Transient { message: String },

    #[error("permanent error: {message}")]
    Permanent { message: String },

    #[error("resource exhaustion: {message}")]
    Resource { message: String },

    #[error("policy violation: {message}")]
    Policy { message: String },

    #[error("timeout after {kind}")]
    Timeout { kind: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl KernelError {
    /// Classify this error into one of the five kinds of the design.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::Cancelled { .. } => ErrorKind::Cancelled,
            KernelError::Validation { .. } | KernelError::Permanent { .. } => ErrorKind::Permanent,
            KernelError::Transient { .. } | KernelError::Timeout { .. } => ErrorKind::Transient,
            KernelError::Resource { .. } | KernelError::BudgetExhausted { .. } => {
                ErrorKind::Resource
            }
            KernelError::Policy { .. } => ErrorKind::Policy,
            KernelError::Configuration { .. }
            | KernelError::Storage { .. }
            | KernelError::Internal { .. } => ErrorKind::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exhausted_classifies_as_resource() {
        let err = KernelError::BudgetExhausted {
            tokens_used: 100,
            tokens_total: 100,
        };
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn only_transient_and_resource_are_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::Resource.is_retryable());
        assert!(!ErrorKind::Permanent.is_retryable());
        assert!(!ErrorKind::Policy.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }
}
