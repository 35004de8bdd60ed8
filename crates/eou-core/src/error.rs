//! Error taxonomy for the ownership primitives.
//!
//! The primitives never report double release or use-after-release: the
//! move-only slot rules out the first and the second is a caller contract.
//! The ledger variants are produced only by
//! [`crate::ledger::OwnershipLedger`], which audits callers from the outside.

use thiserror::Error;

/// Errors reported by `eou-core`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EouError {
    /// An argument was rejected under [`crate::SafetyLevel::Strict`].
    #[error("{operation}: invalid argument: {reason}")]
    InvalidArgument {
        /// Operation that rejected the argument.
        operation: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// The requested size cannot be described by an allocation layout.
    #[error("size {size} with alignment {align} does not form a valid layout")]
    InvalidLayout { size: usize, align: usize },
    /// An address was handed to a second owner while the first still holds it.
    #[error("address {addr:#x} is already held by another owner")]
    AlreadyHeld { addr: usize },
    /// An address was released after its release had already been recorded.
    #[error("address {addr:#x} released twice")]
    DoubleRelease { addr: usize },
    /// An address was released that no owner ever acquired.
    #[error("address {addr:#x} released without a recorded acquisition")]
    UnknownRelease { addr: usize },
}

impl EouError {
    pub(crate) const fn invalid(operation: &'static str, reason: &'static str) -> Self {
        Self::InvalidArgument { operation, reason }
    }

    /// Returns true for the strict-mode argument rejection.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}
