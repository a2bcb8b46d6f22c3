//! Error vocabulary for operations that can genuinely fail.
//!
//! Most of this crate never returns `Err`: bottom and top are ordinary
//! values, not error conditions (see `domain::AbstractDomain`). This module
//! covers only the handful of [`crate::bitvector::BitNumber`] operations
//! where the spec calls for a distinguishable failure rather than a
//! saturating result.

use thiserror::Error;

/// Failure modes of the signed/unsigned division and remainder operations
/// on [`crate::bitvector::BitNumber`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DomainError {
    #[error("division by zero")]
    DivByZero,
    #[error("signed overflow: {dividend} / {divisor}")]
    SignedDivOverflow { dividend: i64, divisor: i64 },
}
