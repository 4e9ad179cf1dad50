//! Error types for the reverse-communication eigensolver.
//!
//! Two kinds of failure exist and are kept apart on purpose. Configuration
//! faults ([`ConfigFault`]) belong to the reverse-communication protocol
//! itself: they are detected on the first driver call and reported through the
//! terminal [`Exit`](crate::state::Exit) code, exactly like every other way of
//! leaving the iteration. The convenience layer in [`crate::solvers`] then
//! maps the unrecoverable exits onto [`EigsError`].
//!
//! Built with [`thiserror`]. Note that [`faer::linalg::evd::EvdError`] does
//! not implement the standard [`std::error::Error`] trait, so it is carried by
//! value and rendered through its `Debug` form.

use thiserror::Error;

use crate::config::Which;
use crate::state::Exit;

/// A configuration fault detected when the driver is first entered.
///
/// These correspond to the classic ARPACK negative `INFO` codes: the
/// dimension relationships and the sort criterion are checked once, before any
/// iteration work, and never re-checked mid-flight.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFault {
    /// The problem dimension `n` must be positive.
    #[error("problem dimension n must be positive")]
    ZeroDimension,

    /// The requested eigenvalue count is out of range.
    #[error("nev must satisfy 1 <= nev < ncv, got nev = {nev}")]
    BadNev { nev: usize },

    /// The Krylov basis size leaves no room for an implicit restart.
    #[error(
        "ncv must satisfy nev + 2 <= ncv <= n (restart headroom), got nev = {nev}, ncv = {ncv}, n = {n}"
    )]
    InsufficientHeadroom { nev: usize, ncv: usize, n: usize },

    /// At least one outer iteration must be allowed.
    #[error("max_iter must be positive")]
    ZeroMaxIter,

    /// Imaginary-part sort criteria are meaningless for symmetric operators.
    #[error("sort criterion {which:?} requires a general (non-symmetric) operator")]
    WhichNeedsGeneralOperator { which: Which },

    /// The caller-supplied starting vector has zero norm.
    #[error("the supplied starting vector must not be zero")]
    ZeroStartVector,

    /// The supplied starting vector does not have length `n`.
    #[error("the supplied starting vector has length {got}, expected n = {n}")]
    StartVectorLength { got: usize, n: usize },

    /// The basis or workspace buffers have the wrong shape.
    #[error("the basis buffer must be n x ncv and the workspace n x 3")]
    BadWorkspace,
}

/// Errors surfaced by the high-level [`crate::solvers`] drivers.
///
/// Non-convergence and breakdown are deliberately *not* listed here: both are
/// recoverable outcomes that still carry partial results, so the solvers
/// return them as data rather than as errors.
#[derive(Error, Debug)]
pub enum EigsError {
    /// The configuration was rejected before any iteration was performed.
    #[error(transparent)]
    Config(#[from] ConfigFault),

    /// The delegated dense eigendecomposition of the projected matrix failed.
    #[error("eigendecomposition of the projected matrix failed: {0:?}")]
    ProjectedEvd(faer::linalg::evd::EvdError),

    /// The driver terminated in a state the convenience layer cannot
    /// interpret. Generalized problems and user-supplied shifts require the
    /// raw reverse-communication interface instead.
    #[error("the driver finished in a state outside the convenience layer: {0:?}")]
    UnexpectedExit(Exit),
}
