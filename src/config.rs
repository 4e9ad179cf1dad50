//! Solver configuration: problem shape, sort criterion and tuning knobs.
//!
//! Everything here is set before the first driver call and read-only
//! afterwards. Validation happens once, on the first call, and violations are
//! reported as [`ConfigFault`]s through the terminal exit code rather than
//! mid-iteration checks.

use faer::traits::RealField;
use num_traits::Float;

use crate::error::ConfigFault;

/// Which end of the spectrum the caller wants, and measured how.
///
/// The imaginary-part criteria only make sense for general (non-symmetric)
/// operators and are rejected at setup otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    /// The `nev` eigenvalues of largest magnitude.
    LargestMagnitude,
    /// The `nev` eigenvalues of smallest magnitude.
    SmallestMagnitude,
    /// The `nev` eigenvalues of largest real part.
    LargestReal,
    /// The `nev` eigenvalues of smallest real part.
    SmallestReal,
    /// The `nev` eigenvalues of largest imaginary part.
    LargestImaginary,
    /// The `nev` eigenvalues of smallest imaginary part.
    SmallestImaginary,
}

/// Standard problem `A x = lambda x` or generalized problem
/// `A x = lambda B x`.
///
/// In generalized mode every candidate basis vector is additionally passed
/// through the `B` operator (the `BOp` suspension) and orthogonality is
/// measured in the `B` inner product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    Standard,
    Generalized,
}

/// Whether the operator is symmetric (Lanczos recurrence, real Ritz values)
/// or general (Arnoldi recurrence, complex Ritz values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSymmetry {
    Symmetric,
    General,
}

/// How implicit-restart shifts are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftPolicy {
    /// Exact shifts: the unwanted Ritz values of the current projected
    /// matrix. This is the recommended default.
    Exact,
    /// The caller supplies shifts through the `UserShift` suspension.
    Supplied,
}

/// Read-only configuration for one solve.
///
/// `T` is the real scalar type of the problem (`f32` or `f64`).
#[derive(Debug, Clone)]
pub struct IramConfig<T> {
    /// Problem dimension.
    pub n: usize,
    /// Number of eigenpairs requested. `1 <= nev` and `nev + 2 <= ncv`.
    pub nev: usize,
    /// Krylov basis dimension maintained across restarts. `ncv <= n`.
    pub ncv: usize,
    /// Sort criterion selecting the wanted end of the spectrum.
    pub which: Which,
    /// Standard or generalized eigenproblem.
    pub kind: ProblemKind,
    /// Symmetric (Lanczos) or general (Arnoldi) operator.
    pub symmetry: OperatorSymmetry,
    /// Relative convergence tolerance. Zero (or negative) selects the
    /// machine-precision automatic mode.
    pub tol: T,
    /// Maximum number of outer (restart) iterations.
    pub max_iter: usize,
    /// Exact or caller-supplied implicit shifts.
    pub shifts: ShiftPolicy,
    /// Re-orthogonalization trigger: a correction pass runs whenever the
    /// residual norm drops below `reorth_threshold` times the candidate norm.
    /// The default 0.717 is the classic DGKS constant.
    pub reorth_threshold: T,
    /// How many consecutive caller-supplied random vectors may fail to yield
    /// a usable direction before the basis extension is declared broken down.
    pub max_random_restarts: usize,
}

impl<T: RealField + Float> IramConfig<T> {
    /// A configuration with the documented defaults: largest-magnitude sort,
    /// standard symmetric problem, automatic tolerance, exact shifts, 300
    /// outer iterations.
    pub fn new(n: usize, nev: usize, ncv: usize) -> Self {
        Self {
            n,
            nev,
            ncv,
            which: Which::LargestMagnitude,
            kind: ProblemKind::Standard,
            symmetry: OperatorSymmetry::Symmetric,
            tol: T::zero(),
            max_iter: 300,
            shifts: ShiftPolicy::Exact,
            reorth_threshold: T::from_f64_impl(0.717),
            max_random_restarts: 3,
        }
    }

    /// Checks the dimension relationships and the sort criterion.
    ///
    /// The invariant is `1 <= nev < ncv <= n` with `ncv - nev >= 2` so the
    /// implicit restart has at least two shifts to work with.
    pub fn validate(&self) -> Result<(), ConfigFault> {
        if self.n == 0 {
            return Err(ConfigFault::ZeroDimension);
        }
        if self.nev == 0 || self.nev >= self.ncv {
            return Err(ConfigFault::BadNev { nev: self.nev });
        }
        if self.ncv < self.nev + 2 || self.ncv > self.n {
            return Err(ConfigFault::InsufficientHeadroom {
                nev: self.nev,
                ncv: self.ncv,
                n: self.n,
            });
        }
        if self.max_iter == 0 {
            return Err(ConfigFault::ZeroMaxIter);
        }
        if self.symmetry == OperatorSymmetry::Symmetric
            && matches!(
                self.which,
                Which::LargestImaginary | Which::SmallestImaginary
            )
        {
            return Err(ConfigFault::WhichNeedsGeneralOperator { which: self.which });
        }
        Ok(())
    }

    /// The effective relative tolerance: the configured value, or machine
    /// epsilon when the automatic mode (`tol <= 0`) is selected.
    pub(crate) fn effective_tol(&self) -> T {
        if self.tol > T::zero() {
            self.tol
        } else {
            T::epsilon()
        }
    }
}
