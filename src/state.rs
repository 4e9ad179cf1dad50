//! The caller-owned state bridge and the reverse-communication vocabulary.
//!
//! Every value that must survive a suspension lives in [`IramState`]: phase
//! marker, counters, the projected matrix, the residual vector, Ritz values
//! and bounds, the shift buffer. Nothing persists anywhere else, no statics
//! and no globals, which is what makes independent solves freely
//! interleavable across threads.
//!
//! The protocol: [`crate::driver::iterate`] returns an [`Ido`] instruction.
//! The caller performs the requested operation on the named workspace columns
//! and calls again with the matching [`Reply`]. A non-matching reply
//! (including [`Reply::None`]) re-emits the pending instruction unchanged, so
//! a caller that failed to supply data cannot silently advance the machine.

use faer::Mat;
use faer::traits::RealField;
use num_complex::Complex;
use num_traits::Float;

use crate::config::IramConfig;
use crate::error::ConfigFault;

/// Instruction codes emitted by the driver, the `ido` of the protocol.
///
/// `x`, `y` and `dst` are column indices into the caller's `n x 3` workspace
/// matrix: read the operand from column `x`, write the result into column
/// `y`. The caller must not touch any workspace column it was not asked to
/// write: the driver parks intermediate vectors there across suspensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ido {
    /// Compute `y = OP(x)`.
    Op { x: usize, y: usize },
    /// Compute `y = B(x)` (generalized problems only).
    BOp { x: usize, y: usize },
    /// Supply `count` implicit shifts via [`Reply::Shifts`].
    UserShift { count: usize },
    /// Fill workspace column `dst` with random entries drawn from `[-1, 1]`.
    Random { dst: usize },
    /// Compute `y = OP(x)` on a freshly randomized vector, forcing it into
    /// the range of `OP`. Off the main iteration cadence.
    RandomOpX { x: usize, y: usize },
    /// Terminal state; inspect the exit code.
    Done(Exit),
}

/// The caller's acknowledgement of the previous instruction.
#[derive(Debug, Clone, Copy)]
pub enum Reply<'a, T> {
    /// First call, or "I did nothing": the pending instruction is re-emitted.
    None,
    /// The requested `OP` application (for `Op` or `RandomOpX`) is in place.
    OpApplied,
    /// The requested `B` application is in place.
    BApplied,
    /// The requested random vector is in place.
    RandomFilled,
    /// The requested shifts. For symmetric problems the imaginary parts must
    /// be zero; complex shifts must come in conjugate pairs.
    Shifts(&'a [Complex<T>]),
}

/// Why the iteration terminated. Every exit path goes through
/// [`Ido::Done`] carrying one of these; there is no silent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// All `nev` wanted Ritz pairs satisfied the convergence criterion.
    Converged { nconv: usize },
    /// The outer-iteration budget ran out. `nconv` pairs are still usable;
    /// this is a recoverable outcome, not a hard failure.
    MaxIterReached { nconv: usize },
    /// The basis could not be extended even after the configured number of
    /// caller-supplied random restart vectors. `nconv` pairs are usable.
    Breakdown { nconv: usize },
    /// The configuration was rejected on first entry; no iteration ran.
    ConfigFault(ConfigFault),
    /// The delegated dense eigendecomposition of the projected matrix failed.
    ProjectedEvdFault,
}

/// Internal suspension marker: which phase of the factorization or restart is
/// waiting for the caller. The `j` fields are basis-column indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Fresh state; validate and begin.
    Start,
    /// Generalized cold start with a supplied vector: waiting for `B v0`.
    InitBNorm,
    /// Waiting for the caller to fill a random vector destined for column `j`.
    GetV0Random { j: usize },
    /// Waiting for `OP` applied to the random vector.
    GetV0Op { j: usize },
    /// Generalized: waiting for `B r` while normalizing/orthogonalizing the
    /// random vector. `pass` counts orthogonalization sweeps.
    GetV0BNorm { j: usize, pass: usize },
    /// Main cadence: waiting for `w = OP(v_j)`.
    StepOp { j: usize },
    /// Generalized: waiting for `B w`.
    StepB { j: usize },
    /// Generalized: waiting for `B r` of the orthogonalized residual.
    /// `pass` counts DGKS correction sweeps.
    StepResidB { j: usize, pass: usize },
    /// Waiting for caller-supplied shifts.
    ShiftsWait,
    /// Generalized: waiting for `B r` of the compacted restart residual.
    PostRestartB,
    /// Terminal.
    Finished,
}

/// Workspace column roles, fixed for the lifetime of a solve. Column 2 is
/// reserved for the caller (scratch for composite operators).
pub(crate) const COL_X: usize = 0;
pub(crate) const COL_Y: usize = 1;

/// The state bridge: everything the algorithm must remember between calls.
///
/// The caller owns this value and threads it through every
/// [`iterate`](crate::driver::iterate) call together with the basis and
/// workspace buffers. The caller must not mutate it between calls other than
/// through the documented replies; the fields are private for that reason.
#[derive(Debug, Clone)]
pub struct IramState<T> {
    pub(crate) cfg: IramConfig<T>,
    pub(crate) phase: Phase,
    pub(crate) last_ido: Option<Ido>,

    /// Residual vector `f` of the current factorization (`n x 1`).
    pub(crate) resid: Mat<T>,
    /// Projected operator, upper Hessenberg (`ncv x ncv`; numerically
    /// tridiagonal in the symmetric instantiation).
    pub(crate) h: Mat<T>,
    /// Ritz values of the projected matrix, sorted wanted-first. Refreshed at
    /// every restart.
    pub(crate) ritz: Vec<Complex<T>>,
    /// Residual bound estimate per Ritz value, same order as `ritz`.
    pub(crate) bounds: Vec<T>,
    /// Shift buffer for the current restart.
    pub(crate) shifts: Vec<Complex<T>>,

    /// Number of basis columns kept by the current restart (`kev`).
    pub(crate) kev: usize,
    /// Number of shifts for the current restart (`ncv - kev`).
    pub(crate) np: usize,
    /// Norm of the current residual (`B`-norm in generalized mode).
    pub(crate) beta: T,
    /// Norm of the pre-orthogonalization candidate, the DGKS reference.
    pub(crate) wnorm: T,

    pub(crate) iter: usize,
    pub(crate) nconv: usize,
    pub(crate) rand_attempts: usize,
    pub(crate) numop: usize,
    pub(crate) numopb: usize,
    pub(crate) numreo: usize,

    pub(crate) have_v0: bool,
    pub(crate) v0_len: usize,
    pub(crate) exit: Option<Exit>,
}

impl<T: RealField + Float> IramState<T> {
    /// A fresh state. The first driver call will request a caller-supplied
    /// random starting vector.
    pub fn new(cfg: IramConfig<T>) -> Self {
        let n = cfg.n;
        let ncv = cfg.ncv;
        Self {
            cfg,
            phase: Phase::Start,
            last_ido: None,
            resid: Mat::zeros(n.max(1), 1),
            h: Mat::zeros(ncv.max(1), ncv.max(1)),
            ritz: Vec::new(),
            bounds: Vec::new(),
            shifts: Vec::new(),
            kev: 0,
            np: 0,
            beta: T::zero(),
            wnorm: T::zero(),
            iter: 0,
            nconv: 0,
            rand_attempts: 0,
            numop: 0,
            numopb: 0,
            numreo: 0,
            have_v0: false,
            v0_len: 0,
            exit: None,
        }
    }

    /// A fresh state seeded with a caller-supplied starting vector, the
    /// analogue of ARPACK's `INFO != 0` input convention. The vector's length
    /// is checked on first entry.
    pub fn with_initial_vector(cfg: IramConfig<T>, v0: &[T]) -> Self {
        let mut state = Self::new(cfg);
        state.have_v0 = true;
        state.v0_len = v0.len();
        if v0.len() == state.cfg.n {
            for (i, value) in v0.iter().enumerate() {
                state.resid[(i, 0)] = *value;
            }
        }
        state
    }

    /// The configuration this state was built with.
    pub fn config(&self) -> &IramConfig<T> {
        &self.cfg
    }

    /// Ritz values of the most recent restart, sorted wanted-first.
    pub fn ritz_values(&self) -> &[Complex<T>] {
        &self.ritz
    }

    /// Residual bound estimates, same order as [`Self::ritz_values`].
    pub fn error_bounds(&self) -> &[T] {
        &self.bounds
    }

    /// The projected operator restricted to the current Krylov basis.
    pub fn projected_matrix(&self) -> faer::MatRef<'_, T> {
        self.h.as_ref()
    }

    /// Number of wanted Ritz pairs currently satisfying the convergence
    /// criterion.
    pub fn nconv(&self) -> usize {
        self.nconv
    }

    /// Outer (restart) iterations performed so far.
    pub fn iterations(&self) -> usize {
        self.iter
    }

    /// Total `OP` applications requested (including range-forcing ones).
    pub fn op_count(&self) -> usize {
        self.numop
    }

    /// Total `B` applications requested.
    pub fn b_op_count(&self) -> usize {
        self.numopb
    }

    /// Total re-orthogonalization correction sweeps performed.
    pub fn reorth_count(&self) -> usize {
        self.numreo
    }

    /// The exit code, once the terminal state has been reached.
    pub fn exit(&self) -> Option<Exit> {
        self.exit
    }

    /// Whether the iteration has terminated.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Finished
    }
}
