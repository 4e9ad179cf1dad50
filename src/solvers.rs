//! High-level drivers for callers who do not need the raw
//! reverse-communication interface.
//!
//! [`eigsh`] and [`eigs`] run the suspend/resume loop internally against a
//! [`faer::matrix_free::LinOp`], answer every `OP` request with one operator
//! application, and extract Ritz vectors from the final factorization. They
//! cover standard problems with exact shifts; generalized problems and
//! user-supplied shifts need [`crate::driver::iterate`] directly.

use faer::dyn_stack::MemStack;
use faer::linalg::matmul::matmul;
use faer::matrix_free::LinOp;
use faer::traits::RealField;
use faer::{Accum, Mat, MatMut, Par, Side};
use num_complex::Complex;
use num_traits::Float;

use crate::algorithms::compare_ritz;
use crate::config::{IramConfig, OperatorSymmetry, ProblemKind, ShiftPolicy};
use crate::driver::iterate;
use crate::error::EigsError;
use crate::state::{Exit, Ido, IramState, Reply};

/// Result of a symmetric partial eigendecomposition.
#[derive(Debug, Clone)]
pub struct SymmetricEigs<T> {
    /// Converged eigenvalues, sorted wanted-first.
    pub values: Vec<T>,
    /// Ritz vectors, one column per entry of `values`. Empty after a
    /// breakdown exit.
    pub vectors: Mat<T>,
    /// Number of wanted pairs that met the convergence criterion.
    pub nconv: usize,
    /// Outer (restart) iterations performed.
    pub iterations: usize,
    /// Operator applications performed.
    pub op_applications: usize,
    /// How the iteration ended. [`Exit::MaxIterReached`] and
    /// [`Exit::Breakdown`] still deliver `nconv` usable pairs.
    pub exit: Exit,
}

/// Result of a general (non-symmetric) partial eigendecomposition.
#[derive(Debug, Clone)]
pub struct GeneralEigs<T> {
    /// Converged eigenvalues, sorted wanted-first. Complex-conjugate pairs
    /// appear adjacent.
    pub values: Vec<Complex<T>>,
    /// Ritz vectors, one column per entry of `values`, normalized to unit
    /// Euclidean length. Empty after a breakdown exit.
    pub vectors: Mat<Complex<T>>,
    /// Number of wanted pairs that met the convergence criterion.
    pub nconv: usize,
    /// Outer (restart) iterations performed.
    pub iterations: usize,
    /// Operator applications performed.
    pub op_applications: usize,
    /// How the iteration ended.
    pub exit: Exit,
}

/// Computes the `nev` wanted eigenpairs of a symmetric operator.
///
/// The `which`, `tol`, `max_iter` and tuning fields of `cfg` are honored;
/// the problem dimension is taken from the operator and the problem kind is
/// forced to standard symmetric with exact shifts. `rand` feeds the random
/// starting (and breakdown-recovery) vectors; draw from `[-1, 1]`. A
/// starting vector of length `n` may be supplied through `v0` to warm-start
/// the iteration.
///
/// # Example
/// ```no_run
/// use faer::dyn_stack::{MemBuffer, MemStack};
/// use faer::matrix_free::LinOp;
/// use iram_rci::{IramConfig, eigsh};
/// use rand::prelude::*;
///
/// # fn operator() -> faer::Mat<f64> { faer::Mat::identity(100, 100) }
/// let a = operator();
/// let mut cfg = IramConfig::<f64>::new(100, 4, 20);
/// cfg.tol = 1e-10;
/// let mut rng = StdRng::seed_from_u64(7);
/// let mut buffer = MemBuffer::new(a.as_ref().apply_scratch(1, faer::Par::Seq));
/// let stack = MemStack::new(&mut buffer);
/// let out = eigsh(&a.as_ref(), cfg, stack, || rng.random_range(-1.0..=1.0), None).unwrap();
/// println!("{:?}", out.values);
/// ```
pub fn eigsh<T, O, R>(
    operator: &O,
    mut cfg: IramConfig<T>,
    stack: &mut MemStack,
    rand: R,
    v0: Option<&[T]>,
) -> Result<SymmetricEigs<T>, EigsError>
where
    T: RealField + Float,
    O: LinOp<T>,
    R: FnMut() -> T,
{
    cfg.n = operator.nrows();
    cfg.kind = ProblemKind::Standard;
    cfg.symmetry = OperatorSymmetry::Symmetric;
    cfg.shifts = ShiftPolicy::Exact;
    cfg.validate()?;

    let nev = cfg.nev;
    let which = cfg.which;
    let (state, v, exit) = run_loop(operator, cfg, stack, rand, v0)?;

    let nkeep = kept_pairs(exit, nev);
    let mut values = Vec::with_capacity(nkeep);
    let mut vectors = Mat::zeros(state.cfg.n, 0);
    if nkeep > 0 {
        match exit {
            Exit::Breakdown { .. } => {
                // The projected matrix is mid-rebuild after a breakdown; the
                // values recorded at the last restart are still trustworthy,
                // the eigenvector basis is not.
                for r in state.ritz_values().iter().take(nkeep) {
                    values.push(r.re);
                }
            }
            _ => {
                let m = state.cfg.ncv;
                let half = T::from_f64_impl(0.5);
                let h = state.projected_matrix();
                let a = Mat::from_fn(m, m, |i, j| (h[(i, j)] + h[(j, i)]) * half);
                let evd = a
                    .self_adjoint_eigen(Side::Upper)
                    .map_err(EigsError::ProjectedEvd)?;
                let u = evd.U();
                let s = evd.S();
                let mut order: Vec<usize> = (0..m).collect();
                order.sort_by(|&a, &b| {
                    compare_ritz(
                        which,
                        &Complex::new(s[a], T::zero()),
                        &Complex::new(s[b], T::zero()),
                    )
                });
                let mut usel = Mat::<T>::zeros(m, nkeep);
                for (k, &idx) in order.iter().take(nkeep).enumerate() {
                    values.push(s[idx]);
                    for r in 0..m {
                        usel[(r, k)] = u[(r, idx)];
                    }
                }
                vectors = Mat::zeros(state.cfg.n, nkeep);
                matmul(
                    vectors.as_mut(),
                    Accum::Replace,
                    v.as_ref(),
                    usel.as_ref(),
                    T::one(),
                    Par::Seq,
                );
            }
        }
    }

    Ok(SymmetricEigs {
        values,
        vectors,
        nconv: state.nconv(),
        iterations: state.iterations(),
        op_applications: state.op_count(),
        exit,
    })
}

/// Computes the `nev` wanted eigenpairs of a general (non-symmetric)
/// operator. Eigenvalues and vectors are complex; conjugate pairs appear
/// adjacent in the output.
///
/// See [`eigsh`] for the calling convention.
pub fn eigs<T, O, R>(
    operator: &O,
    mut cfg: IramConfig<T>,
    stack: &mut MemStack,
    rand: R,
    v0: Option<&[T]>,
) -> Result<GeneralEigs<T>, EigsError>
where
    T: RealField + Float,
    O: LinOp<T>,
    R: FnMut() -> T,
{
    cfg.n = operator.nrows();
    cfg.kind = ProblemKind::Standard;
    cfg.symmetry = OperatorSymmetry::General;
    cfg.shifts = ShiftPolicy::Exact;
    cfg.validate()?;

    let nev = cfg.nev;
    let which = cfg.which;
    let (state, v, exit) = run_loop(operator, cfg, stack, rand, v0)?;

    let nkeep = kept_pairs(exit, nev);
    let mut values = Vec::with_capacity(nkeep);
    let mut vectors = Mat::zeros(state.cfg.n, 0);
    if nkeep > 0 {
        match exit {
            Exit::Breakdown { .. } => {
                values.extend(state.ritz_values().iter().take(nkeep).copied());
            }
            _ => {
                let m = state.cfg.ncv;
                let n = state.cfg.n;
                let evd = state
                    .projected_matrix()
                    .eigen()
                    .map_err(EigsError::ProjectedEvd)?;
                let u = evd.U();
                let s = evd.S();
                let mut order: Vec<usize> = (0..m).collect();
                order.sort_by(|&a, &b| compare_ritz(which, &s[a], &s[b]));
                let mut usel_re = Mat::<T>::zeros(m, nkeep);
                let mut usel_im = Mat::<T>::zeros(m, nkeep);
                for (k, &idx) in order.iter().take(nkeep).enumerate() {
                    values.push(s[idx]);
                    for r in 0..m {
                        usel_re[(r, k)] = u[(r, idx)].re;
                        usel_im[(r, k)] = u[(r, idx)].im;
                    }
                }
                let mut vec_re = Mat::<T>::zeros(n, nkeep);
                let mut vec_im = Mat::<T>::zeros(n, nkeep);
                matmul(
                    vec_re.as_mut(),
                    Accum::Replace,
                    v.as_ref(),
                    usel_re.as_ref(),
                    T::one(),
                    Par::Seq,
                );
                matmul(
                    vec_im.as_mut(),
                    Accum::Replace,
                    v.as_ref(),
                    usel_im.as_ref(),
                    T::one(),
                    Par::Seq,
                );
                vectors = Mat::from_fn(n, nkeep, |i, j| Complex::new(vec_re[(i, j)], vec_im[(i, j)]));
                normalize_complex_columns(vectors.as_mut());
            }
        }
    }

    Ok(GeneralEigs {
        values,
        vectors,
        nconv: state.nconv(),
        iterations: state.iterations(),
        op_applications: state.op_count(),
        exit,
    })
}

/// Runs the reverse-communication loop to termination, answering `OP`
/// requests with the operator and `Random` requests with the caller's
/// generator. An optional starting vector replaces the first random request.
fn run_loop<T, O, R>(
    operator: &O,
    cfg: IramConfig<T>,
    stack: &mut MemStack,
    mut rand: R,
    v0: Option<&[T]>,
) -> Result<(IramState<T>, Mat<T>, Exit), EigsError>
where
    T: RealField + Float,
    O: LinOp<T>,
    R: FnMut() -> T,
{
    let n = cfg.n;
    let ncv = cfg.ncv;
    let mut state = match v0 {
        Some(v0) => IramState::with_initial_vector(cfg, v0),
        None => IramState::new(cfg),
    };
    let mut v = Mat::<T>::zeros(n, ncv);
    let mut workd = Mat::<T>::zeros(n, 3);
    let mut rhs = Mat::<T>::zeros(n, 1);
    let mut reply = Reply::None;
    let exit = loop {
        match iterate(&mut state, v.as_mut(), workd.as_mut(), reply) {
            Ido::Op { x, y } | Ido::RandomOpX { x, y } => {
                for i in 0..n {
                    rhs[(i, 0)] = workd[(i, x)];
                }
                operator.apply(
                    workd.as_mut().get_mut(.., y..y + 1),
                    rhs.as_ref(),
                    Par::Seq,
                    stack,
                );
                reply = Reply::OpApplied;
            }
            Ido::Random { dst } => {
                for i in 0..n {
                    workd[(i, dst)] = rand();
                }
                reply = Reply::RandomFilled;
            }
            // Standard problems with exact shifts never suspend for these.
            Ido::BOp { .. } | Ido::UserShift { .. } => {
                unreachable!("standard-mode driver requested B or shifts")
            }
            Ido::Done(exit) => break exit,
        }
    };
    match exit {
        Exit::Converged { .. } | Exit::MaxIterReached { .. } | Exit::Breakdown { .. } => {
            Ok((state, v, exit))
        }
        Exit::ConfigFault(fault) => Err(EigsError::Config(fault)),
        Exit::ProjectedEvdFault => Err(EigsError::UnexpectedExit(exit)),
    }
}

fn kept_pairs(exit: Exit, nev: usize) -> usize {
    match exit {
        Exit::Converged { .. } => nev,
        Exit::MaxIterReached { nconv } | Exit::Breakdown { nconv } => nconv,
        _ => 0,
    }
}

fn normalize_complex_columns<T: RealField + Float>(mut m: MatMut<'_, Complex<T>>) {
    for j in 0..m.ncols() {
        let mut norm_sqr = T::zero();
        for i in 0..m.nrows() {
            norm_sqr = norm_sqr + m[(i, j)].norm_sqr();
        }
        let norm = norm_sqr.sqrt();
        if norm > T::zero() {
            let inv = T::one() / norm;
            for i in 0..m.nrows() {
                m[(i, j)] = m[(i, j)].scale(inv);
            }
        }
    }
}
