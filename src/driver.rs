//! The reverse-communication driver.
//!
//! [`iterate`] advances the implicitly restarted Arnoldi iteration as far as
//! it can with the data at hand, then suspends with an [`Ido`] instruction.
//! The caller performs the requested operator application (or supplies the
//! requested data) on the named columns of its `n x 3` workspace and calls
//! again with the matching [`Reply`]. The cycle repeats until
//! [`Ido::Done`].
//!
//! ```no_run
//! use faer::Mat;
//! use iram_rci::{Ido, IramConfig, IramState, Reply, iterate};
//!
//! let (n, nev, ncv) = (100, 4, 20);
//! let cfg = IramConfig::<f64>::new(n, nev, ncv);
//! let mut state = IramState::new(cfg);
//! let mut v = Mat::<f64>::zeros(n, ncv);
//! let mut workd = Mat::<f64>::zeros(n, 3);
//! let mut reply = Reply::None;
//! loop {
//!     match iterate(&mut state, v.as_mut(), workd.as_mut(), reply) {
//!         Ido::Op { x, y } | Ido::RandomOpX { x, y } => {
//!             for i in 0..n {
//!                 workd[(i, y)] = (i + 1) as f64 * workd[(i, x)];
//!             }
//!             reply = Reply::OpApplied;
//!         }
//!         Ido::Random { dst } => {
//!             for i in 0..n {
//!                 workd[(i, dst)] = ((i * 37 + 11) % 101) as f64 / 101.0 - 0.5;
//!             }
//!             reply = Reply::RandomFilled;
//!         }
//!         Ido::BOp { .. } | Ido::UserShift { .. } => unreachable!(),
//!         Ido::Done(exit) => {
//!             println!("{exit:?}");
//!             break;
//!         }
//!     }
//! }
//! ```

use faer::prelude::*;
use faer::traits::RealField;
use faer::{Mat, MatMut, MatRef};
use num_traits::Float;

use crate::algorithms::factorization::{
    dot, orthogonalize, projection_coeffs, set_normalized_column, subtract_projection,
};
use crate::algorithms::restart::{
    apply_shifts, compact_basis_and_residual, compute_ritz, count_converged, sort_ritz,
    split_point,
};
use crate::algorithms::degenerate;
use crate::config::{ProblemKind, ShiftPolicy};
use crate::error::ConfigFault;
use crate::state::{COL_X, COL_Y, Exit, Ido, IramState, Phase, Reply};

/// Maximum DGKS correction sweeps per column before declaring breakdown.
const MAX_REORTH_SWEEPS: usize = 2;

/// Advances the iteration until the next suspension point.
///
/// `v` is the caller-owned basis buffer (`n x ncv`, or wider) and `workd` the
/// caller-owned workspace (`n x 3`, or wider). Both must be the same buffers
/// on every call of a given solve; the driver parks vectors in them across
/// suspensions. `reply` acknowledges the previous instruction. A reply that
/// does not match the pending instruction (including [`Reply::None`] after
/// the first call) re-emits that instruction without advancing anything, so
/// resumption is idempotent.
pub fn iterate<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    workd: MatMut<'_, T>,
    reply: Reply<'_, T>,
) -> Ido {
    if let Some(exit) = state.exit {
        return Ido::Done(exit);
    }
    if let Some(pending) = state.last_ido {
        if !reply_matches(pending, &reply) {
            return pending;
        }
        state.last_ido = None;
    }

    match state.phase {
        Phase::Start => start(state, v, workd),
        Phase::InitBNorm => init_b_norm(state, v, workd),
        Phase::GetV0Random { j } => random_filled(state, v, workd, j),
        Phase::GetV0Op { j } => random_op_applied(state, v, workd, j),
        Phase::GetV0BNorm { j, pass } => random_b_applied(state, v, workd, j, pass),
        Phase::StepOp { j } => step_op_applied(state, v, workd, j),
        Phase::StepB { j } => step_b_applied(state, v, workd, j),
        Phase::StepResidB { j, pass } => step_resid_b_applied(state, v, workd, j, pass),
        Phase::ShiftsWait => shifts_supplied(state, v, workd, reply),
        Phase::PostRestartB => post_restart_b(state, v, workd),
        // `exit` is set whenever the phase is terminal, so this arm cannot
        // be reached through the public entry point.
        Phase::Finished => unreachable!("terminal phase without an exit code"),
    }
}

fn reply_matches<T>(pending: Ido, reply: &Reply<'_, T>) -> bool {
    matches!(
        (pending, reply),
        (Ido::Op { .. }, Reply::OpApplied)
            | (Ido::RandomOpX { .. }, Reply::OpApplied)
            | (Ido::BOp { .. }, Reply::BApplied)
            | (Ido::Random { .. }, Reply::RandomFilled)
            | (Ido::UserShift { .. }, Reply::Shifts(_))
    )
}

fn finish<T: RealField + Float>(state: &mut IramState<T>, exit: Exit) -> Ido {
    state.phase = Phase::Finished;
    state.exit = Some(exit);
    state.last_ido = None;
    Ido::Done(exit)
}

/// Records the suspension and bumps the operation counters.
fn request<T: RealField + Float>(state: &mut IramState<T>, ido: Ido) -> Ido {
    match ido {
        Ido::Op { .. } | Ido::RandomOpX { .. } => state.numop += 1,
        Ido::BOp { .. } => state.numopb += 1,
        _ => {}
    }
    state.last_ido = Some(ido);
    ido
}

fn copy_col<T: RealField + Float>(mut dst: MatMut<'_, T>, dj: usize, src: MatRef<'_, T>, sj: usize) {
    for i in 0..dst.nrows() {
        dst[(i, dj)] = src[(i, sj)];
    }
}

fn copy_within<T: RealField + Float>(mut m: MatMut<'_, T>, from: usize, to: usize) {
    for i in 0..m.nrows() {
        m[(i, to)] = m[(i, from)];
    }
}

fn start<T: RealField + Float>(
    state: &mut IramState<T>,
    mut v: MatMut<'_, T>,
    mut workd: MatMut<'_, T>,
) -> Ido {
    if let Err(fault) = state.cfg.validate() {
        return finish(state, Exit::ConfigFault(fault));
    }
    let n = state.cfg.n;
    let ncv = state.cfg.ncv;
    if v.nrows() != n || v.ncols() < ncv || workd.nrows() != n || workd.ncols() < 3 {
        return finish(state, Exit::ConfigFault(ConfigFault::BadWorkspace));
    }
    log::debug!(
        "starting: n = {n}, nev = {}, ncv = {ncv}, which = {:?}, kind = {:?}",
        state.cfg.nev,
        state.cfg.which,
        state.cfg.kind,
    );

    if !state.have_v0 {
        state.phase = Phase::GetV0Random { j: 0 };
        return request(state, Ido::Random { dst: COL_X });
    }
    if state.v0_len != n {
        return finish(
            state,
            Exit::ConfigFault(ConfigFault::StartVectorLength {
                got: state.v0_len,
                n,
            }),
        );
    }
    match state.cfg.kind {
        ProblemKind::Standard => {
            let norm = state.resid.norm_l2();
            if degenerate(norm, T::one()) {
                return finish(state, Exit::ConfigFault(ConfigFault::ZeroStartVector));
            }
            set_normalized_column(v.rb_mut(), 0, state.resid.as_ref(), norm);
            start_column(state, v, workd, 0)
        }
        ProblemKind::Generalized => {
            copy_col(workd.rb_mut(), COL_X, state.resid.as_ref(), 0);
            state.phase = Phase::InitBNorm;
            request(state, Ido::BOp { x: COL_X, y: COL_Y })
        }
    }
}

/// Generalized cold start: `B v0` has arrived, measure the `B`-norm.
fn init_b_norm<T: RealField + Float>(
    state: &mut IramState<T>,
    mut v: MatMut<'_, T>,
    workd: MatMut<'_, T>,
) -> Ido {
    let norm = b_norm(workd.rb());
    if degenerate(norm, T::one()) {
        return finish(state, Exit::ConfigFault(ConfigFault::ZeroStartVector));
    }
    set_normalized_column(v.rb_mut(), 0, state.resid.as_ref(), norm);
    start_column(state, v, workd, 0)
}

/// `sqrt(x . y)` over workspace columns `X` and `Y`, clamped at zero.
fn b_norm<T: RealField + Float>(workd: MatRef<'_, T>) -> T {
    let inner = dot(
        workd.get(.., COL_X..COL_X + 1),
        workd.get(.., COL_Y..COL_Y + 1),
    );
    if inner > T::zero() { inner.sqrt() } else { T::zero() }
}

/// Begins the extension of basis column `j`: park `v_j` in the workspace and
/// ask for `OP v_j`.
fn start_column<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    mut workd: MatMut<'_, T>,
    j: usize,
) -> Ido {
    log::trace!("extending basis column {j}");
    copy_col(workd.rb_mut(), COL_X, v.rb(), j);
    state.phase = Phase::StepOp { j };
    request(state, Ido::Op { x: COL_X, y: COL_Y })
}

/// A caller-supplied random vector is in place; force it into the range of
/// `OP` before using it as a basis candidate.
fn random_filled<T: RealField + Float>(
    state: &mut IramState<T>,
    _v: MatMut<'_, T>,
    _workd: MatMut<'_, T>,
    j: usize,
) -> Ido {
    state.phase = Phase::GetV0Op { j };
    request(state, Ido::RandomOpX { x: COL_X, y: COL_Y })
}

/// `OP` applied to the random vector: orthogonalize the result against the
/// existing basis and either adopt it as column `j` or ask for another draw.
fn random_op_applied<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    mut workd: MatMut<'_, T>,
    j: usize,
) -> Ido {
    copy_col(state.resid.as_mut(), 0, workd.rb(), COL_Y);
    match state.cfg.kind {
        ProblemKind::Standard => {
            let wnorm = state.resid.norm_l2();
            let beta = if j > 0 {
                let mut coeffs = Mat::<T>::zeros(j, 1);
                let out = orthogonalize(
                    v.rb().get(.., 0..j),
                    state.resid.as_mut(),
                    coeffs.as_mut(),
                    wnorm,
                    state.cfg.reorth_threshold,
                    MAX_REORTH_SWEEPS,
                );
                state.numreo += out.sweeps;
                out.beta
            } else if degenerate(wnorm, T::one()) {
                T::zero()
            } else {
                wnorm
            };
            adopt_replacement(state, v, workd, j, beta)
        }
        ProblemKind::Generalized => {
            copy_col(workd.rb_mut(), COL_X, state.resid.as_ref(), 0);
            state.phase = Phase::GetV0BNorm { j, pass: 0 };
            request(state, Ido::BOp { x: COL_X, y: COL_Y })
        }
    }
}

/// Generalized replacement-vector path: `B r` has arrived. Pass 0 measures
/// the raw candidate and projects the basis out; later passes run DGKS
/// corrections until the `B`-norm stabilizes.
fn random_b_applied<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    mut workd: MatMut<'_, T>,
    j: usize,
    pass: usize,
) -> Ido {
    let norm = b_norm(workd.rb());
    let eta = state.cfg.reorth_threshold;
    if pass == 0 {
        state.wnorm = norm;
        if j == 0 {
            let beta = if degenerate(norm, T::one()) { T::zero() } else { norm };
            return adopt_replacement(state, v, workd, 0, beta);
        }
        let coeffs = projection_coeffs(
            v.rb().get(.., 0..j),
            workd.rb().get(.., COL_Y..COL_Y + 1),
        );
        subtract_projection(state.resid.as_mut(), v.rb().get(.., 0..j), coeffs.as_ref());
        copy_col(workd.rb_mut(), COL_X, state.resid.as_ref(), 0);
        state.phase = Phase::GetV0BNorm { j, pass: 1 };
        return request(state, Ido::BOp { x: COL_X, y: COL_Y });
    }

    let reference = if pass == 1 { state.wnorm } else { state.beta };
    if norm < eta * reference && pass <= MAX_REORTH_SWEEPS {
        let coeffs = projection_coeffs(
            v.rb().get(.., 0..j),
            workd.rb().get(.., COL_Y..COL_Y + 1),
        );
        subtract_projection(state.resid.as_mut(), v.rb().get(.., 0..j), coeffs.as_ref());
        state.numreo += 1;
        state.beta = norm;
        copy_col(workd.rb_mut(), COL_X, state.resid.as_ref(), 0);
        state.phase = Phase::GetV0BNorm { j, pass: pass + 1 };
        return request(state, Ido::BOp { x: COL_X, y: COL_Y });
    }
    let beta = if norm < eta * reference || degenerate(norm, state.wnorm.max(T::one())) {
        T::zero()
    } else {
        norm
    };
    adopt_replacement(state, v, workd, j, beta)
}

/// Accepts or rejects an orthogonalized replacement candidate for column `j`.
fn adopt_replacement<T: RealField + Float>(
    state: &mut IramState<T>,
    mut v: MatMut<'_, T>,
    workd: MatMut<'_, T>,
    j: usize,
    beta: T,
) -> Ido {
    if degenerate(beta, T::one()) {
        state.rand_attempts += 1;
        if state.rand_attempts > state.cfg.max_random_restarts {
            log::warn!(
                "no usable random direction after {} attempts at column {j}",
                state.rand_attempts - 1,
            );
            return finish(state, Exit::Breakdown { nconv: state.nconv });
        }
        state.phase = Phase::GetV0Random { j };
        return request(state, Ido::Random { dst: COL_X });
    }
    state.rand_attempts = 0;
    set_normalized_column(v.rb_mut(), j, state.resid.as_ref(), beta);
    if j > 0 {
        // The replacement is orthogonal to the invariant subspace found so
        // far; the factorization splits here.
        state.h[(j, j - 1)] = T::zero();
    }
    start_column(state, v, workd, j)
}

/// Main cadence, standard path: `w = OP v_j` has arrived. Orthogonalize it in
/// one shot and fill column `j` of the projected matrix.
fn step_op_applied<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    mut workd: MatMut<'_, T>,
    j: usize,
) -> Ido {
    copy_col(state.resid.as_mut(), 0, workd.rb(), COL_Y);
    match state.cfg.kind {
        ProblemKind::Standard => {
            let wnorm = state.resid.norm_l2();
            state.wnorm = wnorm;
            let out = orthogonalize(
                v.rb().get(.., 0..j + 1),
                state.resid.as_mut(),
                state.h.get_mut(0..j + 1, j..j + 1),
                wnorm,
                state.cfg.reorth_threshold,
                MAX_REORTH_SWEEPS,
            );
            state.numreo += out.sweeps;
            complete_column(state, v, workd, j, out.beta)
        }
        ProblemKind::Generalized => {
            copy_within(workd.rb_mut(), COL_Y, COL_X);
            state.phase = Phase::StepB { j };
            request(state, Ido::BOp { x: COL_X, y: COL_Y })
        }
    }
}

/// Generalized cadence: `B w` has arrived. Project the basis out of `w` in
/// the `B` inner product and ask for `B r` of what is left.
fn step_b_applied<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    mut workd: MatMut<'_, T>,
    j: usize,
) -> Ido {
    state.wnorm = b_norm(workd.rb());
    let coeffs = projection_coeffs(
        v.rb().get(.., 0..j + 1),
        workd.rb().get(.., COL_Y..COL_Y + 1),
    );
    for i in 0..j + 1 {
        state.h[(i, j)] = coeffs[(i, 0)];
    }
    subtract_projection(
        state.resid.as_mut(),
        v.rb().get(.., 0..j + 1),
        coeffs.as_ref(),
    );
    copy_col(workd.rb_mut(), COL_X, state.resid.as_ref(), 0);
    state.phase = Phase::StepResidB { j, pass: 0 };
    request(state, Ido::BOp { x: COL_X, y: COL_Y })
}

/// Generalized cadence: `B r` of the orthogonalized residual has arrived.
/// Run DGKS corrections until the `B`-norm stabilizes, then close the column.
fn step_resid_b_applied<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    mut workd: MatMut<'_, T>,
    j: usize,
    pass: usize,
) -> Ido {
    let norm = b_norm(workd.rb());
    let eta = state.cfg.reorth_threshold;
    let reference = if pass == 0 { state.wnorm } else { state.beta };
    if norm < eta * reference && pass < MAX_REORTH_SWEEPS {
        let coeffs = projection_coeffs(
            v.rb().get(.., 0..j + 1),
            workd.rb().get(.., COL_Y..COL_Y + 1),
        );
        for i in 0..j + 1 {
            state.h[(i, j)] = state.h[(i, j)] + coeffs[(i, 0)];
        }
        subtract_projection(
            state.resid.as_mut(),
            v.rb().get(.., 0..j + 1),
            coeffs.as_ref(),
        );
        state.numreo += 1;
        state.beta = norm;
        copy_col(workd.rb_mut(), COL_X, state.resid.as_ref(), 0);
        state.phase = Phase::StepResidB { j, pass: pass + 1 };
        return request(state, Ido::BOp { x: COL_X, y: COL_Y });
    }
    let beta = if norm < eta * reference || degenerate(norm, state.wnorm.max(T::one())) {
        for i in 0..state.resid.nrows() {
            state.resid[(i, 0)] = T::zero();
        }
        T::zero()
    } else {
        norm
    };
    complete_column(state, v, workd, j, beta)
}

/// Column `j` is fully orthogonalized with residual norm `beta`: either grow
/// the factorization, replace a degenerate direction, or restart.
fn complete_column<T: RealField + Float>(
    state: &mut IramState<T>,
    mut v: MatMut<'_, T>,
    workd: MatMut<'_, T>,
    j: usize,
    beta: T,
) -> Ido {
    state.beta = beta;
    let ncv = state.cfg.ncv;
    if j + 1 == ncv {
        return restart_or_finish(state, v, workd);
    }
    if beta == T::zero() {
        // Lucky breakdown: the span so far is invariant. Continue building
        // the basis from a fresh direction.
        log::debug!("invariant subspace at column {}", j + 1);
        state.h[(j + 1, j)] = T::zero();
        state.rand_attempts = 0;
        state.phase = Phase::GetV0Random { j: j + 1 };
        return request(state, Ido::Random { dst: COL_X });
    }
    set_normalized_column(v.rb_mut(), j + 1, state.resid.as_ref(), beta);
    state.h[(j + 1, j)] = beta;
    start_column(state, v, workd, j + 1)
}

/// Full factorization in hand: extract Ritz pairs, test convergence, and
/// either stop or select shifts for an implicit restart.
fn restart_or_finish<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    workd: MatMut<'_, T>,
) -> Ido {
    let cfg = &state.cfg;
    let (mut ritz, mut bounds) = match compute_ritz(state.h.as_ref(), cfg.symmetry, state.beta) {
        Ok(pair) => pair,
        Err(err) => {
            log::error!("projected eigendecomposition failed: {err:?}");
            return finish(state, Exit::ProjectedEvdFault);
        }
    };
    sort_ritz(cfg.which, &mut ritz, &mut bounds);
    state.ritz = ritz;
    state.bounds = bounds;
    state.nconv = count_converged(
        &state.ritz,
        &state.bounds,
        state.cfg.nev,
        state.cfg.effective_tol(),
    );
    state.iter += 1;
    log::debug!(
        "restart {}: {}/{} converged, beta = {:?}",
        state.iter,
        state.nconv,
        state.cfg.nev,
        state.beta,
    );
    if state.nconv >= state.cfg.nev {
        return finish(state, Exit::Converged { nconv: state.nconv });
    }
    if state.iter >= state.cfg.max_iter {
        return finish(state, Exit::MaxIterReached { nconv: state.nconv });
    }

    let (kev, np) = split_point(&state.ritz, state.nconv, state.cfg.nev, state.cfg.ncv);
    state.kev = kev;
    state.np = np;
    match state.cfg.shifts {
        ShiftPolicy::Supplied => {
            state.phase = Phase::ShiftsWait;
            request(state, Ido::UserShift { count: np })
        }
        ShiftPolicy::Exact => {
            state.shifts = state.ritz[kev..].to_vec();
            do_restart(state, v, workd)
        }
    }
}

fn shifts_supplied<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    workd: MatMut<'_, T>,
    reply: Reply<'_, T>,
) -> Ido {
    let pending = Ido::UserShift { count: state.np };
    if let Reply::Shifts(supplied) = reply {
        if supplied.len() != state.np {
            log::warn!("expected {} shifts, got {}", state.np, supplied.len());
            state.last_ido = Some(pending);
            return pending;
        }
        state.shifts = supplied.to_vec();
        do_restart(state, v, workd)
    } else {
        state.last_ido = Some(pending);
        pending
    }
}

/// Chases the shift bulges through `H`, rotates the basis, and rebuilds the
/// residual of the compressed `kev`-step factorization.
fn do_restart<T: RealField + Float>(
    state: &mut IramState<T>,
    mut v: MatMut<'_, T>,
    mut workd: MatMut<'_, T>,
) -> Ido {
    let ncv = state.cfg.ncv;
    let kev = state.kev;
    log::debug!("implicit restart: keeping {kev}, applying {} shifts", state.np);
    let q = apply_shifts(state.h.as_mut(), &state.shifts);
    compact_basis_and_residual(
        v.rb_mut().get_mut(.., 0..ncv),
        state.resid.as_mut(),
        state.h.as_ref(),
        q.as_ref(),
        kev,
    );
    match state.cfg.kind {
        ProblemKind::Standard => {
            let beta = state.resid.norm_l2();
            begin_from_residual(state, v, workd, beta)
        }
        ProblemKind::Generalized => {
            copy_col(workd.rb_mut(), COL_X, state.resid.as_ref(), 0);
            state.phase = Phase::PostRestartB;
            request(state, Ido::BOp { x: COL_X, y: COL_Y })
        }
    }
}

fn post_restart_b<T: RealField + Float>(
    state: &mut IramState<T>,
    v: MatMut<'_, T>,
    workd: MatMut<'_, T>,
) -> Ido {
    let beta = b_norm(workd.rb());
    begin_from_residual(state, v, workd, beta)
}

/// Resumes the factorization at column `kev` from the compacted residual.
fn begin_from_residual<T: RealField + Float>(
    state: &mut IramState<T>,
    mut v: MatMut<'_, T>,
    workd: MatMut<'_, T>,
    beta: T,
) -> Ido {
    let kev = state.kev;
    state.beta = beta;
    if degenerate(beta, T::one()) {
        log::debug!("restart residual vanished; requesting a fresh direction");
        state.h[(kev, kev - 1)] = T::zero();
        state.rand_attempts = 0;
        state.phase = Phase::GetV0Random { j: kev };
        return request(state, Ido::Random { dst: COL_X });
    }
    set_normalized_column(v.rb_mut(), kev, state.resid.as_ref(), beta);
    state.h[(kev, kev - 1)] = beta;
    start_column(state, v, workd, kev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IramConfig;

    fn drive_diag(
        cfg: IramConfig<f64>,
        diag: &[f64],
        max_calls: usize,
    ) -> (IramState<f64>, Exit) {
        let n = cfg.n;
        let ncv = cfg.ncv;
        let mut state = IramState::new(cfg);
        let mut v = Mat::<f64>::zeros(n, ncv);
        let mut workd = Mat::<f64>::zeros(n, 3);
        let mut reply = Reply::None;
        for _ in 0..max_calls {
            match iterate(&mut state, v.as_mut(), workd.as_mut(), reply) {
                Ido::Op { x, y } | Ido::RandomOpX { x, y } => {
                    for i in 0..n {
                        workd[(i, y)] = diag[i] * workd[(i, x)];
                    }
                    reply = Reply::OpApplied;
                }
                Ido::Random { dst } => {
                    for i in 0..n {
                        workd[(i, dst)] = ((i * 31 + 17) % 97) as f64 / 97.0 - 0.5;
                    }
                    reply = Reply::RandomFilled;
                }
                Ido::BOp { .. } => panic!("standard problem asked for B"),
                Ido::UserShift { .. } => panic!("exact-shift problem asked for shifts"),
                Ido::Done(exit) => return (state, exit),
            }
        }
        panic!("no termination within {max_calls} calls");
    }

    #[test]
    fn dominant_eigenvalues_of_a_diagonal_operator() {
        let n = 60;
        let diag: Vec<f64> = (1..=n).map(|i| i as f64).collect();
        let mut cfg = IramConfig::new(n, 3, 12);
        cfg.tol = 1e-10;
        let (state, exit) = drive_diag(cfg, &diag, 100_000);
        match exit {
            Exit::Converged { nconv } => assert!(nconv >= 3),
            other => panic!("unexpected exit {other:?}"),
        }
        let ritz = state.ritz_values();
        assert!((ritz[0].re - 60.0).abs() < 1e-7);
        assert!((ritz[1].re - 59.0).abs() < 1e-7);
        assert!((ritz[2].re - 58.0).abs() < 1e-7);
    }

    #[test]
    fn bad_config_surfaces_on_the_first_call() {
        let cfg = IramConfig::<f64>::new(10, 4, 5);
        let mut state = IramState::new(cfg);
        let mut v = Mat::<f64>::zeros(10, 5);
        let mut workd = Mat::<f64>::zeros(10, 3);
        let ido = iterate(&mut state, v.as_mut(), workd.as_mut(), Reply::None);
        assert_eq!(
            ido,
            Ido::Done(Exit::ConfigFault(ConfigFault::InsufficientHeadroom {
                nev: 4,
                ncv: 5,
                n: 10
            }))
        );
        assert!(state.is_done());
    }

    #[test]
    fn mismatched_reply_re_emits_the_pending_instruction() {
        let cfg = IramConfig::<f64>::new(20, 2, 8);
        let mut state = IramState::new(cfg);
        let mut v = Mat::<f64>::zeros(20, 8);
        let mut workd = Mat::<f64>::zeros(20, 3);
        let first = iterate(&mut state, v.as_mut(), workd.as_mut(), Reply::None);
        assert!(matches!(first, Ido::Random { .. }));
        // Claiming an OP application against a pending Random request must
        // not advance the machine.
        let again = iterate(&mut state, v.as_mut(), workd.as_mut(), Reply::OpApplied);
        assert_eq!(first, again);
        let third = iterate(&mut state, v.as_mut(), workd.as_mut(), Reply::None);
        assert_eq!(first, third);
    }

    #[test]
    fn supplied_start_vector_skips_the_random_request() {
        let n = 30;
        let v0 = vec![1.0; n];
        let mut cfg = IramConfig::new(n, 2, 10);
        cfg.tol = 1e-10;
        let ncv = cfg.ncv;
        let mut state = IramState::with_initial_vector(cfg, &v0);
        let mut v = Mat::<f64>::zeros(n, ncv);
        let mut workd = Mat::<f64>::zeros(n, 3);
        let first = iterate(&mut state, v.as_mut(), workd.as_mut(), Reply::None);
        assert!(matches!(first, Ido::Op { .. }));
        assert_eq!(state.op_count(), 1);
    }

    #[test]
    fn zero_start_vector_is_rejected() {
        let cfg = IramConfig::<f64>::new(10, 2, 6);
        let v0 = vec![0.0; 10];
        let mut state = IramState::with_initial_vector(cfg, &v0);
        let mut v = Mat::<f64>::zeros(10, 6);
        let mut workd = Mat::<f64>::zeros(10, 3);
        let ido = iterate(&mut state, v.as_mut(), workd.as_mut(), Reply::None);
        assert_eq!(
            ido,
            Ido::Done(Exit::ConfigFault(ConfigFault::ZeroStartVector))
        );
    }
}
