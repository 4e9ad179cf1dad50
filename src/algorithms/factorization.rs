//! Krylov factorization engine: one-column basis extension.
//!
//! The engine extends an orthonormal basis `V` and the projected Hessenberg
//! matrix `H` one column at a time using modified Gram-Schmidt against all
//! prior columns, with a DGKS correction sweep when cancellation is detected.
//! The driver owns the suspension bookkeeping; the functions here are the
//! purely numerical pieces that run between suspensions, shared by the
//! standard path (Euclidean inner product, no extra suspensions) and the
//! generalized path (`B` inner products, which the driver obtains through
//! `BOp` requests).

use faer::linalg::matmul::matmul;
use faer::prelude::*;
use faer::traits::RealField;
use faer::{Accum, Mat, MatMut, MatRef, Par};
use num_traits::Float;

use super::degenerate;

/// Euclidean inner product of two `n x 1` views.
pub(crate) fn dot<T: RealField + Float>(a: MatRef<'_, T>, b: MatRef<'_, T>) -> T {
    let mut acc = T::zero();
    for i in 0..a.nrows() {
        acc = acc + a[(i, 0)] * b[(i, 0)];
    }
    acc
}

/// `basis^T * vec`, the projection coefficients of `vec` onto the basis
/// columns. `vec` is the metric image of the candidate (`B r` in generalized
/// mode, `r` itself otherwise).
pub(crate) fn projection_coeffs<T: RealField + Float>(
    basis: MatRef<'_, T>,
    vec: MatRef<'_, T>,
) -> Mat<T> {
    let mut coeffs = Mat::zeros(basis.ncols(), 1);
    matmul(
        coeffs.as_mut(),
        Accum::Replace,
        basis.transpose(),
        vec,
        T::one(),
        Par::Seq,
    );
    coeffs
}

/// `vec -= basis * coeffs`, in place.
pub(crate) fn subtract_projection<T: RealField + Float>(
    vec: MatMut<'_, T>,
    basis: MatRef<'_, T>,
    coeffs: MatRef<'_, T>,
) {
    matmul(vec, Accum::Add, basis, coeffs, -T::one(), Par::Seq);
}

/// Writes `src / norm` into basis column `j`.
pub(crate) fn set_normalized_column<T: RealField + Float>(
    mut v: MatMut<'_, T>,
    j: usize,
    src: MatRef<'_, T>,
    norm: T,
) {
    let inv = T::one() / norm;
    for i in 0..v.nrows() {
        v[(i, j)] = src[(i, 0)] * inv;
    }
}

/// Outcome of one full orthogonalization of a candidate column.
pub(crate) struct Orthogonalized<T> {
    /// Norm of the orthogonalized residual; exactly zero when the direction
    /// was degenerate and the candidate was flushed (lucky breakdown).
    pub beta: T,
    /// Number of DGKS correction sweeps that ran.
    pub sweeps: usize,
}

/// Orthogonalizes `resid` (already `w - V h`-projected or raw) against the
/// basis in the Euclidean inner product, accumulating coefficients into
/// `coeffs`, with up to `max_sweeps` DGKS corrections.
///
/// `wnorm` is the norm of the candidate before any orthogonalization; the
/// classic test declares cancellation when the surviving norm drops below
/// `eta * wnorm`. A candidate that cannot be rescued is flushed to zero and
/// reported as breakdown via `beta == 0`.
pub(crate) fn orthogonalize<T: RealField + Float>(
    basis: MatRef<'_, T>,
    mut resid: MatMut<'_, T>,
    mut coeffs: MatMut<'_, T>,
    wnorm: T,
    eta: T,
    max_sweeps: usize,
) -> Orthogonalized<T> {
    let first = projection_coeffs(basis, resid.rb());
    subtract_projection(resid.rb_mut(), basis, first.as_ref());
    for i in 0..basis.ncols() {
        coeffs[(i, 0)] = first[(i, 0)];
    }

    let mut reference = wnorm;
    let mut beta = resid.rb().norm_l2();
    let mut sweeps = 0;
    while beta < eta * reference && sweeps < max_sweeps {
        let correction = projection_coeffs(basis, resid.rb());
        subtract_projection(resid.rb_mut(), basis, correction.as_ref());
        for i in 0..basis.ncols() {
            coeffs[(i, 0)] = coeffs[(i, 0)] + correction[(i, 0)];
        }
        reference = beta;
        beta = resid.rb().norm_l2();
        sweeps += 1;
    }

    if beta < eta * reference || degenerate(beta, wnorm) {
        // The candidate lies in the span of the basis: flush it and signal
        // an invariant subspace.
        for i in 0..resid.nrows() {
            resid[(i, 0)] = T::zero();
        }
        beta = T::zero();
    }

    Orthogonalized { beta, sweeps }
}
