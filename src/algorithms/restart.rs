//! Shift/restart selector: Ritz extraction, convergence counting and the
//! implicit (bulge-chasing) QR restart.
//!
//! After every full factorization the projected matrix `H` is diagonalized,
//! its Ritz values sorted wanted-first, and the unwanted ones used as shifts
//! for a similarity transform `H <- Q^T H Q` that compresses the wanted
//! subspace into the leading `kev` columns. The transform is accumulated in
//! `Q` so the basis and residual can be compacted without ever applying the
//! operator. Real shifts chase a single-rotation bulge; conjugate pairs chase
//! a Francis double-shift bulge, which keeps all arithmetic real.

use faer::linalg::evd::EvdError;
use faer::linalg::matmul::matmul;
use faer::prelude::*;
use faer::traits::RealField;
use faer::{Accum, Mat, MatMut, MatRef, Par, Side};
use num_complex::Complex;
use num_traits::Float;

use super::{compare_ritz, is_conjugate_pair};
use crate::config::{OperatorSymmetry, Which};

/// Ritz values of the projected matrix and residual bound estimates, both
/// unsorted. `beta` is the norm of the factorization residual; the classic
/// bound is `beta` times the magnitude of the last component of the projected
/// eigenvector.
pub(crate) fn compute_ritz<T: RealField + Float>(
    h: MatRef<'_, T>,
    symmetry: OperatorSymmetry,
    beta: T,
) -> Result<(Vec<Complex<T>>, Vec<T>), EvdError> {
    let m = h.nrows();
    match symmetry {
        OperatorSymmetry::Symmetric => {
            // H is numerically tridiagonal; symmetrize to wash out roundoff
            // in the upper triangle before delegating.
            let half = T::from_f64_impl(0.5);
            let a = Mat::from_fn(m, m, |i, j| (h[(i, j)] + h[(j, i)]) * half);
            let evd = a.self_adjoint_eigen(Side::Upper)?;
            let u = evd.U();
            let s = evd.S();
            let mut ritz = Vec::with_capacity(m);
            let mut bounds = Vec::with_capacity(m);
            for i in 0..m {
                ritz.push(Complex::new(s[i], T::zero()));
                bounds.push(beta.abs() * u[(m - 1, i)].abs());
            }
            Ok((ritz, bounds))
        }
        OperatorSymmetry::General => {
            let evd = h.eigen()?;
            let u = evd.U();
            let s = evd.S();
            let mut ritz = Vec::with_capacity(m);
            let mut bounds = Vec::with_capacity(m);
            for i in 0..m {
                let mut norm_sqr = T::zero();
                for r in 0..m {
                    norm_sqr = norm_sqr + u[(r, i)].norm_sqr();
                }
                let colnorm = norm_sqr.sqrt();
                let last = u[(m - 1, i)].norm();
                let bound = if colnorm > T::zero() {
                    beta.abs() * last / colnorm
                } else {
                    beta.abs()
                };
                ritz.push(s[i]);
                bounds.push(bound);
            }
            Ok((ritz, bounds))
        }
    }
}

/// Sorts `ritz` wanted-first under `which`, permuting `bounds` alongside.
pub(crate) fn sort_ritz<T: RealField + Float>(
    which: Which,
    ritz: &mut [Complex<T>],
    bounds: &mut [T],
) {
    let m = ritz.len();
    let mut perm: Vec<usize> = (0..m).collect();
    perm.sort_by(|&a, &b| compare_ritz(which, &ritz[a], &ritz[b]));
    let old_ritz = ritz.to_vec();
    let old_bounds = bounds.to_vec();
    for (dst, &src) in perm.iter().enumerate() {
        ritz[dst] = old_ritz[src];
        bounds[dst] = old_bounds[src];
    }
}

/// Number of wanted Ritz pairs (among the first `nev`, sorted wanted-first)
/// that satisfy the relative convergence criterion.
pub(crate) fn count_converged<T: RealField + Float>(
    ritz: &[Complex<T>],
    bounds: &[T],
    nev: usize,
    tol: T,
) -> usize {
    let mut nconv = 0;
    for i in 0..nev.min(ritz.len()) {
        let scale = T::epsilon().max(ritz[i].norm());
        if bounds[i] <= tol * scale {
            nconv += 1;
        }
    }
    nconv
}

/// Chooses how many Ritz pairs to keep through the restart.
///
/// The base split keeps `nev` and shifts away `ncv - nev`, but stagnation is
/// countered by promoting up to half of the shift budget to already-converged
/// pairs, and a conjugate pair is never split across the boundary.
pub(crate) fn split_point<T: RealField + Float>(
    ritz: &[Complex<T>],
    nconv: usize,
    nev: usize,
    ncv: usize,
) -> (usize, usize) {
    let np0 = ncv - nev;
    let mut kev = nev + nconv.min(np0 / 2);
    if kev > ncv - 1 {
        kev = ncv - 1;
    }
    if kev >= 1 && kev < ncv && is_conjugate_pair(&ritz[kev - 1], &ritz[kev]) {
        if kev + 1 < ncv {
            kev += 1;
        } else {
            kev -= 1;
        }
    }
    (kev, ncv - kev)
}

/// Applies the implicit shifts to `h` as bulge-chasing QR sweeps, returning
/// the accumulated orthogonal transform `Q` (so `H_new = Q^T H_old Q`).
///
/// Complex shifts are consumed as conjugate pairs through the double-shift
/// sweep. An unpaired complex shift degrades to its real part.
pub(crate) fn apply_shifts<T: RealField + Float>(
    mut h: MatMut<'_, T>,
    shifts: &[Complex<T>],
) -> Mat<T> {
    let m = h.nrows();
    let mut q = Mat::<T>::identity(m, m);
    let mut i = 0;
    while i < shifts.len() {
        let sigma = shifts[i];
        if sigma.im != T::zero() {
            if i + 1 < shifts.len() && is_conjugate_pair(&sigma, &shifts[i + 1]) {
                double_shift_sweep(h.rb_mut(), q.as_mut(), sigma);
                i += 2;
                continue;
            }
            log::warn!("unpaired complex shift; applying its real part only");
        }
        single_shift_sweep(h.rb_mut(), q.as_mut(), sigma.re);
        i += 1;
    }
    // Roundoff below the subdiagonal accumulates during the chase.
    for j in 0..m {
        for r in (j + 2)..m {
            h[(r, j)] = T::zero();
        }
    }
    q
}

/// One implicit single-shift QR sweep on the Hessenberg `h`, accumulating the
/// rotations into `q` on the right.
fn single_shift_sweep<T: RealField + Float>(mut h: MatMut<'_, T>, mut q: MatMut<'_, T>, sigma: T) {
    let m = h.nrows();
    if m < 2 {
        return;
    }
    let mut x = h[(0, 0)] - sigma;
    let mut z = h[(1, 0)];
    for k in 0..m - 1 {
        let (c, s) = givens(x, z);
        let first_col = k.saturating_sub(1);
        for j in first_col..m {
            let t1 = h[(k, j)];
            let t2 = h[(k + 1, j)];
            h[(k, j)] = c * t1 + s * t2;
            h[(k + 1, j)] = c * t2 - s * t1;
        }
        let last_row = (k + 3).min(m);
        for r in 0..last_row {
            let t1 = h[(r, k)];
            let t2 = h[(r, k + 1)];
            h[(r, k)] = c * t1 + s * t2;
            h[(r, k + 1)] = c * t2 - s * t1;
        }
        for r in 0..m {
            let t1 = q[(r, k)];
            let t2 = q[(r, k + 1)];
            q[(r, k)] = c * t1 + s * t2;
            q[(r, k + 1)] = c * t2 - s * t1;
        }
        if k + 2 < m {
            x = h[(k + 1, k)];
            z = h[(k + 2, k)];
        }
    }
}

/// One Francis double-shift sweep for the conjugate pair `sigma`,
/// `conj(sigma)`, entirely in real arithmetic.
fn double_shift_sweep<T: RealField + Float>(
    mut h: MatMut<'_, T>,
    mut q: MatMut<'_, T>,
    sigma: Complex<T>,
) {
    let m = h.nrows();
    if m < 2 {
        return;
    }
    let s = sigma.re + sigma.re;
    let t = sigma.norm_sqr();
    if m == 2 {
        // The pair collapses to a single rotation built from the first
        // column of H^2 - s H + t I.
        let x = h[(0, 0)] * h[(0, 0)] + h[(0, 1)] * h[(1, 0)] - s * h[(0, 0)] + t;
        let z = h[(1, 0)] * (h[(0, 0)] + h[(1, 1)] - s);
        let (c, sn) = givens(x, z);
        for j in 0..m {
            let t1 = h[(0, j)];
            let t2 = h[(1, j)];
            h[(0, j)] = c * t1 + sn * t2;
            h[(1, j)] = c * t2 - sn * t1;
        }
        for r in 0..m {
            let t1 = h[(r, 0)];
            let t2 = h[(r, 1)];
            h[(r, 0)] = c * t1 + sn * t2;
            h[(r, 1)] = c * t2 - sn * t1;
            let u1 = q[(r, 0)];
            let u2 = q[(r, 1)];
            q[(r, 0)] = c * u1 + sn * u2;
            q[(r, 1)] = c * u2 - sn * u1;
        }
        return;
    }

    let mut x = h[(0, 0)] * h[(0, 0)] + h[(0, 1)] * h[(1, 0)] - s * h[(0, 0)] + t;
    let mut y = h[(1, 0)] * (h[(0, 0)] + h[(1, 1)] - s);
    let mut z = h[(1, 0)] * h[(2, 1)];
    for k in 0..=m - 3 {
        let (v, tau) = house3(x, y, z);
        let first_col = k.saturating_sub(1);
        for j in first_col..m {
            let sum = v[0] * h[(k, j)] + v[1] * h[(k + 1, j)] + v[2] * h[(k + 2, j)];
            let w = tau * sum;
            h[(k, j)] = h[(k, j)] - w * v[0];
            h[(k + 1, j)] = h[(k + 1, j)] - w * v[1];
            h[(k + 2, j)] = h[(k + 2, j)] - w * v[2];
        }
        let last_row = (k + 4).min(m);
        for r in 0..last_row {
            let sum = v[0] * h[(r, k)] + v[1] * h[(r, k + 1)] + v[2] * h[(r, k + 2)];
            let w = tau * sum;
            h[(r, k)] = h[(r, k)] - w * v[0];
            h[(r, k + 1)] = h[(r, k + 1)] - w * v[1];
            h[(r, k + 2)] = h[(r, k + 2)] - w * v[2];
        }
        for r in 0..m {
            let sum = v[0] * q[(r, k)] + v[1] * q[(r, k + 1)] + v[2] * q[(r, k + 2)];
            let w = tau * sum;
            q[(r, k)] = q[(r, k)] - w * v[0];
            q[(r, k + 1)] = q[(r, k + 1)] - w * v[1];
            q[(r, k + 2)] = q[(r, k + 2)] - w * v[2];
        }
        if k + 3 < m {
            x = h[(k + 1, k)];
            y = h[(k + 2, k)];
            z = h[(k + 3, k)];
        }
    }

    // The bulge's last remnant is a 2x2 rotation on the trailing rows.
    let x = h[(m - 2, m - 3)];
    let z = h[(m - 1, m - 3)];
    let (c, sn) = givens(x, z);
    for j in m - 3..m {
        let t1 = h[(m - 2, j)];
        let t2 = h[(m - 1, j)];
        h[(m - 2, j)] = c * t1 + sn * t2;
        h[(m - 1, j)] = c * t2 - sn * t1;
    }
    for r in 0..m {
        let t1 = h[(r, m - 2)];
        let t2 = h[(r, m - 1)];
        h[(r, m - 2)] = c * t1 + sn * t2;
        h[(r, m - 1)] = c * t2 - sn * t1;
        let u1 = q[(r, m - 2)];
        let u2 = q[(r, m - 1)];
        q[(r, m - 2)] = c * u1 + sn * u2;
        q[(r, m - 1)] = c * u2 - sn * u1;
    }
}

/// Compacts the basis and residual after a chase: the leading `kev` columns
/// of `V Q` replace the basis, and the residual becomes
/// `(V Q) e_kev * H[kev, kev-1] + f * Q[ncv-1, kev-1]`.
pub(crate) fn compact_basis_and_residual<T: RealField + Float>(
    mut v: MatMut<'_, T>,
    mut resid: MatMut<'_, T>,
    h: MatRef<'_, T>,
    q: MatRef<'_, T>,
    kev: usize,
) {
    let n = v.nrows();
    let ncv = q.nrows();
    let mut vq = Mat::<T>::zeros(n, kev + 1);
    matmul(
        vq.as_mut(),
        Accum::Replace,
        v.rb(),
        q.get(.., 0..kev + 1),
        T::one(),
        Par::Seq,
    );
    let hs = h[(kev, kev - 1)];
    let qs = q[(ncv - 1, kev - 1)];
    for r in 0..n {
        resid[(r, 0)] = vq[(r, kev)] * hs + resid[(r, 0)] * qs;
    }
    for j in 0..kev {
        for r in 0..n {
            v[(r, j)] = vq[(r, j)];
        }
    }
}

fn givens<T: RealField + Float>(x: T, z: T) -> (T, T) {
    let r = x.hypot(z);
    if r == T::zero() {
        (T::one(), T::zero())
    } else {
        (x / r, z / r)
    }
}

/// Householder reflector mapping `(x, y, z)` onto a multiple of `e1`.
/// Returns the reflector vector and `tau` with `P = I - tau v v^T`.
fn house3<T: RealField + Float>(x: T, y: T, z: T) -> ([T; 3], T) {
    let norm = (x * x + y * y + z * z).sqrt();
    if norm == T::zero() {
        return ([T::one(), T::zero(), T::zero()], T::zero());
    }
    let alpha = if x >= T::zero() { -norm } else { norm };
    let v0 = x - alpha;
    let vtv = v0 * v0 + y * y + z * z;
    if vtv == T::zero() {
        return ([T::one(), T::zero(), T::zero()], T::zero());
    }
    ([v0, y, z], (T::one() + T::one()) / vtv)
}
