//! Numerical building blocks shared by the factorization engine and the
//! shift/restart selector.

pub(crate) mod factorization;
pub(crate) mod restart;

use core::cmp::Ordering;

use faer::traits::RealField;
use num_complex::Complex;
use num_traits::Float;

use crate::config::Which;

/// Total order on Ritz values for a given sort criterion, "most wanted"
/// first.
///
/// Ties on the primary key are broken by ascending real part, then ascending
/// imaginary part, so that sorting is deterministic and complex-conjugate
/// pairs always end up adjacent.
pub(crate) fn compare_ritz<T: RealField + Float>(
    which: Which,
    a: &Complex<T>,
    b: &Complex<T>,
) -> Ordering {
    let primary = match which {
        Which::LargestMagnitude => cmp(b.norm(), a.norm()),
        Which::SmallestMagnitude => cmp(a.norm(), b.norm()),
        Which::LargestReal => cmp(b.re, a.re),
        Which::SmallestReal => cmp(a.re, b.re),
        Which::LargestImaginary => cmp(b.im, a.im),
        Which::SmallestImaginary => cmp(a.im, b.im),
    };
    primary
        .then_with(|| cmp(a.re, b.re))
        .then_with(|| cmp(a.im, b.im))
}

fn cmp<T: Float>(a: T, b: T) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Whether `a` and `b` form a complex-conjugate pair, up to roundoff in the
/// projected eigendecomposition.
pub(crate) fn is_conjugate_pair<T: RealField + Float>(a: &Complex<T>, b: &Complex<T>) -> bool {
    if a.im == T::zero() || b.im == T::zero() {
        return false;
    }
    let scale = a.norm().max(T::one());
    let slack = T::epsilon() * T::from_f64_impl(64.0) * scale;
    (a.re - b.re).abs() <= slack && (a.im + b.im).abs() <= slack
}

/// Whether a candidate direction of norm `beta` is numerically degenerate
/// relative to the vector of norm `scale` it was orthogonalized from.
pub(crate) fn degenerate<T: RealField + Float>(beta: T, scale: T) -> bool {
    beta <= T::epsilon() * scale.max(T::one())
}
