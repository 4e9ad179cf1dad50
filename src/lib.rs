//! Implicitly restarted Arnoldi/Lanczos eigensolver with a
//! reverse-communication interface.
//!
//! This crate computes a few eigenpairs of a large linear operator that is
//! never materialized as a matrix. The caller owns the operator: whenever the
//! iteration needs `OP x` (or `B x` for generalized problems), it suspends
//! and returns an instruction naming workspace columns; the caller applies
//! the operator however it likes and resumes. The algorithm is the
//! implicitly restarted Arnoldi method (Lanczos in the symmetric case):
//! build an `ncv`-step Krylov factorization, diagonalize the small projected
//! matrix, and use the unwanted Ritz values as shifts for a bulge-chasing QR
//! restart that compresses the wanted subspace back into the leading columns.
//!
//! Built on the [`faer`] linear algebra framework: the projected
//! eigendecompositions, matrix products and basis storage all use [`faer`]
//! types, and the high-level drivers accept any
//! [`faer::matrix_free::LinOp`].
//!
//! ## Two ways in
//!
//! **Reverse communication** ([`iterate`]): full control. The caller owns
//! the basis and workspace buffers, threads an [`IramState`] through every
//! call, and answers [`Ido`] instructions with [`Reply`] acknowledgements.
//! This is the only interface for generalized problems (`A x = lambda B x`)
//! and user-supplied shifts, and it never blocks: independent solves can be
//! interleaved freely, even on one thread.
//!
//! **High-level drivers** ([`eigsh`], [`eigs`]): hand over an operator and
//! get eigenpairs back. Covers standard problems with exact shifts.
//!
//! ## Example
//!
//! ```rust
//! use faer::dyn_stack::{MemBuffer, MemStack};
//! use faer::matrix_free::LinOp;
//! use faer::Mat;
//! use iram_rci::{IramConfig, eigsh};
//! use rand::prelude::*;
//!
//! // Diagonal operator with spectrum 1..=50.
//! let n = 50;
//! let a = Mat::from_fn(n, n, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
//!
//! let mut cfg = IramConfig::<f64>::new(n, 2, 10);
//! cfg.tol = 1e-10;
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let mut mem = MemBuffer::new(a.as_ref().apply_scratch(1, faer::Par::Seq));
//! let stack = MemStack::new(&mut mem);
//!
//! let out = eigsh(&a.as_ref(), cfg, stack, || rng.random_range(-1.0..=1.0), None).unwrap();
//! assert!((out.values[0] - 50.0).abs() < 1e-7);
//! assert!((out.values[1] - 49.0).abs() < 1e-7);
//! ```
//!
//! ## Guarantees
//!
//! Non-convergence is data, not an error: running out of iterations or
//! hitting an unrecoverable breakdown still reports how many pairs converged
//! ([`Exit::MaxIterReached`], [`Exit::Breakdown`]), and the high-level
//! drivers return those partial results. All state lives in the
//! caller-owned [`IramState`]; there are no globals and no internal threads.

mod algorithms;

pub mod config;
pub mod driver;
pub mod error;
pub mod solvers;
pub mod state;

pub use config::{IramConfig, OperatorSymmetry, ProblemKind, ShiftPolicy, Which};
pub use driver::iterate;
pub use error::{ConfigFault, EigsError};
pub use solvers::{GeneralEigs, SymmetricEigs, eigs, eigsh};
pub use state::{Exit, Ido, IramState, Reply};
