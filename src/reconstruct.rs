//! # Exponential kernel reconstruction of the cross-domain block
//!
//! With source/target eigenpairs `(v_s, Q_s)`, `(v_t, Q_t)` and a scale β:
//!
//! 1. `Y_st = K[0:split, split:N]`
//! 2. `Λ_s = diag(exp(β v_s))`, `Λ_t = diag(exp(β v_t))`
//! 3. `K_ss = Q_s Λ_s Q_sᵀ`, `K_tt = Q_t Λ_t Q_tᵀ`
//! 4. `K_st = K_ss · Y_st · K_tt`
//! 5. optional L2 row normalisation of `K_st` (skipped when the kernel was
//!    normalised upstream)
//! 6. `K[0:split, split:N] = K_st`, `K[split:N, 0:split] = K_stᵀ`
//!
//! Only the cross block changes; the diagonal blocks keep their original values.
//!
//! Step 4 is evaluated as `Q_s (Λ_s (Q_sᵀ Y_st Q_t) Λ_t) Q_tᵀ`, which is the same
//! product but keeps the inner work at k×k.

use log::{debug, info};
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{KernelError, KernelResult};
use crate::linalg::{block, check_square, row_normalize, scale_columns, scale_rows, write_block_symmetric};
use crate::offsets::Offsets;
use crate::spectral::{Eigenpairs, SpectralDecomposition};

/// `exp(β v)` element-wise.
fn exp_spectrum(values: &[f64], beta: f64) -> Vec<f64> {
    values.iter().map(|&v| (beta * v).exp()).collect()
}

/// `Q · diag(exp(β v)) · Qᵀ`: the rank-k exponential kernel of one block.
///
/// As β → 0 this tends to the projector `Q Qᵀ` onto the retained eigenspace.
pub fn spectral_block(pairs: &Eigenpairs, beta: f64) -> DenseMatrix<f64> {
    let lambda = exp_spectrum(&pairs.values, beta);
    let q = &pairs.vectors;
    scale_columns(q, &lambda).matmul(&q.transpose())
}

/// Replace the cross block of `k_full` in place.
///
/// # Errors
/// - `ShapeMismatch` if `k_full`, `offsets` and the eigenvector dimensions disagree
/// - `InvalidConfig` if `beta` is not finite and positive
pub fn reconstruct(
    k_full: &mut DenseMatrix<f64>,
    offsets: &Offsets,
    decomposition: &SpectralDecomposition,
    beta: f64,
    kernel_normal: bool,
) -> KernelResult<()> {
    if !(beta.is_finite() && beta > 0.0) {
        return Err(KernelError::InvalidConfig(format!(
            "beta must be finite and > 0, got {}",
            beta
        )));
    }
    let n = check_square(k_full)?;
    offsets.check(n)?;
    let split = offsets.split();

    let (src, tgt) = (&decomposition.source, &decomposition.target);
    if src.dim() != split || tgt.dim() != n - split {
        return Err(KernelError::ShapeMismatch(format!(
            "eigenvectors cover {}+{} instances but the kernel splits into {}+{}",
            src.dim(),
            tgt.dim(),
            split,
            n - split
        )));
    }

    debug!(
        "Reconstructing cross block {}x{} with beta={:e}, k_s={}, k_t={}",
        split,
        n - split,
        beta,
        src.k(),
        tgt.k()
    );

    let y_st = block(k_full, 0..split, split..n);

    // core = Λ_s (Q_sᵀ Y_st Q_t) Λ_t, k_s × k_t
    let core = src.vectors.transpose().matmul(&y_st).matmul(&tgt.vectors);
    let core = scale_rows(&core, &exp_spectrum(&src.values, beta));
    let core = scale_columns(&core, &exp_spectrum(&tgt.values, beta));

    let mut k_st = src.vectors.matmul(&core).matmul(&tgt.vectors.transpose());
    if !kernel_normal {
        k_st = row_normalize(&k_st);
    }

    write_block_symmetric(k_full, 0, split, &k_st);
    Ok(())
}

/// Clone `k` and reconstruct the clone's cross block; `k` itself is untouched.
pub fn exponential_kernel(
    k: &DenseMatrix<f64>,
    offsets: &Offsets,
    decomposition: &SpectralDecomposition,
    beta: f64,
    kernel_normal: bool,
) -> KernelResult<DenseMatrix<f64>> {
    let mut k_exp = k.clone();
    reconstruct(&mut k_exp, offsets, decomposition, beta, kernel_normal)?;
    info!(
        "Exponential kernel ready: beta={:e}, {}x{}",
        beta,
        k_exp.shape().0,
        k_exp.shape().1
    );
    Ok(k_exp)
}
