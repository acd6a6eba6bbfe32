//! # Spectral decomposition of the diagonal kernel blocks
//!
//! Given the combined kernel K and the source/target split, compute the top-k
//! eigenpairs of `K[0:split, 0:split]` and `K[split:N, split:N]` independently.
//!
//! ## Solvers
//!
//! - **Dense**: full symmetric EVD of the block (smartcore `EVDDecomposable`).
//! - **Lanczos**: Krylov iteration with full re-orthogonalisation from a seeded
//!   Gaussian start vector. The Ritz problem (tridiagonal T) is solved with the
//!   same dense EVD. When the requested Ritz residuals `|β_m s_{m,i}|` are not
//!   below `tol · max(1, |θ_i|)` the subspace is doubled and rebuilt; once it
//!   spans the block the pairs are exact. An invariant subspace (β ≈ 0) is
//!   continued with a fresh random direction orthogonal to the basis, which is
//!   what low-rank Gram blocks (e.g. cosine kernels over few features) need.
//! - **Auto**: Dense up to [`AUTO_DENSE_LIMIT`], Lanczos above.
//!
//! Selection follows the largest-magnitude convention; the retained pairs are
//! returned with eigenvalues in ascending order and eigenvectors as the columns
//! of an n×k matrix.
//!
//! ## Determinism
//!
//! The start vector comes from `ChaCha8Rng::seed_from_u64(seed)`, source block
//! with `seed`, target block with `seed + 1`. No process-wide state is used.

use log::{debug, info, trace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linalg::traits::evd::EVDDecomposable;

use crate::config::{EigenSolver, SpectralParams, AUTO_DENSE_LIMIT, LANCZOS_DEFAULT};
use crate::error::{KernelError, KernelResult};
use crate::linalg::{block, check_finite, check_square, check_symmetric, column, dot, matvec, norm};
use crate::offsets::Offsets;

/// Top-k eigenpairs of one symmetric block.
#[derive(Clone, Debug)]
pub struct Eigenpairs {
    /// Ascending eigenvalues (length k).
    pub values: Vec<f64>,
    /// Orthonormal eigenvectors as columns (n × k).
    pub vectors: DenseMatrix<f64>,
}

impl Eigenpairs {
    pub fn k(&self) -> usize {
        self.values.len()
    }

    /// Dimension of the block the pairs belong to.
    pub fn dim(&self) -> usize {
        self.vectors.shape().0
    }

    /// Build from unordered pairs: keep the `k` of largest magnitude, order ascending.
    ///
    /// `columns[i]` is the eigenvector of `values[i]`.
    fn select_top(values: &[f64], columns: &[Vec<f64>], k: usize, n: usize) -> Self {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| {
            values[b]
                .abs()
                .total_cmp(&values[a].abs())
                .then_with(|| a.cmp(&b))
        });
        order.truncate(k);
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then_with(|| a.cmp(&b)));

        let mut vectors = DenseMatrix::<f64>::zeros(n, k);
        for (c, &idx) in order.iter().enumerate() {
            for (r, &v) in columns[idx].iter().enumerate() {
                vectors.set((r, c), v);
            }
        }
        Self {
            values: order.iter().map(|&i| values[i]).collect(),
            vectors,
        }
    }
}

/// Eigenpairs of the source and target diagonal blocks.
#[derive(Clone, Debug)]
pub struct SpectralDecomposition {
    pub source: Eigenpairs,
    pub target: Eigenpairs,
}

/// Decompose both diagonal blocks of `k`.
///
/// # Errors
/// - `ShapeMismatch` if K is not square or the offsets do not fit it
/// - `NonFinite` if K holds a NaN or infinite entry
/// - `Asymmetric` if K is not symmetric within `params.symmetry_tol`
/// - `DecompositionFailure` if a block dimension is `<= params.max_k` or the
///   eigensolver fails
pub fn decompose(
    k: &DenseMatrix<f64>,
    offsets: &Offsets,
    params: &SpectralParams,
) -> KernelResult<SpectralDecomposition> {
    params.validate()?;
    let n = check_square(k)?;
    offsets.check(n)?;
    check_finite(k)?;
    check_symmetric(k, params.symmetry_tol)?;

    let split = offsets.split();
    info!(
        "Spectral decomposition: N={}, split={}, max_k={}, solver={:?}",
        n, split, params.max_k, params.solver
    );

    let w_s = block(k, 0..split, 0..split);
    let w_t = block(k, split..n, split..n);

    let source = eigsh(&w_s, params.max_k, params.solver, params.seed)?;
    debug!(
        "Source block {}x{}: eigenvalues [{:.6}, {:.6}]",
        split,
        split,
        source.values.first().copied().unwrap_or(f64::NAN),
        source.values.last().copied().unwrap_or(f64::NAN)
    );
    let target = eigsh(&w_t, params.max_k, params.solver, params.seed.wrapping_add(1))?;
    debug!(
        "Target block {}x{}: eigenvalues [{:.6}, {:.6}]",
        n - split,
        n - split,
        target.values.first().copied().unwrap_or(f64::NAN),
        target.values.last().copied().unwrap_or(f64::NAN)
    );

    info!("Spectral decomposition complete");
    Ok(SpectralDecomposition { source, target })
}

/// Top-`k` eigenpairs of one symmetric matrix.
pub fn eigsh(
    a: &DenseMatrix<f64>,
    k: usize,
    solver: EigenSolver,
    seed: u64,
) -> KernelResult<Eigenpairs> {
    let n = check_square(a)?;
    if k == 0 || n <= k {
        return Err(KernelError::DecompositionFailure(format!(
            "requested {} eigenpairs of a {}x{} block; need 0 < k < n",
            k, n, n
        )));
    }
    check_finite(a)?;

    let pairs = match solver {
        EigenSolver::Dense => dense_eigsh(a, k)?,
        EigenSolver::Lanczos { tol, max_expansions } => {
            lanczos_eigsh(a, k, tol, max_expansions, seed)?
        }
        EigenSolver::Auto if n <= AUTO_DENSE_LIMIT => dense_eigsh(a, k)?,
        EigenSolver::Auto => eigsh(a, k, LANCZOS_DEFAULT, seed)?,
    };

    if pairs.values.iter().any(|v| !v.is_finite()) {
        return Err(KernelError::DecompositionFailure(
            "eigensolver returned non-finite eigenvalues".into(),
        ));
    }
    Ok(pairs)
}

/// Full EVD, then keep the top-k.
fn dense_eigsh(a: &DenseMatrix<f64>, k: usize) -> KernelResult<Eigenpairs> {
    let n = a.shape().0;
    debug!("Dense EVD of {}x{} block, k={}", n, n, k);
    let (values, columns) = symmetric_evd(a)?;
    Ok(Eigenpairs::select_top(&values, &columns, k, n))
}

/// All eigenpairs of a symmetric matrix as (values, column vectors).
fn symmetric_evd(a: &DenseMatrix<f64>) -> KernelResult<(Vec<f64>, Vec<Vec<f64>>)> {
    let n = a.shape().0;
    let evd = a
        .evd(true)
        .map_err(|e| KernelError::DecompositionFailure(format!("symmetric EVD failed: {}", e)))?;
    let columns = (0..n).map(|c| column(&evd.V, c)).collect();
    Ok((evd.d, columns))
}

/// One Lanczos pass of `m` steps.
struct LanczosRun {
    basis: Vec<Vec<f64>>,
    alphas: Vec<f64>,
    /// Couplings between consecutive basis vectors (length m - 1).
    betas: Vec<f64>,
    /// Norm of the residual after the last step.
    beta_last: f64,
}

fn lanczos_eigsh(
    a: &DenseMatrix<f64>,
    k: usize,
    tol: f64,
    max_expansions: usize,
    seed: u64,
) -> KernelResult<Eigenpairs> {
    let n = a.shape().0;
    let mut m = n.min((2 * k + 1).max(k + 20));

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut start: Vec<f64> = (0..n).map(|_| StandardNormal.sample(&mut rng)).collect();
    let start_norm = norm(&start);
    if start_norm == 0.0 {
        return Err(KernelError::DecompositionFailure(
            "degenerate Lanczos start vector".into(),
        ));
    }
    start.iter_mut().for_each(|x| *x /= start_norm);

    for expansion in 0..max_expansions {
        debug!(
            "Lanczos pass {}: n={}, k={}, subspace={}",
            expansion, n, k, m
        );
        let run = lanczos_run(a, &start, m, &mut rng)?;
        let m_eff = run.basis.len();

        let mut t = DenseMatrix::<f64>::zeros(m_eff, m_eff);
        for (i, &alpha) in run.alphas.iter().enumerate() {
            t.set((i, i), alpha);
        }
        for (i, &beta) in run.betas.iter().enumerate() {
            t.set((i, i + 1), beta);
            t.set((i + 1, i), beta);
        }
        let (theta, s) = symmetric_evd(&t)?;

        let ritz = Eigenpairs::select_top(&theta, &s, k, m_eff);
        let exact = m_eff == n;
        let mut converged = true;
        for (c, &value) in ritz.values.iter().enumerate() {
            let residual = if exact {
                0.0
            } else {
                (run.beta_last * *ritz.vectors.get((m_eff - 1, c))).abs()
            };
            trace!(
                "Ritz pair {}: theta={:.6e}, residual={:.3e}",
                c,
                value,
                residual
            );
            if residual > tol * value.abs().max(1.0) {
                converged = false;
            }
        }

        if converged {
            info!(
                "Lanczos converged: {} pairs from a {}-dimensional subspace",
                k, m_eff
            );
            return Ok(ritz_vectors(&run.basis, ritz, n));
        }
        if m_eff == n {
            break;
        }
        m = n.min(2 * m);
    }

    Err(KernelError::DecompositionFailure(format!(
        "Lanczos did not converge after {} expansions (n={}, k={}, tol={:e})",
        max_expansions, n, k, tol
    )))
}

/// Map Ritz vectors of T back to the block: `y_i = Q s_i`.
fn ritz_vectors(basis: &[Vec<f64>], ritz: Eigenpairs, n: usize) -> Eigenpairs {
    let k = ritz.k();
    let mut vectors = DenseMatrix::<f64>::zeros(n, k);
    for c in 0..k {
        let mut y = vec![0.0; n];
        for (j, q) in basis.iter().enumerate() {
            let coeff = *ritz.vectors.get((j, c));
            y.iter_mut().zip(q).for_each(|(yi, qi)| *yi += coeff * qi);
        }
        let y_norm = norm(&y);
        for (r, v) in y.into_iter().enumerate() {
            vectors.set((r, c), if y_norm > 0.0 { v / y_norm } else { v });
        }
    }
    Eigenpairs {
        values: ritz.values,
        vectors,
    }
}

/// Orthogonalise `w` against every vector of `basis`, twice.
fn reorthogonalise(w: &mut [f64], basis: &[Vec<f64>]) {
    for _ in 0..2 {
        for q in basis {
            let h = dot(w, q);
            w.iter_mut().zip(q).for_each(|(wi, qi)| *wi -= h * qi);
        }
    }
}

fn lanczos_run(
    a: &DenseMatrix<f64>,
    start: &[f64],
    m: usize,
    rng: &mut ChaCha8Rng,
) -> KernelResult<LanczosRun> {
    let n = start.len();
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(m);
    let mut alphas = Vec::with_capacity(m);
    let mut betas = Vec::with_capacity(m.saturating_sub(1));
    let mut beta_last = 0.0;
    let mut scale = 0.0f64;

    let mut q = start.to_vec();
    for j in 0..m {
        basis.push(q.clone());
        let mut w = matvec(a, &q);
        let alpha = dot(&w, &q);
        alphas.push(alpha);
        reorthogonalise(&mut w, &basis);

        let beta = norm(&w);
        scale = scale.max(alpha.abs()).max(beta);
        if j + 1 == m {
            beta_last = beta;
            break;
        }

        if beta <= 1e-10 * scale.max(1.0) {
            // Invariant subspace: continue from a random direction orthogonal to the basis.
            trace!("Lanczos breakdown at step {} (beta={:.3e})", j, beta);
            let mut fresh: Vec<f64> = (0..n).map(|_| StandardNormal.sample(rng)).collect();
            reorthogonalise(&mut fresh, &basis);
            let f_norm = norm(&fresh);
            if f_norm <= 1e-12 {
                return Err(KernelError::DecompositionFailure(format!(
                    "Lanczos could not extend the basis past {} vectors",
                    basis.len()
                )));
            }
            q = fresh.into_iter().map(|x| x / f_norm).collect();
            betas.push(0.0);
        } else {
            q = w.into_iter().map(|x| x / beta).collect();
            betas.push(beta);
        }
    }

    Ok(LanczosRun {
        basis,
        alphas,
        betas,
        beta_last,
    })
}
