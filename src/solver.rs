//! Closed-form regularised label propagation over a transfer kernel.
//!
//! With labelled set L = (source train ∪ target train) \ I, the indicator
//! diagonal J of L and the graph Laplacian `Lap = D - K`:
//!
//! ```text
//! F* = argmin_F  Σ_{i∈L} ‖F_i - Y_i‖² + w · tr(Fᵀ Lap F)
//!    = (J + w·Lap + ridge·I)⁻¹ J Y
//! ```
//!
//! The system is solved exactly with an LU factorisation; `F*[I]` is then scored
//! against `Y[I]`.

use log::{debug, info};
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linalg::traits::lu::LUDecomposable;

use crate::config::SolverConfig;
use crate::error::{KernelError, KernelResult};
use crate::grid::Evaluator;
use crate::metrics::Metrics;
use crate::offsets::{Offsets, Segment};

#[derive(Clone, Debug, Default)]
pub struct LabelPropagation {
    config: SolverConfig,
}

impl LabelPropagation {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Which instances carry a training label.
    pub fn labelled_mask(offsets: &Offsets, eval_indices: &[usize]) -> Vec<bool> {
        let mut mask = vec![false; offsets.total()];
        for seg in [Segment::SourceTrain, Segment::TargetTrain] {
            for i in offsets.segment(seg) {
                mask[i] = true;
            }
        }
        for &i in eval_indices {
            if i < mask.len() {
                mask[i] = false;
            }
        }
        mask
    }

    /// Predicted label scores for every instance (N × C).
    pub fn propagate(
        &self,
        labels: &DenseMatrix<f64>,
        eval_indices: &[usize],
        kernel: &DenseMatrix<f64>,
        offsets: &Offsets,
        weight: f64,
    ) -> KernelResult<DenseMatrix<f64>> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(KernelError::InvalidConfig(format!(
                "regularisation weight must be finite and > 0, got {}",
                weight
            )));
        }
        let (n, m) = kernel.shape();
        if n != m || labels.shape().0 != n {
            return Err(KernelError::ShapeMismatch(format!(
                "kernel {}x{} with {} label rows",
                n,
                m,
                labels.shape().0
            )));
        }
        offsets.check(n)?;

        let mask = Self::labelled_mask(offsets, eval_indices);
        let n_labelled = mask.iter().filter(|&&l| l).count();
        if n_labelled == 0 {
            return Err(KernelError::ShapeMismatch(
                "no labelled instances left outside the evaluation set".into(),
            ));
        }
        let c = labels.shape().1;
        debug!(
            "Label propagation: N={}, C={}, labelled={}, w={:e}, ridge={:e}",
            n, c, n_labelled, weight, self.config.ridge
        );

        // A = J + w (D - K) + ridge I
        let mut a = DenseMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            let mut degree = 0.0;
            for j in 0..n {
                let kij = *kernel.get((i, j));
                degree += kij;
                a.set((i, j), -weight * kij);
            }
            let jii = if mask[i] { 1.0 } else { 0.0 };
            a.set((i, i), *a.get((i, i)) + weight * degree + jii + self.config.ridge);
        }

        // B = J Y
        let mut b = DenseMatrix::<f64>::zeros(n, c);
        for i in (0..n).filter(|&i| mask[i]) {
            for j in 0..c {
                b.set((i, j), *labels.get((i, j)));
            }
        }

        let lu = a
            .lu()
            .map_err(|e| KernelError::SolveFailure(format!("LU factorisation failed: {}", e)))?;
        let u = lu.U();
        if let Some(i) = (0..n).find(|&i| {
            let p = *u.get((i, i));
            p == 0.0 || !p.is_finite()
        }) {
            return Err(KernelError::SolveFailure(format!(
                "system matrix is singular (zero pivot at {})",
                i
            )));
        }
        a.lu_solve_mut(b)
            .map_err(|e| KernelError::SolveFailure(format!("LU solve failed: {}", e)))
    }
}

impl Evaluator for LabelPropagation {
    fn solve_and_eval(
        &self,
        labels: &DenseMatrix<f64>,
        eval_indices: &[usize],
        kernel: &DenseMatrix<f64>,
        offsets: &Offsets,
        weight: f64,
    ) -> KernelResult<Metrics> {
        let f = self.propagate(labels, eval_indices, kernel, offsets, weight)?;
        let c = labels.shape().1;

        let scores: Vec<Vec<f64>> = eval_indices
            .iter()
            .map(|&i| (0..c).map(|j| *f.get((i, j))).collect())
            .collect();
        let truth: Vec<Vec<f64>> = eval_indices
            .iter()
            .map(|&i| (0..c).map(|j| *labels.get((i, j))).collect())
            .collect();

        let metrics = Metrics::evaluate(&scores, &truth)?;
        info!("Evaluated {} held-out instances: {}", eval_indices.len(), metrics);
        Ok(metrics)
    }
}
