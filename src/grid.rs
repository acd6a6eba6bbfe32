//! # Grid search driver and test-set runner
//!
//! Both run the same pipeline:
//!
//! 1. obtain `(y, I, K, offsets)` from a [`KernelSource`]
//! 2. decompose the diagonal blocks of K once
//! 3. per beta: clone K and reconstruct its cross block ([`exponential_kernel`])
//! 4. per sparsity: symmetric p-NN sparsification, or the exponential kernel as
//!    is for the sentinel
//! 5. per weight: delegate to an [`Evaluator`] and collect `(auc, ap, rl)`
//!
//! The grid sweep is exhaustive over `b_list × w_list × p_list` and keeps the
//! first record with the strictly highest AUC.

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::config::{ExperimentConfig, Hyperparams};
use crate::error::{KernelError, KernelResult};
use crate::metrics::Metrics;
use crate::offsets::Offsets;
use crate::reconstruct::exponential_kernel;
use crate::sparsification::sym_sparsify;
use crate::spectral::decompose;

/// Everything the core needs from the data component.
#[derive(Clone, Debug)]
pub struct TlProblem {
    /// N × C, entries in {0, 1}.
    pub labels: DenseMatrix<f64>,
    /// Held-out instances scored by the evaluator.
    pub eval_indices: Vec<usize>,
    /// N × N combined kernel.
    pub kernel: DenseMatrix<f64>,
    pub offsets: Offsets,
}

impl TlProblem {
    pub fn check(&self) -> KernelResult<()> {
        let (n, m) = self.kernel.shape();
        if n != m {
            return Err(KernelError::ShapeMismatch(format!(
                "kernel must be square, got {}x{}",
                n, m
            )));
        }
        self.offsets.check(n)?;
        if self.labels.shape().0 != n {
            return Err(KernelError::ShapeMismatch(format!(
                "{} label rows for {} instances",
                self.labels.shape().0,
                n
            )));
        }
        if let Some(&bad) = self.eval_indices.iter().find(|&&i| i >= n) {
            return Err(KernelError::ShapeMismatch(format!(
                "evaluation index {} out of range for {} instances",
                bad, n
            )));
        }
        Ok(())
    }
}

/// Builds the base transfer-learning kernel.
pub trait KernelSource {
    fn tl_kernel(&self) -> KernelResult<TlProblem>;
}

/// Solves the regularised problem on a working kernel and scores the held-out set.
pub trait Evaluator {
    fn solve_and_eval(
        &self,
        labels: &DenseMatrix<f64>,
        eval_indices: &[usize],
        kernel: &DenseMatrix<f64>,
        offsets: &Offsets,
        weight: f64,
    ) -> KernelResult<Metrics>;
}

/// One evaluated grid point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridRecord {
    pub params: Hyperparams,
    pub metrics: Metrics,
}

impl fmt::Display for GridRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "log2_b {:3} log2_w {:3} log2_p {:3} {}",
            self.params.log2_b, self.params.log2_w, self.params.log2_p, self.metrics
        )
    }
}

/// All records of a sweep, in evaluation order, plus the best one by AUC.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GridReport {
    pub records: Vec<GridRecord>,
    pub best: Option<GridRecord>,
}

impl GridReport {
    /// The closing summary line of a sweep.
    pub fn summary(&self) -> String {
        match &self.best {
            Some(b) => format!(
                "best parameters: log2_b {:3} log2_w {:3} log2_p {:3} auc {:.6}",
                b.params.log2_b, b.params.log2_w, b.params.log2_p, b.metrics.auc
            ),
            None => "best parameters: none (no record with a defined AUC)".to_string(),
        }
    }

    fn push(&mut self, record: GridRecord) {
        let improves = match &self.best {
            None => !record.metrics.auc.is_nan(),
            Some(best) => best.metrics.auc < record.metrics.auc,
        };
        if improves {
            debug!("New best: {}", record);
            self.best = Some(record);
        }
        self.records.push(record);
    }
}

/// Working kernel for one sparsity level.
fn working_kernel(k_exp: &DenseMatrix<f64>, params: &Hyperparams) -> KernelResult<DenseMatrix<f64>> {
    match params.neighbours() {
        None => Ok(k_exp.clone()),
        Some(p) => sym_sparsify(k_exp, p),
    }
}

/// Exhaustive hyperparameter search on the validation split.
///
/// `source` is expected to be configured in validation mode.
pub fn grid<S: KernelSource, E: Evaluator>(
    source: &S,
    evaluator: &E,
    config: &ExperimentConfig,
) -> KernelResult<GridReport> {
    config.grid.validate()?;
    config.validate()?;

    info!(
        "Grid search over {} combinations (beta {:?}, weight {:?}, sparsity {:?})",
        config.grid.len(),
        config.grid.b_list,
        config.grid.w_list,
        config.grid.p_list
    );

    let problem = source.tl_kernel()?;
    problem.check()?;
    let decomposition = decompose(&problem.kernel, &problem.offsets, &config.spectral)?;

    let mut report = GridReport::default();
    for &log2_b in &config.grid.b_list {
        let beta = 2f64.powi(log2_b);
        let k_exp = exponential_kernel(
            &problem.kernel,
            &problem.offsets,
            &decomposition,
            beta,
            config.kernel.kernel_normal,
        )?;

        for &log2_w in &config.grid.w_list {
            for &log2_p in &config.grid.p_list {
                let params = Hyperparams::new(log2_b, log2_w, log2_p);
                let k_sp = working_kernel(&k_exp, &params)?;
                let metrics = evaluator.solve_and_eval(
                    &problem.labels,
                    &problem.eval_indices,
                    &k_sp,
                    &problem.offsets,
                    params.weight(),
                )?;
                let record = GridRecord { params, metrics };
                info!("{}", record);
                report.push(record);
            }
        }
    }

    info!("{}", report.summary());
    Ok(report)
}

/// Single fixed-hyperparameter run on the test split.
///
/// `source` is expected to be configured in test mode.
pub fn run_testset<S: KernelSource, E: Evaluator>(
    source: &S,
    evaluator: &E,
    config: &ExperimentConfig,
    params: Hyperparams,
) -> KernelResult<Metrics> {
    config.validate()?;
    info!(
        "Test-set run: log2_b={} log2_w={} log2_p={}",
        params.log2_b, params.log2_w, params.log2_p
    );

    let problem = source.tl_kernel()?;
    problem.check()?;
    let decomposition = decompose(&problem.kernel, &problem.offsets, &config.spectral)?;

    let k_exp = exponential_kernel(
        &problem.kernel,
        &problem.offsets,
        &decomposition,
        params.beta(),
        config.kernel.kernel_normal,
    )?;
    let k_sp = working_kernel(&k_exp, &params)?;

    let metrics = evaluator.solve_and_eval(
        &problem.labels,
        &problem.eval_indices,
        &k_sp,
        &problem.offsets,
        params.weight(),
    )?;
    info!("test set: {}", metrics);
    Ok(metrics)
}
