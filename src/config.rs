//! Immutable, validated configuration for an experiment run.
//!
//! Every knob of the pipeline is a field on one of the structs below; nothing is
//! set by ad hoc attribute assignment after construction. `ExperimentConfig`
//! bundles them and can be loaded from JSON.
//!
//! Grid axes are expressed in log2 space and produced with [`log2_range`], which
//! follows `arange` semantics (exclusive upper bound):
//!
//! ```
//! use tlkernel::config::log2_range;
//!
//! assert_eq!(log2_range(-20, -8, 2).unwrap(), vec![-20, -18, -16, -14, -12, -10]);
//! assert_eq!(log2_range(-1, 11, 2).unwrap(), vec![-1, 1, 3, 5, 7, 9]);
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

/// Sentinel on the sparsity axis meaning "keep the dense kernel".
pub const NO_SPARSIFY: i32 = -1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelType {
    #[default]
    Cosine,
    Rbf,
}

/// Which held-out subset the data component exposes as the evaluation set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Part of target-train is held out; used by the grid search.
    #[default]
    Validation,
    /// Target-test is held out; used for the final report.
    Test,
}

/// Symmetric eigensolver used per diagonal block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EigenSolver {
    /// Dense when the block is small, Lanczos otherwise.
    #[default]
    Auto,
    /// Full symmetric EVD of the block.
    Dense,
    /// Lanczos with full re-orthogonalisation and an expanding Krylov subspace.
    Lanczos { tol: f64, max_expansions: usize },
}

/// Blocks up to this dimension are decomposed densely under `EigenSolver::Auto`.
pub const AUTO_DENSE_LIMIT: usize = 512;

/// Lanczos settings used when `Auto` picks the iterative path.
pub const LANCZOS_DEFAULT: EigenSolver = EigenSolver::Lanczos {
    tol: 1e-10,
    max_expansions: 8,
};

/// Base kernel construction flags passed to the data component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub kernel_type: KernelType,
    /// Zero the diagonal of the within-domain blocks.
    pub zero_diag: bool,
    /// Degree-normalise the kernel upstream; the reconstructor then skips row normalisation.
    pub kernel_normal: bool,
    /// RBF width; `None` means `1 / sqrt(dim)` of each domain.
    pub rbf_gamma: Option<f64>,
    /// Weight written at each (source para, target para) pair in the cross block.
    pub link_weight: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            kernel_type: KernelType::Cosine,
            zero_diag: true,
            kernel_normal: false,
            rbf_gamma: None,
            link_weight: 1.0,
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> KernelResult<()> {
        if let Some(gamma) = self.rbf_gamma {
            if !(gamma.is_finite() && gamma > 0.0) {
                return Err(KernelError::InvalidConfig(format!(
                    "rbf_gamma must be finite and > 0, got {}",
                    gamma
                )));
            }
        }
        if !self.link_weight.is_finite() {
            return Err(KernelError::InvalidConfig(format!(
                "link_weight must be finite, got {}",
                self.link_weight
            )));
        }
        Ok(())
    }
}

/// Parameters of the per-block spectral decomposition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralParams {
    /// Eigenpairs kept per block; must be strictly below each block dimension.
    pub max_k: usize,
    pub solver: EigenSolver,
    /// Seed of the Lanczos start vector.
    pub seed: u64,
    /// Largest tolerated |K_ij - K_ji|.
    pub symmetry_tol: f64,
}

impl Default for SpectralParams {
    fn default() -> Self {
        Self {
            max_k: 128,
            solver: EigenSolver::Auto,
            seed: 123,
            symmetry_tol: 1e-8,
        }
    }
}

impl SpectralParams {
    pub fn with_max_k(mut self, max_k: usize) -> Self {
        self.max_k = max_k;
        self
    }

    pub fn with_solver(mut self, solver: EigenSolver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> KernelResult<()> {
        if self.max_k == 0 {
            return Err(KernelError::InvalidConfig("max_k must be > 0".into()));
        }
        if !(self.symmetry_tol.is_finite() && self.symmetry_tol >= 0.0) {
            return Err(KernelError::InvalidConfig(format!(
                "symmetry_tol must be finite and >= 0, got {}",
                self.symmetry_tol
            )));
        }
        if let EigenSolver::Lanczos { tol, max_expansions } = self.solver {
            if !(tol.is_finite() && tol > 0.0) || max_expansions == 0 {
                return Err(KernelError::InvalidConfig(format!(
                    "lanczos needs tol > 0 and max_expansions > 0, got tol={} max_expansions={}",
                    tol, max_expansions
                )));
            }
        }
        Ok(())
    }
}

/// Settings of the regularised label-propagation solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Added to the system diagonal; 0 gives the plain closed form.
    pub ridge: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self { ridge: 1e-10 }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> KernelResult<()> {
        if !(self.ridge.is_finite() && self.ridge >= 0.0) {
            return Err(KernelError::InvalidConfig(format!(
                "ridge must be finite and >= 0, got {}",
                self.ridge
            )));
        }
        Ok(())
    }
}

/// `arange(start, stop, step)` over integers: `stop` is excluded.
pub fn log2_range(start: i32, stop: i32, step: i32) -> KernelResult<Vec<i32>> {
    if step == 0 {
        return Err(KernelError::InvalidConfig("range step must be non-zero".into()));
    }
    let mut out = Vec::new();
    let mut v = start;
    while (step > 0 && v < stop) || (step < 0 && v > stop) {
        out.push(v);
        v += step;
    }
    Ok(out)
}

/// Candidate log2 values for each axis of the grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    pub b_list: Vec<i32>,
    pub w_list: Vec<i32>,
    pub p_list: Vec<i32>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            b_list: vec![-20, -18, -16, -14, -12, -10],
            w_list: vec![-12],
            p_list: vec![-1, 1, 3, 5, 7, 9],
        }
    }
}

impl GridSpec {
    pub fn from_ranges(
        b: (i32, i32, i32),
        w: (i32, i32, i32),
        p: (i32, i32, i32),
    ) -> KernelResult<Self> {
        Ok(Self {
            b_list: log2_range(b.0, b.1, b.2)?,
            w_list: log2_range(w.0, w.1, w.2)?,
            p_list: log2_range(p.0, p.1, p.2)?,
        })
    }

    /// Fails on the first empty axis.
    pub fn validate(&self) -> KernelResult<()> {
        if self.b_list.is_empty() {
            return Err(KernelError::EmptyCandidateSet("beta"));
        }
        if self.w_list.is_empty() {
            return Err(KernelError::EmptyCandidateSet("weight"));
        }
        if self.p_list.is_empty() {
            return Err(KernelError::EmptyCandidateSet("sparsity"));
        }
        if let Some(p) = self.p_list.iter().find(|&&p| p < 0 && p != NO_SPARSIFY) {
            return Err(KernelError::InvalidConfig(format!(
                "sparsity exponent {} is neither >= 0 nor the sentinel {}",
                p, NO_SPARSIFY
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.b_list.len() * self.w_list.len() * self.p_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One point of the grid, in log2 space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperparams {
    pub log2_b: i32,
    pub log2_w: i32,
    pub log2_p: i32,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            log2_b: -12,
            log2_w: -12,
            log2_p: NO_SPARSIFY,
        }
    }
}

impl Hyperparams {
    pub fn new(log2_b: i32, log2_w: i32, log2_p: i32) -> Self {
        Self { log2_b, log2_w, log2_p }
    }

    /// Exponential kernel scale.
    pub fn beta(&self) -> f64 {
        2f64.powi(self.log2_b)
    }

    /// Regularisation weight.
    pub fn weight(&self) -> f64 {
        2f64.powi(self.log2_w)
    }

    /// Neighbour count for sparsification; `None` for the sentinel.
    pub fn neighbours(&self) -> Option<usize> {
        if self.log2_p == NO_SPARSIFY || self.log2_p < 0 {
            None
        } else {
            Some(1usize << self.log2_p.min(62) as u32)
        }
    }
}

/// Location and split settings of the on-disk dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub dir: PathBuf,
    /// Share of target-train held out in validation mode.
    pub valid_fraction: f64,
    pub seed: u64,
    /// Label fields are comma-separated class ids instead of a single ±1 value.
    pub multilabel: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            valid_fraction: 0.2,
            seed: 123,
            multilabel: false,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> KernelResult<()> {
        if !(self.valid_fraction > 0.0 && self.valid_fraction < 1.0) {
            return Err(KernelError::InvalidConfig(format!(
                "valid_fraction must be in (0, 1), got {}",
                self.valid_fraction
            )));
        }
        Ok(())
    }
}

/// Everything a grid search or a test-set run needs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub kernel: KernelConfig,
    pub spectral: SpectralParams,
    pub solver: SolverConfig,
    pub grid: GridSpec,
    pub test_params: Hyperparams,
    pub dataset: DatasetConfig,
}

impl ExperimentConfig {
    pub fn new() -> Self {
        info!("Initializing default ExperimentConfig");
        Self::default()
    }

    pub fn with_kernel(mut self, kernel: KernelConfig) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_spectral(mut self, spectral: SpectralParams) -> Self {
        self.spectral = spectral;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_test_params(mut self, params: Hyperparams) -> Self {
        self.test_params = params;
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetConfig) -> Self {
        self.dataset = dataset;
        self
    }

    /// Read a JSON config; missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        info!("Loading experiment config from {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        let cfg: Self = serde_json::from_reader(reader)?;
        debug!("Loaded config: {:?}", cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Grid axes are not checked here; `grid` reports empty axes when it runs.
    pub fn validate(&self) -> KernelResult<()> {
        self.kernel.validate()?;
        self.spectral.validate()?;
        self.solver.validate()?;
        self.dataset.validate()
    }
}
