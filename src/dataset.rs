//! # Transfer-learning data component
//!
//! Loads the six svmlight segments of a source/target problem and builds the
//! base kernel handed to the spectral pipeline.
//!
//! ## Layout
//!
//! Instances are stacked as
//! `[source train | source test | source para | target train | target test | target para]`.
//! The two within-domain blocks hold a cosine or RBF similarity over that
//! domain's features; the cross block only carries `link_weight` at each
//! (source para i, target para i) pair. Reconstruction later fills it in.
//!
//! ## Labels
//!
//! Binary files carry one value per line (`> 0` is the positive class, C = 1).
//! Multi-label files carry comma-separated class ids (C = largest id + 1). Rows
//! of the paraphrase segments are unlabelled.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::{CsMat, TriMat};

use crate::config::{DatasetConfig, KernelConfig, KernelType, SplitMode};
use crate::error::{KernelError, KernelResult};
use crate::grid::{KernelSource, TlProblem};
use crate::linalg::{row_normalize, write_block, write_block_symmetric};
use crate::offsets::{Offsets, Segment, N_SEGMENTS};

/// One parsed svmlight file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SvmData {
    /// Sparse feature rows: sorted, unique 0-based column indices.
    pub rows: Vec<Vec<(usize, f64)>>,
    /// Active class columns per row.
    pub labels: Vec<Vec<usize>>,
    /// One past the largest feature index seen.
    pub dim: usize,
    /// Label columns this file needs.
    pub n_labels: usize,
}

impl SvmData {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn parse_error(line: usize, message: impl Into<String>) -> KernelError {
    KernelError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_labels(field: &str, multilabel: bool, line: usize) -> KernelResult<Vec<usize>> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    if multilabel {
        let mut ids = Vec::new();
        for tok in field.split(',').filter(|t| !t.is_empty()) {
            let id: usize = tok
                .parse()
                .map_err(|_| parse_error(line, format!("bad class id `{}`", tok)))?;
            ids.push(id);
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    } else {
        let v: f64 = field
            .parse()
            .map_err(|_| parse_error(line, format!("bad label `{}`", field)))?;
        Ok(if v > 0.0 { vec![0] } else { Vec::new() })
    }
}

/// Parse svmlight lines `labels idx:val idx:val ...` with 1-based indices.
///
/// A line whose first token contains `:` has an empty label field. `#` starts a
/// comment; blank lines are skipped.
pub fn parse_svmlight<R: BufRead>(reader: R, multilabel: bool) -> KernelResult<SvmData> {
    let mut out = SvmData {
        n_labels: if multilabel { 0 } else { 1 },
        ..Default::default()
    };

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = lineno + 1;
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let mut tokens = content.split_whitespace().peekable();
        let label_field = match tokens.peek() {
            Some(t) if !t.contains(':') => tokens.next().unwrap_or(""),
            _ => "",
        };
        let labels = parse_labels(label_field, multilabel, lineno)?;

        let mut row = Vec::new();
        for tok in tokens {
            let (idx, val) = tok
                .split_once(':')
                .ok_or_else(|| parse_error(lineno, format!("expected idx:val, got `{}`", tok)))?;
            let idx: usize = idx
                .parse()
                .map_err(|_| parse_error(lineno, format!("bad feature index `{}`", idx)))?;
            if idx == 0 {
                return Err(parse_error(lineno, "feature indices are 1-based"));
            }
            let val: f64 = val
                .parse()
                .map_err(|_| parse_error(lineno, format!("bad feature value `{}`", val)))?;
            row.push((idx - 1, val));
        }
        row.sort_unstable_by_key(|&(j, _)| j);
        if row.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(parse_error(lineno, "duplicate feature index"));
        }

        if let Some(&(last, _)) = row.last() {
            out.dim = out.dim.max(last + 1);
        }
        if let Some(&top) = labels.last() {
            out.n_labels = out.n_labels.max(top + 1);
        }
        out.rows.push(row);
        out.labels.push(labels);
    }

    debug!(
        "Parsed svmlight: {} rows, dim={}, labels={}",
        out.rows.len(),
        out.dim,
        out.n_labels
    );
    Ok(out)
}

/// The six segments of a transfer problem, in layout order.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferData {
    segments: [SvmData; N_SEGMENTS],
}

impl TransferData {
    pub fn from_segments(segments: [SvmData; N_SEGMENTS]) -> KernelResult<Self> {
        let (sp, tp) = (
            segments[Segment::SourcePara as usize].len(),
            segments[Segment::TargetPara as usize].len(),
        );
        if sp != tp {
            return Err(KernelError::ShapeMismatch(format!(
                "{} source paraphrases but {} target paraphrases",
                sp, tp
            )));
        }
        Ok(Self { segments })
    }

    /// Read `source_train.svm` … `target_para.svm` from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>, multilabel: bool) -> KernelResult<Self> {
        let dir = dir.as_ref();
        info!("Loading transfer data from {}", dir.display());
        let mut segments: [SvmData; N_SEGMENTS] = Default::default();
        for seg in Segment::ALL {
            let path = dir.join(seg.file_name());
            let reader = BufReader::new(File::open(&path)?);
            segments[seg as usize] = parse_svmlight(reader, multilabel)?;
            debug!("{}: {} rows", path.display(), segments[seg as usize].len());
        }
        Self::from_segments(segments)
    }

    pub fn segment(&self, seg: Segment) -> &SvmData {
        &self.segments[seg as usize]
    }

    pub fn offsets(&self) -> Offsets {
        let mut sizes = [0usize; N_SEGMENTS];
        for seg in Segment::ALL {
            sizes[seg as usize] = self.segment(seg).len();
        }
        Offsets::from_sizes(sizes)
    }

    pub fn n_labels(&self) -> usize {
        self.segments.iter().map(|s| s.n_labels).max().unwrap_or(1).max(1)
    }

    /// Stacked feature rows of one domain as CSR.
    fn domain_features(&self, source: bool) -> CsMat<f64> {
        let segs: Vec<&SvmData> = Segment::ALL
            .iter()
            .filter(|s| s.is_source() == source)
            .map(|&s| self.segment(s))
            .collect();
        let n: usize = segs.iter().map(|s| s.len()).sum();
        let dim = segs.iter().map(|s| s.dim).max().unwrap_or(0).max(1);

        let mut triplets = TriMat::new((n, dim));
        let mut i = 0;
        for seg in segs {
            for row in &seg.rows {
                for &(j, v) in row {
                    triplets.add_triplet(i, j, v);
                }
                i += 1;
            }
        }
        triplets.to_csr()
    }
}

fn sparse_dot(a_idx: &[usize], a_val: &[f64], b_idx: &[usize], b_val: &[f64]) -> f64 {
    let (mut p, mut q, mut acc) = (0, 0, 0.0);
    while p < a_idx.len() && q < b_idx.len() {
        match a_idx[p].cmp(&b_idx[q]) {
            std::cmp::Ordering::Less => p += 1,
            std::cmp::Ordering::Greater => q += 1,
            std::cmp::Ordering::Equal => {
                acc += a_val[p] * b_val[q];
                p += 1;
                q += 1;
            }
        }
    }
    acc
}

/// Pairwise similarity over the rows of `x` (cosine or RBF).
pub fn similarity_block(x: &CsMat<f64>, kernel_type: KernelType, gamma: f64) -> DenseMatrix<f64> {
    let n = x.rows();
    let rows: Vec<(Vec<usize>, Vec<f64>)> = x
        .outer_iterator()
        .map(|r| (r.indices().to_vec(), r.data().to_vec()))
        .collect();
    let sq: Vec<f64> = rows
        .iter()
        .map(|(i, v)| sparse_dot(i, v, i, v))
        .collect();

    let flat: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|a| {
            (0..n)
                .map(|b| {
                    let d = sparse_dot(&rows[a].0, &rows[a].1, &rows[b].0, &rows[b].1);
                    match kernel_type {
                        KernelType::Cosine => {
                            let denom = (sq[a] * sq[b]).sqrt();
                            if denom > 0.0 {
                                d / denom
                            } else {
                                0.0
                            }
                        }
                        KernelType::Rbf => {
                            let dist = (sq[a] + sq[b] - 2.0 * d).max(0.0);
                            (-gamma * dist).exp()
                        }
                    }
                })
                .collect()
        })
        .collect();
    DenseMatrix::from_iterator(flat.into_iter().flatten(), n, n, 0)
}

/// `D^{-1/2} W D^{-1/2}` with D the row sums of W; isolated nodes stay zero.
pub fn degree_normalize(w: &DenseMatrix<f64>) -> DenseMatrix<f64> {
    let (n, _) = w.shape();
    let inv_sqrt: Vec<f64> = (0..n)
        .map(|i| {
            let d: f64 = (0..n).map(|j| *w.get((i, j))).sum();
            if d > 0.0 {
                1.0 / d.sqrt()
            } else {
                0.0
            }
        })
        .collect();
    let mut out = w.clone();
    for i in 0..n {
        for j in 0..n {
            out.set((i, j), *w.get((i, j)) * inv_sqrt[i] * inv_sqrt[j]);
        }
    }
    out
}

/// Builds `(y, I, K, offsets)` from loaded transfer data.
#[derive(Clone, Debug)]
pub struct DataClass {
    data: TransferData,
    kernel: KernelConfig,
    mode: SplitMode,
    valid_fraction: f64,
    seed: u64,
}

impl DataClass {
    pub fn new(data: TransferData, kernel: KernelConfig, mode: SplitMode) -> Self {
        let defaults = DatasetConfig::default();
        Self {
            data,
            kernel,
            mode,
            valid_fraction: defaults.valid_fraction,
            seed: defaults.seed,
        }
    }

    pub fn with_dataset(mut self, dataset: &DatasetConfig) -> Self {
        self.valid_fraction = dataset.valid_fraction;
        self.seed = dataset.seed;
        self
    }

    /// Load from `dataset.dir` and configure in one go.
    pub fn from_config(
        dataset: &DatasetConfig,
        kernel: KernelConfig,
        mode: SplitMode,
    ) -> KernelResult<Self> {
        dataset.validate()?;
        kernel.validate()?;
        let data = TransferData::load_dir(&dataset.dir, dataset.multilabel)?;
        Ok(Self::new(data, kernel, mode).with_dataset(dataset))
    }

    fn domain_block(&self, source: bool) -> DenseMatrix<f64> {
        let x = self.data.domain_features(source);
        let gamma = self
            .kernel
            .rbf_gamma
            .unwrap_or_else(|| 1.0 / (x.cols() as f64).sqrt());
        debug!(
            "{} block: {} rows, dim={}, kernel={:?}, gamma={:e}",
            if source { "source" } else { "target" },
            x.rows(),
            x.cols(),
            self.kernel.kernel_type,
            gamma
        );
        let mut w = similarity_block(&x, self.kernel.kernel_type, gamma);
        if self.kernel.zero_diag {
            for i in 0..x.rows() {
                w.set((i, i), 0.0);
            }
        }
        if self.kernel.kernel_normal {
            w = degree_normalize(&w);
        }
        w
    }

    fn cross_block(&self, offsets: &Offsets) -> DenseMatrix<f64> {
        let split = offsets.split();
        let n = offsets.total();
        let mut cross = DenseMatrix::<f64>::zeros(split, n - split);
        let src = offsets.segment(Segment::SourcePara);
        let tgt = offsets.segment(Segment::TargetPara);
        for (i, j) in src.zip(tgt) {
            cross.set((i, j - split), self.kernel.link_weight);
        }
        if self.kernel.kernel_normal {
            cross = row_normalize(&cross);
        }
        cross
    }

    fn label_matrix(&self, offsets: &Offsets) -> DenseMatrix<f64> {
        let c = self.data.n_labels();
        let mut y = DenseMatrix::<f64>::zeros(offsets.total(), c);
        for seg in Segment::ALL {
            if matches!(seg, Segment::SourcePara | Segment::TargetPara) {
                continue;
            }
            let start = offsets.segment(seg).start;
            for (r, labels) in self.data.segment(seg).labels.iter().enumerate() {
                for &col in labels {
                    y.set((start + r, col), 1.0);
                }
            }
        }
        y
    }

    /// Held-out indices for the configured split mode, ascending.
    pub fn eval_indices(&self, offsets: &Offsets) -> KernelResult<Vec<usize>> {
        match self.mode {
            SplitMode::Test => {
                let idx: Vec<usize> = offsets.segment(Segment::TargetTest).collect();
                if idx.is_empty() {
                    return Err(KernelError::ShapeMismatch(
                        "target test segment is empty".into(),
                    ));
                }
                Ok(idx)
            }
            SplitMode::Validation => {
                let mut pool: Vec<usize> = offsets.segment(Segment::TargetTrain).collect();
                if pool.len() < 2 {
                    return Err(KernelError::ShapeMismatch(format!(
                        "need at least 2 target training instances to hold out, got {}",
                        pool.len()
                    )));
                }
                let take = ((pool.len() as f64 * self.valid_fraction).round() as usize)
                    .clamp(1, pool.len() - 1);
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
                pool.shuffle(&mut rng);
                pool.truncate(take);
                pool.sort_unstable();
                Ok(pool)
            }
        }
    }
}

impl KernelSource for DataClass {
    fn tl_kernel(&self) -> KernelResult<TlProblem> {
        let offsets = self.data.offsets();
        let n = offsets.total();
        offsets.check(n)?;
        let split = offsets.split();

        let mut k = DenseMatrix::<f64>::zeros(n, n);
        write_block(&mut k, 0, 0, &self.domain_block(true));
        write_block(&mut k, split, split, &self.domain_block(false));
        write_block_symmetric(&mut k, 0, split, &self.cross_block(&offsets));

        let labels = self.label_matrix(&offsets);
        let eval_indices = self.eval_indices(&offsets)?;
        if labels.shape().1 == 1 {
            let positives = eval_indices
                .iter()
                .filter(|&&i| *labels.get((i, 0)) > 0.0)
                .count();
            if positives == 0 || positives == eval_indices.len() {
                warn!("Evaluation set holds a single class; AUC will be undefined");
            }
        }

        info!(
            "TL kernel built: N={}, split={}, offsets={:?}, C={}, {:?} set of {}",
            n,
            split,
            offsets.ends(),
            labels.shape().1,
            self.mode,
            eval_indices.len()
        );
        Ok(TlProblem {
            labels,
            eval_indices,
            kernel: k,
            offsets,
        })
    }
}
