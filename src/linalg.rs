//! Dense block helpers over `DenseMatrix<f64>`.
//!
//! - Block extraction and write-back for the source/target partition of K
//! - Symmetry and shape checks
//! - L2 row normalisation, row/column scaling, parallel mat-vec

use std::ops::Range;

use log::trace;
use rayon::prelude::*;
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{KernelError, KernelResult};

/// Copy `m[rows, cols]` into a new matrix.
pub fn block(m: &DenseMatrix<f64>, rows: Range<usize>, cols: Range<usize>) -> DenseMatrix<f64> {
    let (nr, nc) = (rows.len(), cols.len());
    trace!("Extracting block rows={:?} cols={:?}", rows, cols);
    let mut flat = Vec::with_capacity(nr * nc);
    for i in rows {
        for j in cols.clone() {
            flat.push(*m.get((i, j)));
        }
    }
    DenseMatrix::from_iterator(flat.into_iter(), nr, nc, 0)
}

/// Write `b` into `m` with its top-left corner at `(row0, col0)`.
pub fn write_block(m: &mut DenseMatrix<f64>, row0: usize, col0: usize, b: &DenseMatrix<f64>) {
    let (nr, nc) = b.shape();
    for i in 0..nr {
        for j in 0..nc {
            m.set((row0 + i, col0 + j), *b.get((i, j)));
        }
    }
}

/// Write `b` at `(row0, col0)` and `bᵀ` at `(col0, row0)`, keeping `m` symmetric.
pub fn write_block_symmetric(
    m: &mut DenseMatrix<f64>,
    row0: usize,
    col0: usize,
    b: &DenseMatrix<f64>,
) {
    let (nr, nc) = b.shape();
    for i in 0..nr {
        for j in 0..nc {
            let v = *b.get((i, j));
            m.set((row0 + i, col0 + j), v);
            m.set((col0 + j, row0 + i), v);
        }
    }
}

pub fn check_square(m: &DenseMatrix<f64>) -> KernelResult<usize> {
    let (r, c) = m.shape();
    if r != c {
        return Err(KernelError::ShapeMismatch(format!(
            "kernel must be square, got {}x{}",
            r, c
        )));
    }
    Ok(r)
}

/// Fails on the first NaN or infinite entry, in row-major order.
pub fn check_finite(m: &DenseMatrix<f64>) -> KernelResult<()> {
    let (nr, nc) = m.shape();
    for i in 0..nr {
        for j in 0..nc {
            if !m.get((i, j)).is_finite() {
                return Err(KernelError::NonFinite { row: i, col: j });
            }
        }
    }
    Ok(())
}

/// Fails on the first pair with `|m_ij - m_ji| > tol`.
pub fn check_symmetric(m: &DenseMatrix<f64>, tol: f64) -> KernelResult<()> {
    let n = check_square(m)?;
    for i in 0..n {
        for j in (i + 1)..n {
            let delta = (*m.get((i, j)) - *m.get((j, i))).abs();
            if !(delta <= tol) {
                return Err(KernelError::Asymmetric { row: i, col: j, delta });
            }
        }
    }
    Ok(())
}

/// Scale every row to unit L2 norm; all-zero rows are left as they are.
pub fn row_normalize(m: &DenseMatrix<f64>) -> DenseMatrix<f64> {
    let (nr, nc) = m.shape();
    let rows: Vec<Vec<f64>> = (0..nr)
        .into_par_iter()
        .map(|i| {
            let row: Vec<f64> = (0..nc).map(|j| *m.get((i, j))).collect();
            let l2 = norm(&row);
            if l2 > 0.0 {
                row.into_iter().map(|v| v / l2).collect()
            } else {
                row
            }
        })
        .collect();
    DenseMatrix::from_iterator(rows.into_iter().flatten(), nr, nc, 0)
}

/// `diag(s) · m`
pub fn scale_rows(m: &DenseMatrix<f64>, s: &[f64]) -> DenseMatrix<f64> {
    let (nr, nc) = m.shape();
    debug_assert_eq!(nr, s.len());
    let mut out = m.clone();
    for i in 0..nr {
        for j in 0..nc {
            out.set((i, j), *m.get((i, j)) * s[i]);
        }
    }
    out
}

/// `m · diag(s)`
pub fn scale_columns(m: &DenseMatrix<f64>, s: &[f64]) -> DenseMatrix<f64> {
    let (nr, nc) = m.shape();
    debug_assert_eq!(nc, s.len());
    let mut out = m.clone();
    for i in 0..nr {
        for j in 0..nc {
            out.set((i, j), *m.get((i, j)) * s[j]);
        }
    }
    out
}

/// `m · x`, rows in parallel.
pub fn matvec(m: &DenseMatrix<f64>, x: &[f64]) -> Vec<f64> {
    let (nr, nc) = m.shape();
    debug_assert_eq!(nc, x.len());
    (0..nr)
        .into_par_iter()
        .map(|i| (0..nc).map(|j| *m.get((i, j)) * x[j]).sum())
        .collect()
}

/// Column `j` of `m` as an owned vector.
pub fn column(m: &DenseMatrix<f64>, j: usize) -> Vec<f64> {
    let nr = m.shape().0;
    (0..nr).map(|i| *m.get((i, j))).collect()
}

/// Euclidean norm without allocating.
#[inline]
pub fn norm(a: &[f64]) -> f64 {
    a.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Largest absolute entry-wise difference; shapes must match.
pub fn max_abs_diff(a: &DenseMatrix<f64>, b: &DenseMatrix<f64>) -> KernelResult<f64> {
    if a.shape() != b.shape() {
        return Err(KernelError::ShapeMismatch(format!(
            "cannot compare {:?} with {:?}",
            a.shape(),
            b.shape()
        )));
    }
    let (nr, nc) = a.shape();
    let mut worst = 0.0f64;
    for i in 0..nr {
        for j in 0..nc {
            worst = worst.max((*a.get((i, j)) - *b.get((i, j))).abs());
        }
    }
    Ok(worst)
}
