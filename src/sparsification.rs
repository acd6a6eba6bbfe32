//! # Symmetric p-nearest-neighbour sparsification of a kernel
//!
//! 1. Per row, rank the off-diagonal entries by similarity (descending, ties by
//!    column ascending) and keep the top `p`
//! 2. Symmetrise by union: `(i, j)` survives if `j` is among the neighbours of `i`
//!    or `i` among the neighbours of `j`
//! 3. The diagonal is always kept
//!
//! With `p >= N - 1` nothing is dropped and the kernel is returned unchanged.

use log::{debug, info};
use rayon::prelude::*;
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::{CsMat, TriMat};

use crate::error::{KernelError, KernelResult};
use crate::linalg::check_square;

/// Keeps the `p` strongest neighbours per node, then symmetrises.
pub struct KnnSparsifier {
    p: usize,
}

impl KnnSparsifier {
    pub fn new(p: usize) -> Self {
        Self { p }
    }

    /// Top-`p` neighbour columns of every row (diagonal excluded).
    fn neighbour_rows(&self, k: &DenseMatrix<f64>) -> Vec<Vec<usize>> {
        let n = k.shape().0;
        (0..n)
            .into_par_iter()
            .map(|i| {
                let mut scored: Vec<(usize, f64)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (j, *k.get((i, j))))
                    .collect();

                if scored.len() > self.p {
                    // Sort by similarity descending, column ascending
                    scored.sort_unstable_by(|a, b| {
                        b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
                    });
                    scored.truncate(self.p);
                }
                let mut cols: Vec<usize> = scored.into_iter().map(|(j, _)| j).collect();
                cols.sort_unstable();
                cols
            })
            .collect()
    }

    /// Retained entries as a symmetric CSR matrix, diagonal included.
    pub fn sparsify_csr(&self, k: &DenseMatrix<f64>) -> KernelResult<CsMat<f64>> {
        let n = check_square(k)?;
        if self.p == 0 {
            return Err(KernelError::InvalidConfig(
                "sparsification needs p >= 1 neighbours".into(),
            ));
        }
        debug!("Sparsifying {}x{} kernel to p={} neighbours", n, n, self.p);

        let neighbours = self.neighbour_rows(k);
        let mut keep = vec![std::collections::BTreeSet::<usize>::new(); n];
        for (i, cols) in neighbours.iter().enumerate() {
            for &j in cols {
                keep[i].insert(j);
                keep[j].insert(i);
            }
        }

        let mut triplets = TriMat::new((n, n));
        for (i, cols) in keep.iter().enumerate() {
            triplets.add_triplet(i, i, *k.get((i, i)));
            for &j in cols {
                triplets.add_triplet(i, j, *k.get((i, j)));
            }
        }
        let csr: CsMat<f64> = triplets.to_csr();

        let dense_entries = n * n;
        info!(
            "Sparsified kernel: {} of {} entries kept ({:.1}% dropped)",
            csr.nnz(),
            dense_entries,
            100.0 * (1.0 - csr.nnz() as f64 / dense_entries as f64)
        );
        Ok(csr)
    }

    /// Dense kernel with every dropped entry set to zero.
    pub fn sparsify(&self, k: &DenseMatrix<f64>) -> KernelResult<DenseMatrix<f64>> {
        let n = check_square(k)?;
        if self.p >= n.saturating_sub(1) {
            debug!("p={} covers all {} neighbours, kernel unchanged", self.p, n.saturating_sub(1));
            return Ok(k.clone());
        }
        let csr = self.sparsify_csr(k)?;
        let mut out = DenseMatrix::<f64>::zeros(n, n);
        for (&v, (i, j)) in csr.iter() {
            out.set((i, j), v);
        }
        Ok(out)
    }
}

/// Symmetric `p`-nearest-neighbour sparsification of `k`.
pub fn sym_sparsify(k: &DenseMatrix<f64>, p: usize) -> KernelResult<DenseMatrix<f64>> {
    KnnSparsifier::new(p).sparsify(k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::max_abs_diff;

    fn kernel() -> DenseMatrix<f64> {
        DenseMatrix::from_2d_vec(&vec![
            vec![1.0, 0.9, 0.1, 0.2],
            vec![0.9, 1.0, 0.3, 0.05],
            vec![0.1, 0.3, 1.0, 0.8],
            vec![0.2, 0.05, 0.8, 1.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_full_neighbourhood_is_identity() {
        let k = kernel();
        let s = sym_sparsify(&k, 3).unwrap();
        assert_eq!(max_abs_diff(&s, &k).unwrap(), 0.0);

        // going through the CSR path gives the same thing
        let csr = KnnSparsifier::new(3).sparsify_csr(&k).unwrap();
        assert_eq!(csr.nnz(), 16);
    }

    #[test]
    fn test_one_neighbour_union() {
        let s = sym_sparsify(&kernel(), 1).unwrap();
        // nearest: 0->1, 1->0, 2->3, 3->2
        assert_eq!(*s.get((0, 1)), 0.9);
        assert_eq!(*s.get((2, 3)), 0.8);
        assert_eq!(*s.get((0, 2)), 0.0);
        assert_eq!(*s.get((1, 3)), 0.0);
        for i in 0..4 {
            assert_eq!(*s.get((i, i)), 1.0);
            for j in 0..4 {
                assert_eq!(s.get((i, j)), s.get((j, i)));
            }
        }
    }

    #[test]
    fn test_nan_similarity_does_not_panic() {
        let mut k = kernel();
        k.set((1, 3), f64::NAN);
        k.set((3, 1), f64::NAN);
        let s = sym_sparsify(&k, 1).unwrap();
        assert_eq!(*s.get((0, 1)), 0.9);
        assert_eq!(*s.get((2, 3)), 0.8);
        assert_eq!(*s.get((0, 2)), 0.0);
        for i in 0..4 {
            assert_eq!(*s.get((i, i)), 1.0);
        }
    }

    #[test]
    fn test_zero_neighbours_rejected() {
        assert!(matches!(
            KnnSparsifier::new(0).sparsify(&kernel()),
            Err(KernelError::InvalidConfig(_))
        ));
    }
}
