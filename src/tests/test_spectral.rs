use approx::assert_abs_diff_eq;
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::config::{EigenSolver, SpectralParams};
use crate::error::KernelError;
use crate::linalg::{column, matvec, norm};
use crate::offsets::Offsets;
use crate::spectral::{decompose, eigsh};

use super::test_data::{random_symmetric, rbf_gram, clustered_features, transpose_product};
use super::{dense_params, init};

#[test]
fn test_eigenvectors_orthonormal_and_values_ascending() {
    init();
    let (rows, _) = clustered_features(16, 5, 3);
    let k = rbf_gram(&rows);
    let pairs = eigsh(&k, 5, EigenSolver::Dense, 0).unwrap();

    let qtq = transpose_product(&pairs.vectors);
    for i in 0..5 {
        for j in 0..5 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(*qtq.get((i, j)), expected, epsilon = 1e-6);
        }
    }
    assert!(pairs.values.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_dense_and_lanczos_agree() {
    init();
    let a = random_symmetric(30, 11);
    let dense = eigsh(&a, 4, EigenSolver::Dense, 0).unwrap();
    let lanczos = eigsh(
        &a,
        4,
        EigenSolver::Lanczos { tol: 1e-10, max_expansions: 8 },
        5,
    )
    .unwrap();

    for (d, l) in dense.values.iter().zip(&lanczos.values) {
        assert_abs_diff_eq!(*d, *l, epsilon = 1e-8);
    }
    // Ritz vectors are genuine eigenvectors
    for c in 0..4 {
        let q = column(&lanczos.vectors, c);
        let aq = matvec(&a, &q);
        let residual: Vec<f64> = aq
            .iter()
            .zip(&q)
            .map(|(x, v)| x - lanczos.values[c] * v)
            .collect();
        assert!(norm(&residual) < 1e-6, "residual {} for pair {}", norm(&residual), c);
        assert_abs_diff_eq!(norm(&q), 1.0, epsilon = 1e-8);
    }
}

#[test]
fn test_lanczos_is_seed_deterministic() {
    let a = random_symmetric(24, 2);
    let solver = EigenSolver::Lanczos { tol: 1e-10, max_expansions: 8 };
    let first = eigsh(&a, 3, solver, 42).unwrap();
    let second = eigsh(&a, 3, solver, 42).unwrap();
    assert_eq!(first.values, second.values);
    for c in 0..3 {
        assert_eq!(column(&first.vectors, c), column(&second.vectors, c));
    }
}

#[test]
fn test_decompose_splits_blocks() {
    init();
    let (rows, _) = clustered_features(10, 3, 9);
    let k = rbf_gram(&rows);
    let offsets = Offsets::split_only(6, 10).unwrap();
    let dec = decompose(&k, &offsets, &dense_params(2)).unwrap();
    assert_eq!(dec.source.dim(), 6);
    assert_eq!(dec.target.dim(), 4);
    assert_eq!(dec.source.k(), 2);
    assert_eq!(dec.target.k(), 2);
}

#[test]
fn test_decompose_rejects_rank_at_block_size() {
    let (rows, _) = clustered_features(8, 3, 1);
    let k = rbf_gram(&rows);
    let offsets = Offsets::split_only(5, 8).unwrap();
    // target block is 3x3
    let err = decompose(&k, &offsets, &dense_params(3)).unwrap_err();
    assert!(matches!(err, KernelError::DecompositionFailure(_)));
}

#[test]
fn test_decompose_rejects_asymmetric_kernel() {
    let mut k = random_symmetric(6, 4);
    k.set((0, 5), *k.get((5, 0)) + 1e-3);
    let offsets = Offsets::split_only(3, 6).unwrap();
    let err = decompose(&k, &offsets, &dense_params(1)).unwrap_err();
    assert!(matches!(err, KernelError::Asymmetric { row: 0, col: 5, .. }));
}

#[test]
fn test_decompose_rejects_bad_offsets() {
    let k = random_symmetric(6, 4);
    let params = SpectralParams::default().with_max_k(1);
    let offsets = Offsets::split_only(3, 7).unwrap();
    assert!(matches!(
        decompose(&k, &offsets, &params),
        Err(KernelError::ShapeMismatch(_))
    ));

    let rect = DenseMatrix::<f64>::zeros(3, 4);
    assert!(decompose(&rect, &Offsets::split_only(1, 3).unwrap(), &params).is_err());
    assert_eq!(rect.shape(), (3, 4));
}

#[test]
fn test_decompose_rejects_non_finite_entries() {
    let offsets = Offsets::split_only(20, 40).unwrap();

    let mut k = random_symmetric(40, 8);
    k.set((3, 3), f64::NAN);
    let err = decompose(&k, &offsets, &dense_params(4)).unwrap_err();
    assert!(matches!(err, KernelError::NonFinite { row: 3, col: 3 }));

    // symmetric infinities in the target block
    let mut k = random_symmetric(40, 8);
    k.set((25, 30), f64::INFINITY);
    k.set((30, 25), f64::INFINITY);
    let err = decompose(&k, &offsets, &dense_params(4)).unwrap_err();
    assert!(matches!(err, KernelError::NonFinite { row: 25, col: 30 }));
}
