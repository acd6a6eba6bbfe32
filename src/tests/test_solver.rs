use approx::assert_abs_diff_eq;
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::config::SolverConfig;
use crate::error::KernelError;
use crate::grid::Evaluator;
use crate::offsets::Offsets;
use crate::solver::LabelPropagation;

use super::init;

/// Clusters {0, 2, 4} and {1, 3, 5}: strong links inside, weak across.
fn two_cluster_kernel() -> DenseMatrix<f64> {
    let mut k = DenseMatrix::<f64>::zeros(6, 6);
    for i in 0..6 {
        for j in 0..6 {
            if i != j {
                k.set((i, j), if i % 2 == j % 2 { 1.0 } else { 0.01 });
            }
        }
    }
    k
}

/// source train {0, 1}, target train {2, 3}, target test {4, 5}
fn offsets() -> Offsets {
    Offsets::from_sizes([2, 0, 0, 2, 2, 0])
}

#[test]
fn test_binary_propagation_separates_clusters() {
    init();
    let mut y = DenseMatrix::<f64>::zeros(6, 1);
    for i in [0, 2, 4] {
        y.set((i, 0), 1.0);
    }
    let solver = LabelPropagation::new(SolverConfig::default());
    let f = solver
        .propagate(&y, &[4, 5], &two_cluster_kernel(), &offsets(), 1.0)
        .unwrap();
    assert!(*f.get((4, 0)) > *f.get((5, 0)));

    let m = solver
        .solve_and_eval(&y, &[4, 5], &two_cluster_kernel(), &offsets(), 1.0)
        .unwrap();
    assert_eq!(m.auc, 1.0);
    assert_eq!(m.ap, 1.0);
    assert_eq!(m.rl, 0.0);
}

#[test]
fn test_multilabel_propagation() {
    let mut y = DenseMatrix::<f64>::zeros(6, 2);
    for i in 0..6 {
        y.set((i, i % 2), 1.0);
    }
    let solver = LabelPropagation::default();
    let m = solver
        .solve_and_eval(&y, &[4, 5], &two_cluster_kernel(), &offsets(), 0.5)
        .unwrap();
    assert_eq!(m.auc, 1.0);
    assert_abs_diff_eq!(m.ap, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(m.rl, 0.0, epsilon = 1e-12);
}

#[test]
fn test_held_out_targets_do_not_leak() {
    // hiding target train 2 as well: its true label must not influence the fit
    let mut y = DenseMatrix::<f64>::zeros(6, 1);
    for i in [0, 2, 4] {
        y.set((i, 0), 1.0);
    }
    let mut y_flipped = y.clone();
    y_flipped.set((2, 0), 0.0);

    let solver = LabelPropagation::default();
    let k = two_cluster_kernel();
    let a = solver.propagate(&y, &[2, 4, 5], &k, &offsets(), 1.0).unwrap();
    let b = solver.propagate(&y_flipped, &[2, 4, 5], &k, &offsets(), 1.0).unwrap();
    for i in 0..6 {
        assert_abs_diff_eq!(*a.get((i, 0)), *b.get((i, 0)), epsilon = 1e-12);
    }
    assert_eq!(a.shape(), (6, 1));
}

#[test]
fn test_labelled_rows_track_labels_for_small_weight() {
    let mut y = DenseMatrix::<f64>::zeros(6, 1);
    y.set((0, 0), 1.0);
    y.set((2, 0), 1.0);
    let solver = LabelPropagation::new(SolverConfig { ridge: 0.0 });
    let f = solver
        .propagate(&y, &[4, 5], &two_cluster_kernel(), &offsets(), 2f64.powi(-20))
        .unwrap();
    for (i, expected) in [(0, 1.0), (1, 0.0), (2, 1.0), (3, 0.0)] {
        assert_abs_diff_eq!(*f.get((i, 0)), expected, epsilon = 1e-4);
    }
}

#[test]
fn test_shape_errors() {
    let solver = LabelPropagation::default();
    let y = DenseMatrix::<f64>::zeros(5, 1);
    assert!(matches!(
        solver.solve_and_eval(&y, &[4], &two_cluster_kernel(), &offsets(), 1.0),
        Err(KernelError::ShapeMismatch(_))
    ));

    // nothing left to learn from
    let y = DenseMatrix::<f64>::zeros(6, 1);
    assert!(matches!(
        solver.propagate(&y, &[0, 1, 2, 3], &two_cluster_kernel(), &offsets(), 1.0),
        Err(KernelError::ShapeMismatch(_))
    ));
}
