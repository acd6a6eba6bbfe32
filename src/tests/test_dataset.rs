use std::fs;
use std::io::Cursor;

use approx::assert_abs_diff_eq;
use smartcore::linalg::basic::arrays::Array;

use crate::config::{DatasetConfig, KernelConfig, KernelType, SplitMode};
use crate::dataset::{parse_svmlight, DataClass, SvmData, TransferData};
use crate::error::KernelError;
use crate::grid::KernelSource;
use crate::linalg::{check_symmetric, norm};
use crate::offsets::Segment;

use super::init;

const FILES: [(&str, &str); 6] = [
    ("source_train.svm", "1 1:1\n-1 2:1\n"),
    ("source_test.svm", "1 1:1 2:1\n"),
    ("source_para.svm", "1:1\n"),
    ("target_train.svm", "1 1:2\n-1 2:2\n1 1:1 2:0.1\n-1 2:1 3:0.1\n"),
    ("target_test.svm", "1 1:1\n-1 2:1\n"),
    ("target_para.svm", "1:3\n"),
];

fn parse(text: &str) -> SvmData {
    parse_svmlight(Cursor::new(text), false).unwrap()
}

fn transfer_data() -> TransferData {
    let segments = FILES.map(|(_, text)| parse(text));
    TransferData::from_segments(segments).unwrap()
}

fn data_class(kernel: KernelConfig, mode: SplitMode) -> DataClass {
    DataClass::new(transfer_data(), kernel, mode)
}

#[test]
fn test_parse_binary_labels_and_comments() {
    let data = parse("-1 1:0.5\n+1 3:2\n# only a comment\n\n0 2:1 # trailing\n");
    assert_eq!(data.len(), 3);
    assert_eq!(data.labels, vec![vec![], vec![0], vec![]]);
    assert_eq!(data.rows[1], vec![(2, 2.0)]);
    assert_eq!(data.dim, 3);
    assert_eq!(data.n_labels, 1);
}

#[test]
fn test_parse_multilabel_and_empty_labels() {
    let data = parse_svmlight(Cursor::new("0,2 2:1 1:3\n3:1\n1 2:0.5\n"), true).unwrap();
    assert_eq!(data.labels, vec![vec![0, 2], vec![], vec![1]]);
    // indices are sorted on the way in
    assert_eq!(data.rows[0], vec![(0, 3.0), (1, 1.0)]);
    assert_eq!(data.n_labels, 3);
    assert_eq!(data.dim, 3);
}

#[test]
fn test_parse_errors_carry_line_numbers() {
    let cases = [
        ("1 1:1\n1 0:1\n", 2),
        ("1 a:1\n", 1),
        ("1 1:x\n", 1),
        ("1 1:1 1:2\n", 1),
        ("1 1:1\n\nyes 1:1\n", 3),
        ("1 1:1 2\n", 1),
    ];
    for (text, expected_line) in cases {
        match parse_svmlight(Cursor::new(text), false) {
            Err(KernelError::Parse { line, .. }) => assert_eq!(line, expected_line, "{:?}", text),
            other => panic!("expected parse error for {:?}, got {:?}", text, other),
        }
    }
    assert!(parse_svmlight(Cursor::new("a,1 1:1\n"), true).is_err());
}

#[test]
fn test_cosine_kernel_layout() {
    init();
    let problem = data_class(KernelConfig::default(), SplitMode::Test)
        .tl_kernel()
        .unwrap();
    let k = &problem.kernel;
    assert_eq!(problem.offsets.ends(), &[2, 3, 4, 8, 10, 11]);
    assert_eq!(k.shape(), (11, 11));
    check_symmetric(k, 0.0).unwrap();

    // source rows (1,0) (0,1) (1,1) (1,0)
    assert_abs_diff_eq!(*k.get((0, 2)), 1.0 / 2f64.sqrt(), epsilon = 1e-12);
    assert_abs_diff_eq!(*k.get((0, 3)), 1.0, epsilon = 1e-12);
    assert_eq!(*k.get((0, 1)), 0.0);
    // zero diagonal
    for i in 0..11 {
        assert_eq!(*k.get((i, i)), 0.0);
    }
    // target rows (1,0) (0,1) (1,0.1) ...
    assert_abs_diff_eq!(*k.get((4, 6)), 1.0 / 1.01f64.sqrt(), epsilon = 1e-12);

    // cross block: only the paraphrase pair is linked
    for i in 0..4 {
        for j in 4..11 {
            let expected = if (i, j) == (3, 10) { 1.0 } else { 0.0 };
            assert_eq!(*k.get((i, j)), expected, "({}, {})", i, j);
        }
    }
}

#[test]
fn test_rbf_kernel_with_default_and_explicit_gamma() {
    let cfg = KernelConfig {
        kernel_type: KernelType::Rbf,
        zero_diag: false,
        rbf_gamma: Some(0.5),
        ..Default::default()
    };
    let k = data_class(cfg, SplitMode::Test).tl_kernel().unwrap().kernel;
    assert_eq!(*k.get((0, 0)), 1.0);
    assert_abs_diff_eq!(*k.get((0, 2)), (-0.5f64).exp(), epsilon = 1e-12);

    let cfg = KernelConfig {
        kernel_type: KernelType::Rbf,
        ..Default::default()
    };
    let k = data_class(cfg, SplitMode::Test).tl_kernel().unwrap().kernel;
    // source features span 2 dimensions: gamma = 1/√2, ‖(1,0) - (0,1)‖² = 2
    assert_abs_diff_eq!(*k.get((0, 1)), (-2.0 / 2f64.sqrt()).exp(), epsilon = 1e-12);
    assert_eq!(*k.get((0, 0)), 0.0);
}

#[test]
fn test_kernel_normal_rescales_blocks() {
    let cfg = KernelConfig {
        kernel_normal: true,
        link_weight: 2.0,
        ..Default::default()
    };
    let k = data_class(cfg, SplitMode::Test).tl_kernel().unwrap().kernel;
    check_symmetric(&k, 1e-12).unwrap();
    assert_abs_diff_eq!(*k.get((3, 10)), 1.0, epsilon = 1e-12);

    // D^{-1/2} W D^{-1/2} on the source block
    let raw = data_class(KernelConfig::default(), SplitMode::Test)
        .tl_kernel()
        .unwrap()
        .kernel;
    let degree = |i: usize| (0..4).map(|j| *raw.get((i, j))).sum::<f64>();
    let expected = *raw.get((0, 2)) / (degree(0) * degree(2)).sqrt();
    assert_abs_diff_eq!(*k.get((0, 2)), expected, epsilon = 1e-12);
}

#[test]
fn test_labels_and_eval_sets() {
    let test = data_class(KernelConfig::default(), SplitMode::Test)
        .tl_kernel()
        .unwrap();
    assert_eq!(test.eval_indices, vec![8, 9]);
    assert_eq!(test.labels.shape(), (11, 1));
    let column: Vec<f64> = (0..11).map(|i| *test.labels.get((i, 0))).collect();
    assert_eq!(
        column,
        vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0]
    );

    let dataset = DatasetConfig { valid_fraction: 0.5, seed: 9, ..Default::default() };
    let valid = data_class(KernelConfig::default(), SplitMode::Validation).with_dataset(&dataset);
    let first = valid.tl_kernel().unwrap().eval_indices;
    assert_eq!(first.len(), 2);
    assert!(first.windows(2).all(|w| w[0] < w[1]));
    assert!(first.iter().all(|i| (4..8).contains(i)));
    assert_eq!(valid.tl_kernel().unwrap().eval_indices, first);

    // default fraction still holds out one instance
    let one = data_class(KernelConfig::default(), SplitMode::Validation)
        .tl_kernel()
        .unwrap()
        .eval_indices;
    assert_eq!(one.len(), 1);
}

#[test]
fn test_paraphrase_counts_must_match() {
    let mut segments = FILES.map(|(_, text)| parse(text));
    segments[Segment::TargetPara as usize] = SvmData::default();
    assert!(matches!(
        TransferData::from_segments(segments),
        Err(KernelError::ShapeMismatch(_))
    ));
}

#[test]
fn test_load_dir_roundtrip() {
    init();
    let dir = tempfile::tempdir().unwrap();
    for (name, text) in FILES {
        fs::write(dir.path().join(name), text).unwrap();
    }

    let loaded = TransferData::load_dir(dir.path(), false).unwrap();
    assert_eq!(loaded, transfer_data());
    assert_eq!(loaded.segment(Segment::TargetTrain).len(), 4);

    let dataset = DatasetConfig {
        dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let source = DataClass::from_config(&dataset, KernelConfig::default(), SplitMode::Test).unwrap();
    let problem = source.tl_kernel().unwrap();
    assert_eq!(problem.offsets.total(), 11);
    let row: Vec<f64> = (4..11).map(|j| *problem.kernel.get((3, j))).collect();
    assert_abs_diff_eq!(norm(&row), 1.0, epsilon = 1e-12);

    fs::remove_file(dir.path().join("target_para.svm")).unwrap();
    assert!(matches!(
        TransferData::load_dir(dir.path(), false),
        Err(KernelError::Io(_))
    ));
}
