//! Ranking and classification metrics for held-out predictions.
//!
//! - `roc_auc`: Mann–Whitney statistic with averaged tie ranks
//! - `average_precision`: step-wise precision/recall sum over distinct thresholds
//! - `label_ranking_average_precision` / `label_ranking_loss`: per-instance
//!   ranking of labels, averaged over instances (ties count against the ranking)
//!
//! `Metrics::evaluate` picks the binary or multi-label variant from the label
//! count C.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

/// AUC, average precision and ranking loss of one run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub auc: f64,
    pub ap: f64,
    pub rl: f64,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auc {:8.6} ap {:.6} rl {:.6}", self.auc, self.ap, self.rl)
    }
}

/// Indices of `scores` sorted by score descending (stable on index).
fn order_desc(scores: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then_with(|| a.cmp(&b)));
    idx
}

/// Area under the ROC curve; `None` unless both classes are present.
pub fn roc_auc(scores: &[f64], truth: &[bool]) -> Option<f64> {
    let n_pos = truth.iter().filter(|&&t| t).count();
    let n_neg = truth.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    // 1-based ascending ranks, ties get the average rank of their group
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < idx.len() {
        let mut end = start + 1;
        while end < idx.len() && scores[idx[end]] == scores[idx[start]] {
            end += 1;
        }
        let avg = (start + 1 + end) as f64 / 2.0;
        for &i in &idx[start..end] {
            ranks[i] = avg;
        }
        start = end;
    }

    let rank_sum: f64 = ranks
        .iter()
        .zip(truth)
        .filter(|(_, t)| **t)
        .map(|(r, _)| *r)
        .sum();
    let p = n_pos as f64;
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * n_neg as f64))
}

/// Average precision; `None` when there are no positives.
pub fn average_precision(scores: &[f64], truth: &[bool]) -> Option<f64> {
    let n_pos = truth.iter().filter(|&&t| t).count();
    if n_pos == 0 {
        return None;
    }

    let idx = order_desc(scores);
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut start = 0;
    while start < idx.len() {
        let mut end = start;
        while end < idx.len() && scores[idx[end]] == scores[idx[start]] {
            if truth[idx[end]] {
                tp += 1;
            } else {
                fp += 1;
            }
            end += 1;
        }
        let recall = tp as f64 / n_pos as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
        start = end;
    }
    Some(ap)
}

/// Mean over instances of the precision at each relevant label's rank.
///
/// Instances with no relevant label, or with every label relevant, score 1.
pub fn label_ranking_average_precision(scores: &[Vec<f64>], truth: &[Vec<bool>]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: f64 = scores
        .iter()
        .zip(truth)
        .map(|(s, t)| {
            let n_rel = t.iter().filter(|&&x| x).count();
            if n_rel == 0 || n_rel == t.len() {
                return 1.0;
            }
            let mut acc = 0.0;
            for j in (0..s.len()).filter(|&j| t[j]) {
                let rank = s.iter().filter(|&&v| v >= s[j]).count() as f64;
                let rel_above = (0..s.len()).filter(|&k| t[k] && s[k] >= s[j]).count() as f64;
                acc += rel_above / rank;
            }
            acc / n_rel as f64
        })
        .sum();
    total / scores.len() as f64
}

/// Mean over instances of the share of (relevant, irrelevant) label pairs where
/// the irrelevant label scores at least as high as the relevant one.
pub fn label_ranking_loss(scores: &[Vec<f64>], truth: &[Vec<bool>]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: f64 = scores
        .iter()
        .zip(truth)
        .map(|(s, t)| {
            let n_pos = t.iter().filter(|&&x| x).count();
            let n_neg = t.len() - n_pos;
            if n_pos == 0 || n_neg == 0 {
                return 0.0;
            }
            let mut bad = 0usize;
            for p in (0..s.len()).filter(|&p| t[p]) {
                bad += (0..s.len()).filter(|&q| !t[q] && s[q] >= s[p]).count();
            }
            bad as f64 / (n_pos * n_neg) as f64
        })
        .sum();
    total / scores.len() as f64
}

impl Metrics {
    /// Score predictions `scores[i][c]` against 0/1 labels `truth[i][c]`.
    ///
    /// - C == 1: ROC AUC, average precision, zero ranking loss
    /// - C > 1: macro ROC AUC over labels with both classes present, LRAP, ranking loss
    ///
    /// Undefined AUC/AP (a single class present) are reported as NaN.
    pub fn evaluate(scores: &[Vec<f64>], truth: &[Vec<f64>]) -> KernelResult<Self> {
        if scores.is_empty() || scores.len() != truth.len() {
            return Err(KernelError::ShapeMismatch(format!(
                "cannot evaluate {} predictions against {} labels",
                scores.len(),
                truth.len()
            )));
        }
        let c = truth[0].len();
        if c == 0
            || scores.iter().any(|r| r.len() != c)
            || truth.iter().any(|r| r.len() != c)
        {
            return Err(KernelError::ShapeMismatch(
                "predictions and labels need the same non-zero label count".into(),
            ));
        }
        let truth_b: Vec<Vec<bool>> = truth
            .iter()
            .map(|r| r.iter().map(|&v| v > 0.0).collect())
            .collect();

        let column = |j: usize| -> (Vec<f64>, Vec<bool>) {
            (
                scores.iter().map(|r| r[j]).collect(),
                truth_b.iter().map(|r| r[j]).collect(),
            )
        };

        let metrics = if c == 1 {
            let (s, t) = column(0);
            Metrics {
                auc: roc_auc(&s, &t).unwrap_or(f64::NAN),
                ap: average_precision(&s, &t).unwrap_or(f64::NAN),
                rl: 0.0,
            }
        } else {
            let aucs: Vec<f64> = (0..c)
                .filter_map(|j| {
                    let (s, t) = column(j);
                    roc_auc(&s, &t)
                })
                .collect();
            debug!("Macro AUC over {} of {} labels", aucs.len(), c);
            Metrics {
                auc: if aucs.is_empty() {
                    f64::NAN
                } else {
                    aucs.iter().sum::<f64>() / aucs.len() as f64
                },
                ap: label_ranking_average_precision(scores, &truth_b),
                rl: label_ranking_loss(scores, &truth_b),
            }
        };

        if metrics.auc.is_nan() {
            warn!("AUC undefined: evaluation set holds a single class");
        }
        Ok(metrics)
    }
}
