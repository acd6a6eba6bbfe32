//! Segment boundaries of the combined source/target instance ordering.
//!
//! Instances are laid out as
//! `[source train | source test | source para | target train | target test | target para]`
//! and `Offsets` stores the cumulative end of each segment. `ends[2]` (the end of
//! the source domain) is the split used to carve K into blocks.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

pub const N_SEGMENTS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    SourceTrain = 0,
    SourceTest = 1,
    SourcePara = 2,
    TargetTrain = 3,
    TargetTest = 4,
    TargetPara = 5,
}

impl Segment {
    pub const ALL: [Segment; N_SEGMENTS] = [
        Segment::SourceTrain,
        Segment::SourceTest,
        Segment::SourcePara,
        Segment::TargetTrain,
        Segment::TargetTest,
        Segment::TargetPara,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Segment::SourceTrain => "source_train.svm",
            Segment::SourceTest => "source_test.svm",
            Segment::SourcePara => "source_para.svm",
            Segment::TargetTrain => "target_train.svm",
            Segment::TargetTest => "target_test.svm",
            Segment::TargetPara => "target_para.svm",
        }
    }

    pub fn is_source(&self) -> bool {
        (*self as usize) < 3
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offsets {
    ends: [usize; N_SEGMENTS],
}

impl Offsets {
    /// Build from segment sizes (not cumulative).
    pub fn from_sizes(sizes: [usize; N_SEGMENTS]) -> Self {
        let mut ends = [0usize; N_SEGMENTS];
        let mut acc = 0;
        for (end, size) in ends.iter_mut().zip(sizes) {
            acc += size;
            *end = acc;
        }
        Self { ends }
    }

    /// Build from cumulative ends; they must be non-decreasing.
    pub(crate) fn from_ends(ends: [usize; N_SEGMENTS]) -> KernelResult<Self> {
        if ends.windows(2).any(|w| w[0] > w[1]) {
            return Err(KernelError::ShapeMismatch(format!(
                "offsets must be non-decreasing, got {:?}",
                ends
            )));
        }
        Ok(Self { ends })
    }

    /// Offsets with only a source/target boundary: every source instance is
    /// training data, every target instance is test data.
    pub fn split_only(split: usize, n: usize) -> KernelResult<Self> {
        Self::from_ends([split, split, split, split, n, n])
    }

    pub fn ends(&self) -> &[usize; N_SEGMENTS] {
        &self.ends
    }

    /// Source/target boundary (`offset[2]`).
    pub fn split(&self) -> usize {
        self.ends[Segment::SourcePara as usize]
    }

    pub fn total(&self) -> usize {
        self.ends[N_SEGMENTS - 1]
    }

    pub fn segment(&self, seg: Segment) -> Range<usize> {
        let i = seg as usize;
        let start = if i == 0 { 0 } else { self.ends[i - 1] };
        start..self.ends[i]
    }

    pub fn source(&self) -> Range<usize> {
        0..self.split()
    }

    pub fn target(&self) -> Range<usize> {
        self.split()..self.total()
    }

    /// Check the offsets against a kernel of dimension `n`: both blocks non-empty.
    pub fn check(&self, n: usize) -> KernelResult<()> {
        if self.total() != n {
            return Err(KernelError::ShapeMismatch(format!(
                "offsets cover {} instances but kernel has {}",
                self.total(),
                n
            )));
        }
        let split = self.split();
        if split == 0 || split >= n {
            return Err(KernelError::ShapeMismatch(format!(
                "split {} must lie strictly inside (0, {})",
                split, n
            )));
        }
        Ok(())
    }
}

impl std::ops::Index<usize> for Offsets {
    type Output = usize;

    fn index(&self, i: usize) -> &usize {
        &self.ends[i]
    }
}
