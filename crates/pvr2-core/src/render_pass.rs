//! Render pass descriptors and per-pass record ranges.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Cumulative record counts at the end of one render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderPass {
    pub op_count: u32,
    pub pt_count: u32,
    pub tr_count: u32,
    pub mvo_count: u32,
    #[serde(default)]
    pub mvo_tr_count: u32,
    /// Translucent records of this pass go through order-independent transparency.
    #[serde(default)]
    pub autosort: bool,
}

impl RenderPass {
    fn counts(&self) -> [(&'static str, u32); 5] {
        [
            ("op", self.op_count),
            ("pt", self.pt_count),
            ("tr", self.tr_count),
            ("mvo", self.mvo_count),
            ("mvo_tr", self.mvo_tr_count),
        ]
    }
}

/// The records drawn by one render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRanges {
    /// Position of the pass in the frame.
    pub index: usize,
    pub op: Range<u32>,
    pub pt: Range<u32>,
    pub tr: Range<u32>,
    pub mvo: Range<u32>,
    pub mvo_tr: Range<u32>,
    pub autosort: bool,
    /// No pass follows this one.
    pub is_last: bool,
}

/// Computes the records each pass adds on top of the previous one.
///
/// Fails if any cumulative count decreases from one pass to the next.
pub fn pass_ranges(passes: &[RenderPass]) -> Result<Vec<PassRanges>> {
    let mut previous = RenderPass::default();
    let mut ranges = Vec::with_capacity(passes.len());

    for (index, current) in passes.iter().enumerate() {
        for ((field, prev), (_, cur)) in previous.counts().into_iter().zip(current.counts()) {
            if cur < prev {
                return Err(FrameError::PassCountDecreased {
                    pass: index,
                    field,
                    previous: prev,
                    current: cur,
                });
            }
        }

        ranges.push(PassRanges {
            index,
            op: previous.op_count..current.op_count,
            pt: previous.pt_count..current.pt_count,
            tr: previous.tr_count..current.tr_count,
            mvo: previous.mvo_count..current.mvo_count,
            mvo_tr: previous.mvo_tr_count..current.mvo_tr_count,
            autosort: current.autosort,
            is_last: index + 1 == passes.len(),
        });
        previous = *current;
    }

    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pass(op: u32, pt: u32, tr: u32, mvo: u32) -> RenderPass {
        RenderPass {
            op_count: op,
            pt_count: pt,
            tr_count: tr,
            mvo_count: mvo,
            mvo_tr_count: 0,
            autosort: false,
        }
    }

    #[test]
    fn test_single_pass() {
        let ranges = pass_ranges(&[pass(3, 0, 0, 0)]).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].op, 0..3);
        assert!(ranges[0].pt.is_empty());
        assert!(ranges[0].is_last);
    }

    #[test]
    fn test_deltas() {
        let ranges = pass_ranges(&[pass(2, 1, 0, 4), pass(5, 1, 3, 6)]).unwrap();
        assert_eq!(ranges[0].op, 0..2);
        assert!(!ranges[0].is_last);
        assert_eq!(ranges[1].op, 2..5);
        assert_eq!(ranges[1].pt, 1..1);
        assert_eq!(ranges[1].tr, 0..3);
        assert_eq!(ranges[1].mvo, 4..6);
        assert!(ranges[1].is_last);
    }

    #[test]
    fn test_decreasing_count_rejected() {
        let err = pass_ranges(&[pass(2, 0, 4, 0), pass(3, 0, 1, 0)]).unwrap_err();
        match err {
            FrameError::PassCountDecreased {
                pass, field, previous, current,
            } => {
                assert_eq!(pass, 1);
                assert_eq!(field, "tr");
                assert_eq!((previous, current), (4, 1));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_empty() {
        assert!(pass_ranges(&[]).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_ranges_tile_the_counts(steps in prop::collection::vec((0u32..8, 0u32..8, 0u32..8, 0u32..8, any::<bool>()), 1..12)) {
            let mut passes = Vec::new();
            let mut acc = RenderPass::default();
            for (op, pt, tr, mvo, autosort) in steps {
                acc.op_count += op;
                acc.pt_count += pt;
                acc.tr_count += tr;
                acc.mvo_count += mvo;
                acc.autosort = autosort;
                passes.push(acc);
            }
            let ranges = pass_ranges(&passes).unwrap();
            prop_assert_eq!(ranges.len(), passes.len());
            let mut op_end = 0;
            for (range, pass) in ranges.iter().zip(&passes) {
                prop_assert!(range.op.start <= range.op.end);
                prop_assert!(range.tr.start <= range.tr.end);
                prop_assert_eq!(range.op.start, op_end, "ranges must be contiguous");
                prop_assert_eq!(range.op.end, pass.op_count);
                prop_assert_eq!(range.autosort, pass.autosort);
                op_end = range.op.end;
            }
            prop_assert_eq!(ranges.iter().filter(|r| r.is_last).count(), 1);
        }
    }
}
