//! Draws a contiguous run of polygon records of one list.

use std::ops::Range;

use pvr2_core::{ListType, Pass, PolyParam};

use crate::context::DrawContext;
use crate::error::RenderResult;
use crate::state_setter::set_gp_state;

/// The list/sorting/pass combinations the pipeline draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    OpaqueDepth,
    PunchThroughDepth,
    OpaqueColor,
    PunchThroughColor,
    /// Translucent records blended directly, in submission order.
    TranslucentColor,
    /// Autosorted translucent records into the accumulation buffers.
    TranslucentOit,
    /// Depth of autosorted translucent records, for the next render pass.
    TranslucentSortedDepth,
}

impl DrawMode {
    #[must_use]
    pub const fn list(self) -> ListType {
        match self {
            Self::OpaqueDepth | Self::OpaqueColor => ListType::Opaque,
            Self::PunchThroughDepth | Self::PunchThroughColor => ListType::PunchThrough,
            Self::TranslucentColor | Self::TranslucentOit | Self::TranslucentSortedDepth => {
                ListType::Translucent
            }
        }
    }

    #[must_use]
    pub const fn sorting(self) -> bool {
        matches!(self, Self::TranslucentOit | Self::TranslucentSortedDepth)
    }

    #[must_use]
    pub const fn pass(self) -> Pass {
        match self {
            Self::OpaqueDepth | Self::PunchThroughDepth | Self::TranslucentSortedDepth => {
                Pass::Depth
            }
            Self::OpaqueColor | Self::PunchThroughColor | Self::TranslucentColor => Pass::Color,
            Self::TranslucentOit => Pass::Oit,
        }
    }

    /// Whether the record's depth mode selects the depth function.
    #[must_use]
    pub const fn uses_record_depth_func(self) -> bool {
        matches!(self.list(), ListType::Opaque)
            || (matches!(self.list(), ListType::Translucent) && !self.sorting())
    }

    /// Whether the depth function is forced to greater-or-equal.
    #[must_use]
    pub const fn forces_greater_equal(self) -> bool {
        matches!(self.list(), ListType::PunchThrough)
            || (matches!(self.pass(), Pass::Depth) && self.sorting())
    }

    /// Whether `param` produces no visible result in this mode.
    #[must_use]
    pub fn skips(self, param: &PolyParam) -> bool {
        if !param.has_triangles() {
            return true;
        }
        // depth mode 0 never passes
        if self.uses_record_depth_func() && param.isp.depth_mode() == 0 {
            return true;
        }
        // src * 0 + dst * 1 leaves the target unchanged
        matches!(self, Self::TranslucentOit)
            && param.tsp.src_instr() == 0
            && param.tsp.dst_instr() == 1
    }
}

/// Draws the records in `range` of the list `mode` refers to. Returns the
/// number of draw calls issued.
pub fn draw_list(ctx: &mut DrawContext<'_>, mode: DrawMode, range: Range<u32>) -> RenderResult<u32> {
    let frame = ctx.frame;
    let records = frame.list(mode.list());
    let mut draws = 0;

    for index in range {
        let param = &records[index as usize];
        if mode.skips(param) {
            continue;
        }
        ctx.uniforms.poly_number = index;
        set_gp_state(ctx, param, mode)?;
        ctx.device.draw_strip(param.first, param.count);
        ctx.stats.count_draw(mode.pass());
        draws += 1;
    }

    Ok(draws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use pvr2_core::{Isp, Tsp};

    const MODES: [DrawMode; 7] = [
        DrawMode::OpaqueDepth,
        DrawMode::PunchThroughDepth,
        DrawMode::OpaqueColor,
        DrawMode::PunchThroughColor,
        DrawMode::TranslucentColor,
        DrawMode::TranslucentOit,
        DrawMode::TranslucentSortedDepth,
    ];

    fn param(count: u32, depth_mode: u32) -> PolyParam {
        PolyParam {
            isp: Isp(0).with_depth_mode(depth_mode),
            ..PolyParam::new(0, count)
        }
    }

    #[test]
    fn test_degenerate_strips_skipped() {
        for mode in [DrawMode::OpaqueDepth, DrawMode::PunchThroughColor, DrawMode::TranslucentOit] {
            assert!(mode.skips(&param(2, 7)), "{mode:?}: two vertices make no triangle");
            assert!(!mode.skips(&param(3, 7)), "{mode:?}: three vertices must be drawn");
        }
    }

    #[test]
    fn test_never_depth_mode() {
        let never = param(4, 0);
        assert!(DrawMode::OpaqueDepth.skips(&never));
        assert!(DrawMode::OpaqueColor.skips(&never));
        assert!(DrawMode::TranslucentColor.skips(&never));
        assert!(!DrawMode::PunchThroughColor.skips(&never), "PT ignores its depth mode");
        assert!(!DrawMode::TranslucentOit.skips(&never), "sorted TR ignores its depth mode");
    }

    #[test]
    fn test_noop_blend_only_skipped_in_oit() {
        let mut noop = param(4, 7);
        noop.tsp = Tsp(0).with_src_instr(0).with_dst_instr(1);
        assert!(DrawMode::TranslucentOit.skips(&noop));
        assert!(!DrawMode::TranslucentColor.skips(&noop));
        assert!(!DrawMode::TranslucentSortedDepth.skips(&noop));
    }

    #[test]
    fn test_mode_axes() {
        assert_eq!(DrawMode::TranslucentSortedDepth.pass(), Pass::Depth);
        assert!(DrawMode::TranslucentSortedDepth.forces_greater_equal());
        assert!(DrawMode::PunchThroughColor.forces_greater_equal());
        assert!(!DrawMode::OpaqueDepth.forces_greater_equal());
        assert!(DrawMode::TranslucentColor.uses_record_depth_func());
        assert!(!DrawMode::TranslucentOit.uses_record_depth_func());
        assert!(!DrawMode::TranslucentOit.forces_greater_equal());
    }

    proptest! {
        #[test]
        fn prop_skip_only_for_known_reasons(
            mode in 0usize..MODES.len(),
            count in 0u32..64,
            depth_mode in 0u32..8,
            src in 0u32..8,
            dst in 0u32..8,
        ) {
            let mode = MODES[mode];
            let mut record = param(count, depth_mode);
            record.tsp = Tsp(0).with_src_instr(src).with_dst_instr(dst);

            let degenerate = count <= 2;
            let never = mode.uses_record_depth_func() && depth_mode == 0;
            let noop = mode == DrawMode::TranslucentOit && src == 0 && dst == 1;
            prop_assert_eq!(mode.skips(&record), degenerate || never || noop);
        }
    }
}
