//! Modifier volume stencil passes.

use std::ops::Range;

use pvr2_core::state::cull_face;
use pvr2_core::{
    plan_modifier_volumes, CompareFunction, CullFace, ModVolMode, StencilOp, StencilOps,
};

use crate::context::DrawContext;
use crate::device::{GraphicsDevice, VertexArray};
use crate::error::RenderResult;

/// Configures stencil and depth state for one modifier volume mode.
///
/// Bit 1 of the stencil holds the per-volume result, bit 0 the merged
/// shadow state of the tile.
pub fn set_modvol_mode(device: &mut dyn GraphicsDevice, mode: ModVolMode, cull_mode: u32) {
    match mode {
        ModVolMode::Xor => {
            device.set_depth_test(true);
            device.set_stencil_write_mask(2);
            device.set_stencil_func(CompareFunction::Always, 0, 2);
            // count the volume faces in front of the depth buffer
            device.set_stencil_op(StencilOps::new(StencilOp::Keep, StencilOp::Keep, StencilOp::Invert));
            device.set_cull(cull_face(cull_mode));
        }
        ModVolMode::Or => {
            device.set_depth_test(true);
            device.set_stencil_write_mask(2);
            device.set_stencil_func(CompareFunction::Always, 2, 2);
            device.set_stencil_op(StencilOps::new(StencilOp::Keep, StencilOp::Keep, StencilOp::Replace));
            device.set_cull(cull_face(cull_mode));
        }
        ModVolMode::Inclusion => {
            device.set_depth_test(false);
            device.set_stencil_write_mask(3);
            // st = (st & 3) >= 1 ? 1 : 0
            device.set_stencil_func(CompareFunction::LessEqual, 1, 3);
            device.set_stencil_op(StencilOps::new(StencilOp::Zero, StencilOp::Zero, StencilOp::Replace));
            device.set_cull(CullFace::None);
        }
        ModVolMode::Exclusion => {
            device.set_depth_test(false);
            device.set_stencil_write_mask(3);
            // st = (st & 3) == 1 ? 1 : 0
            device.set_stencil_func(CompareFunction::Equal, 1, 3);
            device.set_stencil_op(StencilOps::new(StencilOp::Zero, StencilOp::Zero, StencilOp::Keep));
            device.set_cull(CullFace::None);
        }
    }
}

/// Draws the opaque modifier volumes in `range` into the stencil buffer.
///
/// Leaves the main vertex array bound with depth test and depth writes on.
/// Returns the number of draw calls issued.
pub fn draw_modifier_volumes(ctx: &mut DrawContext<'_>, range: Range<u32>) -> RenderResult<u32> {
    if range.is_empty() {
        return Ok(0);
    }
    let frame = ctx.frame;
    let records = &frame.modvols[range.start as usize..range.end as usize];

    ctx.device.bind_vertex_array(VertexArray::ModifierVolume);
    ctx.device.set_blend(None);
    ctx.set_base_clipping();

    let program = ctx.shaders.modifier_volume_program(ctx.device)?;
    ctx.device.use_program(program);

    ctx.device.set_depth_test(true);
    ctx.device.set_depth_write(false);
    ctx.device.set_depth_func(CompareFunction::Greater);
    ctx.device.set_color_write(false);

    let mut draws = 0;
    for draw in plan_modifier_volumes(records) {
        set_modvol_mode(ctx.device, draw.mode, draw.cull_mode);
        let vertices = draw.vertices();
        ctx.device.draw_triangles(vertices.start, vertices.len() as u32);
        draws += 1;
    }
    ctx.stats.modvol_draws += draws;

    ctx.device.bind_vertex_array(VertexArray::Main);
    ctx.device.set_depth_test(true);
    ctx.device.set_depth_write(true);
    Ok(draws)
}

/// Applies the translucent modifier volumes in `range` to the accumulated
/// translucent fragments.
pub fn draw_translucent_modifier_volumes(ctx: &mut DrawContext<'_>, range: Range<u32>) {
    if range.is_empty() {
        return;
    }
    let frame = ctx.frame;
    let records = &frame.tr_modvols[range.start as usize..range.end as usize];
    ctx.device.draw_translucent_modifier_volumes(records);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Command, RecordingDevice};

    #[test]
    fn test_inclusion_state() {
        let mut device = RecordingDevice::new();
        set_modvol_mode(&mut device, ModVolMode::Inclusion, 3);
        assert_eq!(
            device.commands(),
            &[
                Command::DepthTest(false),
                Command::StencilWriteMask(3),
                Command::StencilFunc {
                    func: CompareFunction::LessEqual,
                    reference: 1,
                    mask: 3
                },
                Command::StencilOp(StencilOps::new(
                    StencilOp::Zero,
                    StencilOp::Zero,
                    StencilOp::Replace
                )),
                Command::Cull(CullFace::None),
            ]
        );
    }

    #[test]
    fn test_xor_uses_record_cull() {
        let mut device = RecordingDevice::new();
        set_modvol_mode(&mut device, ModVolMode::Xor, 3);
        assert!(device.commands().contains(&Command::Cull(CullFace::Back)));
        assert!(device.commands().contains(&Command::StencilWriteMask(2)));
    }
}
