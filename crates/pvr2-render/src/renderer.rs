//! The render-pass orchestrator.

use pvr2_core::{FrameData, PassRanges, PolyParam, RenderSettings};

use crate::context::{DrawContext, FrameStats};
use crate::device::{
    BoundTexture, ClearValues, FramebufferHandle, GraphicsDevice, DEPTH_UNIT, STENCIL_UNIT,
};
use crate::error::{RenderError, RenderResult};
use crate::list_drawer::{draw_list, DrawMode};
use crate::modvol::{draw_modifier_volumes, draw_translucent_modifier_volumes};
use crate::resources::FrameTargets;
use crate::shader_cache::ShaderCache;
use crate::uniforms::FrameUniforms;
use pvr2_core::{StencilOp, StencilOps};

/// Draws frames of polygon records into a framebuffer.
pub struct Renderer {
    pub(crate) shaders: ShaderCache,
    targets: Option<FrameTargets>,
    settings: RenderSettings,
}

fn any_triangles(records: &[PolyParam], range: &std::ops::Range<u32>) -> bool {
    records[range.start as usize..range.end as usize]
        .iter()
        .any(PolyParam::has_triangles)
}

impl Renderer {
    #[must_use]
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            shaders: ShaderCache::new(),
            targets: None,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: RenderSettings) {
        self.settings = settings;
    }

    #[must_use]
    pub fn shader_cache(&self) -> &ShaderCache {
        &self.shaders
    }

    #[must_use]
    pub fn targets(&self) -> Option<&FrameTargets> {
        self.targets.as_ref()
    }

    /// Allocates the render targets for `width` x `height` frames,
    /// releasing any previous ones.
    pub fn create_textures(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        if let Some(old) = self.targets.take() {
            old.release(device);
        }
        self.targets = Some(FrameTargets::create(device, width, height)?);
        Ok(())
    }

    /// Renders `frame` and resolves the result into `output`.
    pub fn draw_strips(
        &mut self,
        device: &mut dyn GraphicsDevice,
        frame: &FrameData,
        output: FramebufferHandle,
        width: u32,
        height: u32,
    ) -> RenderResult<FrameStats> {
        let passes = frame.validate()?;
        let targets = self.targets.as_mut().ok_or(RenderError::TargetsNotCreated)?;

        device.reset_accumulation();
        device.upload_geometry(&frame.vertices, &frame.indices);
        device.upload_modifier_volumes(&frame.modvol_vertices);
        device.set_frame_uniforms(&FrameUniforms::from_frame(frame));

        device.bind_framebuffer(targets.framebuffer);
        device.set_depth_write(true);
        device.set_stencil_write_mask(0xFF);
        device.clear(ClearValues::depth_stencil(0.0, 0));
        device.active_texture(0);

        let mut ctx = DrawContext::new(device, &mut self.shaders, frame, &self.settings);
        let total = passes.len();

        for pass in &passes {
            let draw_op_pt = any_triangles(&frame.op, &pass.op) || any_triangles(&frame.pt, &pass.pt);
            let draw_tr = any_triangles(&frame.tr, &pass.tr);
            if !draw_op_pt && !draw_tr {
                log::debug!("render pass {}/{} skipped, nothing to draw", pass.index + 1, total);
                ctx.stats.passes_skipped += 1;
                continue;
            }
            log::debug!(
                "render pass {}/{} OP {} PT {} TR {} autosort {}",
                pass.index + 1,
                total,
                pass.op.len(),
                pass.pt.len(),
                pass.tr.len(),
                pass.autosort
            );
            ctx.stats.passes_drawn += 1;
            ctx.device.bind_vertex_array(crate::device::VertexArray::Main);

            if draw_op_pt {
                draw_opaque(&mut ctx, targets, pass, width, height)?;
            }
            if draw_tr {
                draw_translucent(&mut ctx, targets, pass)?;
            }
            if draw_op_pt && !pass.is_last {
                // stencil contents are scoped to one pass
                ctx.device.set_stencil_write_mask(0xFF);
                ctx.device.clear(ClearValues::stencil(0));
            }
        }

        ctx.device.bind_framebuffer(output);
        ctx.device.set_color_write(true);
        resolve_into_bound(&mut ctx, targets);
        Ok(ctx.stats)
    }
}

/// Resolves the accumulation over the current accumulation texture into the
/// bound framebuffer.
fn resolve_into_bound(ctx: &mut DrawContext<'_>, targets: &FrameTargets) {
    ctx.device.active_texture(0);
    ctx.device.bind_sampler(0, None);
    ctx.device
        .bind_texture(targets.accumulation.get().map(BoundTexture::Device));
    ctx.device.resolve_accumulation();
    ctx.stats.resolves += 1;
}

/// Depth pre-pass and color pass of the opaque and punch-through records.
fn draw_opaque(
    ctx: &mut DrawContext<'_>,
    targets: &mut FrameTargets,
    pass: &PassRanges,
    width: u32,
    height: u32,
) -> RenderResult<()> {
    // Stage A: depth and stencil.
    let depth_save = if pass.index > 0 {
        // The color stage restores the depth the previous pass left.
        let save = targets.depth_save_framebuffer(ctx.device)?;
        ctx.device.blit_depth(targets.framebuffer, save, width, height);
        ctx.device.bind_framebuffer(targets.framebuffer);
        ctx.stats.depth_blits += 1;
        Some(save)
    } else {
        None
    };

    ctx.device.set_color_write(false);
    ctx.device.set_depth_test(true);
    ctx.device.set_depth_write(true);
    ctx.device.set_stencil_test(true);
    ctx.device
        .set_stencil_op(StencilOps::new(StencilOp::Keep, StencilOp::Keep, StencilOp::Replace));

    draw_list(ctx, DrawMode::OpaqueDepth, pass.op.clone())?;
    draw_list(ctx, DrawMode::PunchThroughDepth, pass.pt.clone())?;

    if ctx.settings.modifier_volumes {
        draw_modifier_volumes(ctx, pass.mvo.clone())?;
    }

    // Stage B: color.
    match depth_save {
        None => {
            ctx.device.set_depth_write(true);
            ctx.device.clear(ClearValues::depth(0.0));
        }
        Some(save) => {
            ctx.device.blit_depth(save, targets.framebuffer, width, height);
            ctx.device.bind_framebuffer(targets.framebuffer);
            ctx.stats.depth_blits += 1;
        }
    }

    ctx.device.set_color_write(true);
    ctx.device.set_stencil_test(false);

    ctx.device.active_texture(STENCIL_UNIT);
    ctx.device
        .bind_texture(Some(BoundTexture::Device(targets.depth_stencil)));
    ctx.device.active_texture(0);

    draw_list(ctx, DrawMode::OpaqueColor, pass.op.clone())?;
    draw_list(ctx, DrawMode::PunchThroughColor, pass.pt.clone())?;

    ctx.device.active_texture(STENCIL_UNIT);
    ctx.device.bind_texture(None);
    ctx.device.active_texture(0);
    Ok(())
}

/// Translucency stage and, between passes, the accumulation hand-off.
fn draw_translucent(
    ctx: &mut DrawContext<'_>,
    targets: &mut FrameTargets,
    pass: &PassRanges,
) -> RenderResult<()> {
    if pass.autosort {
        ctx.device.set_color_write(false);
        ctx.device.set_depth_test(false);

        // Detached while the sorted draws sample the depth view.
        ctx.device.attach_depth_stencil(targets.framebuffer, None);
        ctx.device.active_texture(DEPTH_UNIT);
        ctx.device
            .bind_texture(Some(BoundTexture::Device(targets.depth_view)));
        ctx.device.active_texture(0);

        draw_list(ctx, DrawMode::TranslucentOit, pass.tr.clone())?;

        if ctx.settings.modifier_volumes {
            ctx.set_base_clipping();
            draw_translucent_modifier_volumes(ctx, pass.mvo_tr.clone());
        }

        ctx.device
            .attach_depth_stencil(targets.framebuffer, Some(targets.depth_stencil));

        if !pass.is_last {
            // The next pass hides surfaces behind translucent depth too.
            ctx.device.active_texture(DEPTH_UNIT);
            ctx.device.bind_texture(None);
            ctx.device.active_texture(0);

            ctx.device.set_depth_test(true);
            draw_list(ctx, DrawMode::TranslucentSortedDepth, pass.tr.clone())?;
        }
    } else {
        ctx.device.set_color_write(true);
        ctx.device.set_depth_test(true);
        draw_list(ctx, DrawMode::TranslucentColor, pass.tr.clone())?;
        ctx.device.set_blend(None);
    }

    if !pass.is_last {
        // Stage D: resolve into a fresh accumulation texture.
        let texture = ctx.device.create_color_texture(targets.width, targets.height)?;
        ctx.device.attach_color(targets.framebuffer, Some(texture));
        ctx.device.set_color_write(true);
        resolve_into_bound(ctx, targets);
        ctx.device.bind_texture(None);
        targets.accumulation.replace(ctx.device, texture);
    }
    Ok(())
}
