//! Per-frame draw context shared by the pipeline stages.

use pvr2_core::{DeviceCaps, FrameData, Pass, RenderSettings, TileClipContext};

use crate::device::GraphicsDevice;
use crate::shader_cache::ShaderCache;
use crate::uniforms::ShaderUniforms;

/// Counters collected while drawing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub passes_drawn: u32,
    pub passes_skipped: u32,
    pub depth_draws: u32,
    pub color_draws: u32,
    pub oit_draws: u32,
    /// Modifier volume draws, including merge draws.
    pub modvol_draws: u32,
    pub depth_blits: u32,
    pub resolves: u32,
}

impl FrameStats {
    pub(crate) fn count_draw(&mut self, pass: Pass) {
        match pass {
            Pass::Depth => self.depth_draws += 1,
            Pass::Color => self.color_draws += 1,
            Pass::Oit => self.oit_draws += 1,
        }
    }

    /// Draws of polygon records across all passes.
    #[must_use]
    pub fn polygon_draws(&self) -> u32 {
        self.depth_draws + self.color_draws + self.oit_draws
    }
}

/// State threaded through one `draw_strips` call.
///
/// `uniforms` is updated by each stage and pushed to the active program
/// before a draw.
pub struct DrawContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub shaders: &'a mut ShaderCache,
    pub frame: &'a FrameData,
    pub settings: &'a RenderSettings,
    pub caps: DeviceCaps,
    pub uniforms: ShaderUniforms,
    pub tile_clip: TileClipContext,
    pub stats: FrameStats,
}

impl<'a> DrawContext<'a> {
    pub fn new(
        device: &'a mut dyn GraphicsDevice,
        shaders: &'a mut ShaderCache,
        frame: &'a FrameData,
        settings: &'a RenderSettings,
    ) -> Self {
        let caps = device.caps();
        let tile_clip = TileClipContext {
            enabled: settings.clipping,
            is_rtt: frame.is_rtt,
            viewport: frame.viewport,
            rtt_scale: settings.render_to_texture_upscale,
        };
        Self {
            device,
            shaders,
            frame,
            settings,
            caps,
            uniforms: ShaderUniforms::default(),
            tile_clip,
            stats: FrameStats::default(),
        }
    }

    /// Applies the frame-level scissor, or disables scissoring.
    pub fn set_base_clipping(&mut self) {
        self.device.set_scissor(self.frame.base_clip);
    }
}
