//! The graphics device abstraction the draw pipeline is written against.
//!
//! The interface is a small immediate-mode state machine: state set through
//! it stays in effect until it is changed again, and every draw uses the
//! state current at the time of the call. Texture units are selected with
//! [`GraphicsDevice::active_texture`]; [`GraphicsDevice::bind_texture`]
//! affects the active unit only.

use pvr2_core::{
    BlendState, ClipRect, CompareFunction, CullFace, DeviceCaps, ModVolVertex,
    ModifierVolumeParam, SamplerState, ShaderVariant, StencilOps, TextureId, Vertex,
};

use crate::error::RenderResult;
use crate::uniforms::{FrameUniforms, ShaderUniforms};

/// A texture created by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

/// Unit the depth view is bound to for the translucency pass.
pub const DEPTH_UNIT: u32 = 2;
/// Unit the stencil is bound to for shadow sampling.
pub const STENCIL_UNIT: u32 = 3;
pub const TEXTURE_UNITS: u32 = 4;

/// A texture bound to a texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundTexture {
    /// A texture owned by the texture cache.
    Cache(TextureId),
    Device(TextureHandle),
}

/// Vertex layout and buffer used by subsequent draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexArray {
    /// Strip vertices and indices.
    Main,
    /// Modifier volume positions.
    ModifierVolume,
}

/// Buffers cleared by [`GraphicsDevice::clear`]. `None` leaves a buffer untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearValues {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

impl ClearValues {
    #[must_use]
    pub fn depth(depth: f32) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn stencil(stencil: u32) -> Self {
        Self {
            stencil: Some(stencil),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn depth_stencil(depth: f32, stencil: u32) -> Self {
        Self {
            color: None,
            depth: Some(depth),
            stencil: Some(stencil),
        }
    }
}

/// A graphics device driven by the render pipeline.
pub trait GraphicsDevice {
    /// Limits of the device.
    fn caps(&self) -> DeviceCaps;

    // --- Textures and framebuffers ---

    /// Creates a combined depth/stencil texture usable as an attachment.
    fn create_depth_stencil_texture(&mut self, width: u32, height: u32)
        -> RenderResult<TextureHandle>;

    /// Creates a view of the depth aspect of a depth/stencil texture, for sampling.
    fn create_depth_view(&mut self, depth_stencil: TextureHandle) -> RenderResult<TextureHandle>;

    /// Creates an RGBA color texture usable as an attachment and for sampling.
    fn create_color_texture(&mut self, width: u32, height: u32) -> RenderResult<TextureHandle>;

    /// Creates a sampled RGBA8 texture from pixel data.
    fn create_texture_from_rgba(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> RenderResult<TextureHandle>;

    fn delete_texture(&mut self, texture: TextureHandle);

    fn create_framebuffer(&mut self) -> FramebufferHandle;

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);

    fn attach_color(&mut self, framebuffer: FramebufferHandle, texture: Option<TextureHandle>);

    fn attach_depth_stencil(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: Option<TextureHandle>,
    );

    fn is_framebuffer_complete(&self, framebuffer: FramebufferHandle) -> bool;

    /// Makes `framebuffer` the target of draws and clears.
    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Copies the depth of `src` into `dst`.
    fn blit_depth(&mut self, src: FramebufferHandle, dst: FramebufferHandle, width: u32, height: u32);

    /// Clears the bound framebuffer.
    fn clear(&mut self, values: ClearValues);

    // --- Programs and uniforms ---

    fn compile_program(&mut self, variant: &ShaderVariant) -> RenderResult<ProgramHandle>;

    /// Compiles the stencil-only program used for modifier volumes.
    fn compile_modifier_volume_program(&mut self) -> RenderResult<ProgramHandle>;

    fn use_program(&mut self, program: ProgramHandle);

    fn set_uniforms(&mut self, uniforms: &ShaderUniforms);

    /// Sets the rectangle `[x0, y0, x1, y1]` discarded by inside-clipping variants.
    fn set_clip_test(&mut self, corners: [f32; 4]);

    fn set_frame_uniforms(&mut self, uniforms: &FrameUniforms);

    // --- Fixed-function state ---

    fn set_color_write(&mut self, enabled: bool);

    /// `None` disables blending.
    fn set_blend(&mut self, blend: Option<BlendState>);

    /// `None` disables the scissor test.
    fn set_scissor(&mut self, rect: Option<ClipRect>);

    /// A disabled depth test also disables depth writes.
    fn set_depth_test(&mut self, enabled: bool);

    fn set_depth_func(&mut self, func: CompareFunction);

    fn set_depth_write(&mut self, enabled: bool);

    fn set_stencil_test(&mut self, enabled: bool);

    fn set_stencil_func(&mut self, func: CompareFunction, reference: u32, mask: u32);

    fn set_stencil_op(&mut self, ops: StencilOps);

    fn set_stencil_write_mask(&mut self, mask: u32);

    fn set_cull(&mut self, cull: CullFace);

    // --- Texture units ---

    fn active_texture(&mut self, unit: u32);

    /// Binds a texture to the active unit, `None` unbinds it.
    fn bind_texture(&mut self, texture: Option<BoundTexture>);

    /// `None` restores the texture's own nearest-filtered sampling.
    fn bind_sampler(&mut self, unit: u32, sampler: Option<SamplerState>);

    // --- Geometry and draws ---

    fn upload_geometry(&mut self, vertices: &[Vertex], indices: &[u32]);

    fn upload_modifier_volumes(&mut self, positions: &[ModVolVertex]);

    fn bind_vertex_array(&mut self, array: VertexArray);

    /// Draws an indexed triangle strip of `count` indices starting at index `first`.
    fn draw_strip(&mut self, first: u32, count: u32);

    /// Draws a non-indexed triangle list from the modifier volume buffer.
    fn draw_triangles(&mut self, first_vertex: u32, vertex_count: u32);

    /// Draws a 4-vertex strip from a transient buffer.
    fn draw_quad(&mut self, vertices: &[Vertex; 4]);

    // --- Translucency accumulation ---

    /// Discards accumulated translucent fragments.
    fn reset_accumulation(&mut self);

    /// Composites the accumulated translucent fragments over the texture on
    /// unit 0 into the bound framebuffer, then resets the accumulation.
    fn resolve_accumulation(&mut self);

    /// Applies translucent modifier volumes to the accumulated fragments.
    fn draw_translucent_modifier_volumes(&mut self, records: &[ModifierVolumeParam]);
}
