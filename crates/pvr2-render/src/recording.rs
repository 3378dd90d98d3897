//! A [`GraphicsDevice`] that records calls instead of rendering.
//!
//! Used by the tests and by the replay tool's `stats` command. Every call is
//! appended to a command log, and each draw captures a snapshot of the state
//! it was issued with.

use std::collections::{HashMap, HashSet};

use pvr2_core::{
    BlendState, ClipRect, CompareFunction, CullFace, DeviceCaps, ModVolVertex,
    ModifierVolumeParam, Pass, SamplerState, ShaderVariant, StencilOp, StencilOps, Vertex,
};

use crate::device::{
    BoundTexture, ClearValues, FramebufferHandle, GraphicsDevice, ProgramHandle, TextureHandle,
    VertexArray, TEXTURE_UNITS,
};
use crate::error::{RenderError, RenderResult};
use crate::uniforms::{FrameUniforms, ShaderUniforms};

/// Primitive submitted by a draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawKind {
    Strip { first: u32, count: u32 },
    Triangles { first_vertex: u32, vertex_count: u32 },
    Quad([Vertex; 4]),
}

/// Device state tracked by [`RecordingDevice`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceState {
    pub framebuffer: Option<FramebufferHandle>,
    pub program: Option<ProgramHandle>,
    pub uniforms: ShaderUniforms,
    pub clip_test: [f32; 4],
    pub color_write: bool,
    pub blend: Option<BlendState>,
    pub scissor: Option<ClipRect>,
    pub depth_test: bool,
    pub depth_func: CompareFunction,
    pub depth_write: bool,
    pub stencil_test: bool,
    pub stencil_func: (CompareFunction, u32, u32),
    pub stencil_ops: StencilOps,
    pub stencil_write_mask: u32,
    pub cull: CullFace,
    pub active_unit: u32,
    pub textures: [Option<BoundTexture>; TEXTURE_UNITS as usize],
    pub samplers: [Option<SamplerState>; TEXTURE_UNITS as usize],
    pub vertex_array: VertexArray,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            framebuffer: None,
            program: None,
            uniforms: ShaderUniforms::default(),
            clip_test: [0.0; 4],
            color_write: true,
            blend: None,
            scissor: None,
            depth_test: false,
            depth_func: CompareFunction::Less,
            depth_write: true,
            stencil_test: false,
            stencil_func: (CompareFunction::Always, 0, 0xFF),
            stencil_ops: StencilOps::new(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep),
            stencil_write_mask: 0xFF,
            cull: CullFace::None,
            active_unit: 0,
            textures: [None; TEXTURE_UNITS as usize],
            samplers: [None; TEXTURE_UNITS as usize],
            vertex_array: VertexArray::Main,
        }
    }
}

impl DeviceState {
    /// Whether draws update the depth buffer.
    #[must_use]
    pub fn writes_depth(&self) -> bool {
        self.depth_test && self.depth_write
    }
}

/// A draw call and the state it was issued with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRecord {
    pub kind: DrawKind,
    /// `None` for the modifier volume program.
    pub variant: Option<ShaderVariant>,
    pub state: DeviceState,
}

impl DrawRecord {
    #[must_use]
    pub fn pass(&self) -> Option<Pass> {
        self.variant.map(|variant| variant.pass)
    }
}

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTexture { texture: TextureHandle, width: u32, height: u32 },
    CreateDepthView { depth_stencil: TextureHandle, view: TextureHandle },
    DeleteTexture(TextureHandle),
    CreateFramebuffer(FramebufferHandle),
    DeleteFramebuffer(FramebufferHandle),
    AttachColor { framebuffer: FramebufferHandle, texture: Option<TextureHandle> },
    AttachDepthStencil { framebuffer: FramebufferHandle, texture: Option<TextureHandle> },
    BindFramebuffer(FramebufferHandle),
    BlitDepth { src: FramebufferHandle, dst: FramebufferHandle },
    Clear(ClearValues),
    CompileProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    Uniforms(ShaderUniforms),
    ClipTest([f32; 4]),
    FrameUniforms,
    ColorWrite(bool),
    Blend(Option<BlendState>),
    Scissor(Option<ClipRect>),
    DepthTest(bool),
    DepthFunc(CompareFunction),
    DepthWrite(bool),
    StencilTest(bool),
    StencilFunc { func: CompareFunction, reference: u32, mask: u32 },
    StencilOp(StencilOps),
    StencilWriteMask(u32),
    Cull(CullFace),
    ActiveTexture(u32),
    BindTexture { unit: u32, texture: Option<BoundTexture> },
    BindSampler { unit: u32, sampler: Option<SamplerState> },
    UploadGeometry { vertices: usize, indices: usize },
    UploadModifierVolumes(usize),
    BindVertexArray(VertexArray),
    Draw(DrawRecord),
    ResetAccumulation,
    ResolveAccumulation,
    TranslucentModifierVolumes(usize),
}

#[derive(Debug, Default, Clone, Copy)]
struct Attachments {
    color: Option<TextureHandle>,
    depth_stencil: Option<TextureHandle>,
}

/// Records every call made through [`GraphicsDevice`].
#[derive(Debug)]
pub struct RecordingDevice {
    caps: DeviceCaps,
    commands: Vec<Command>,
    state: DeviceState,
    next_handle: u32,
    textures: HashMap<TextureHandle, (u32, u32)>,
    framebuffers: HashMap<FramebufferHandle, Attachments>,
    programs: HashMap<ProgramHandle, Option<ShaderVariant>>,
    deleted: HashSet<TextureHandle>,
    fail_compilation: bool,
    fail_framebuffer_check: bool,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::with_caps(DeviceCaps::default())
    }
}

impl RecordingDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_caps(caps: DeviceCaps) -> Self {
        Self {
            caps,
            commands: Vec::new(),
            state: DeviceState::default(),
            next_handle: 1,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            deleted: HashSet::new(),
            fail_compilation: false,
            fail_framebuffer_check: false,
        }
    }

    /// Makes program compilation fail until reset.
    pub fn fail_compilation(&mut self, fail: bool) {
        self.fail_compilation = fail;
    }

    /// Makes every framebuffer report itself incomplete until reset.
    pub fn fail_framebuffer_check(&mut self, fail: bool) {
        self.fail_framebuffer_check = fail;
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Forgets the recorded commands, keeping state and resources.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    #[must_use]
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// The recorded draw calls, in order.
    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> + '_ {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Successful program compilations.
    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_live(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture)
    }

    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).copied()
    }

    /// Whether `texture` existed and has been deleted.
    #[must_use]
    pub fn was_deleted(&self, texture: TextureHandle) -> bool {
        self.deleted.contains(&texture)
    }

    /// Color and depth/stencil attachments of `framebuffer`.
    #[must_use]
    pub fn framebuffer_attachments(
        &self,
        framebuffer: FramebufferHandle,
    ) -> (Option<TextureHandle>, Option<TextureHandle>) {
        self.framebuffers
            .get(&framebuffer)
            .map_or((None, None), |a| (a.color, a.depth_stencil))
    }

    fn handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn new_texture(&mut self, width: u32, height: u32) -> TextureHandle {
        let texture = TextureHandle(self.handle());
        self.textures.insert(texture, (width, height));
        self.commands.push(Command::CreateTexture {
            texture,
            width,
            height,
        });
        texture
    }

    fn new_program(&mut self, variant: Option<ShaderVariant>) -> RenderResult<ProgramHandle> {
        if self.fail_compilation {
            return Err(RenderError::ShaderCompilationFailed(
                "compilation disabled".to_string(),
            ));
        }
        let program = ProgramHandle(self.handle());
        self.programs.insert(program, variant);
        self.commands.push(Command::CompileProgram(program));
        Ok(program)
    }

    fn record_draw(&mut self, kind: DrawKind) {
        let variant = self
            .state
            .program
            .and_then(|program| self.programs.get(&program).copied().flatten());
        self.commands.push(Command::Draw(DrawRecord {
            kind,
            variant,
            state: self.state,
        }));
    }
}

impl GraphicsDevice for RecordingDevice {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_depth_stencil_texture(
        &mut self,
        width: u32,
        height: u32,
    ) -> RenderResult<TextureHandle> {
        Ok(self.new_texture(width, height))
    }

    fn create_depth_view(&mut self, depth_stencil: TextureHandle) -> RenderResult<TextureHandle> {
        let (width, height) = self.texture_size(depth_stencil).ok_or_else(|| {
            RenderError::TextureCreationFailed(format!("{depth_stencil:?} does not exist"))
        })?;
        let view = TextureHandle(self.handle());
        self.textures.insert(view, (width, height));
        self.commands.push(Command::CreateDepthView {
            depth_stencil,
            view,
        });
        Ok(view)
    }

    fn create_color_texture(&mut self, width: u32, height: u32) -> RenderResult<TextureHandle> {
        Ok(self.new_texture(width, height))
    }

    fn create_texture_from_rgba(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> RenderResult<TextureHandle> {
        if rgba.len() != (width * height * 4) as usize {
            return Err(RenderError::TextureCreationFailed(format!(
                "expected {} bytes for {width}x{height}, got {}",
                width * height * 4,
                rgba.len()
            )));
        }
        Ok(self.new_texture(width, height))
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            self.deleted.insert(texture);
        }
        for unit in &mut self.state.textures {
            if *unit == Some(BoundTexture::Device(texture)) {
                *unit = None;
            }
        }
        self.commands.push(Command::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> FramebufferHandle {
        let framebuffer = FramebufferHandle(self.handle());
        self.framebuffers.insert(framebuffer, Attachments::default());
        self.commands.push(Command::CreateFramebuffer(framebuffer));
        framebuffer
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer);
        self.commands.push(Command::DeleteFramebuffer(framebuffer));
    }

    fn attach_color(&mut self, framebuffer: FramebufferHandle, texture: Option<TextureHandle>) {
        self.framebuffers.entry(framebuffer).or_default().color = texture;
        self.commands.push(Command::AttachColor {
            framebuffer,
            texture,
        });
    }

    fn attach_depth_stencil(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: Option<TextureHandle>,
    ) {
        self.framebuffers.entry(framebuffer).or_default().depth_stencil = texture;
        self.commands.push(Command::AttachDepthStencil {
            framebuffer,
            texture,
        });
    }

    fn is_framebuffer_complete(&self, framebuffer: FramebufferHandle) -> bool {
        if self.fail_framebuffer_check {
            return false;
        }
        let Some(attachments) = self.framebuffers.get(&framebuffer) else {
            return false;
        };
        let live = |texture: Option<TextureHandle>| texture.map_or(true, |t| self.is_live(t));
        (attachments.color.is_some() || attachments.depth_stencil.is_some())
            && live(attachments.color)
            && live(attachments.depth_stencil)
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.state.framebuffer = Some(framebuffer);
        self.commands.push(Command::BindFramebuffer(framebuffer));
    }

    fn blit_depth(
        &mut self,
        src: FramebufferHandle,
        dst: FramebufferHandle,
        _width: u32,
        _height: u32,
    ) {
        self.commands.push(Command::BlitDepth { src, dst });
    }

    fn clear(&mut self, values: ClearValues) {
        self.commands.push(Command::Clear(values));
    }

    fn compile_program(&mut self, variant: &ShaderVariant) -> RenderResult<ProgramHandle> {
        self.new_program(Some(*variant))
    }

    fn compile_modifier_volume_program(&mut self) -> RenderResult<ProgramHandle> {
        self.new_program(None)
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.state.program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniforms(&mut self, uniforms: &ShaderUniforms) {
        self.state.uniforms = *uniforms;
        self.commands.push(Command::Uniforms(*uniforms));
    }

    fn set_clip_test(&mut self, corners: [f32; 4]) {
        self.state.clip_test = corners;
        self.commands.push(Command::ClipTest(corners));
    }

    fn set_frame_uniforms(&mut self, _uniforms: &FrameUniforms) {
        self.commands.push(Command::FrameUniforms);
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.state.color_write = enabled;
        self.commands.push(Command::ColorWrite(enabled));
    }

    fn set_blend(&mut self, blend: Option<BlendState>) {
        self.state.blend = blend;
        self.commands.push(Command::Blend(blend));
    }

    fn set_scissor(&mut self, rect: Option<ClipRect>) {
        self.state.scissor = rect;
        self.commands.push(Command::Scissor(rect));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
        self.commands.push(Command::DepthTest(enabled));
    }

    fn set_depth_func(&mut self, func: CompareFunction) {
        self.state.depth_func = func;
        self.commands.push(Command::DepthFunc(func));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.state.depth_write = enabled;
        self.commands.push(Command::DepthWrite(enabled));
    }

    fn set_stencil_test(&mut self, enabled: bool) {
        self.state.stencil_test = enabled;
        self.commands.push(Command::StencilTest(enabled));
    }

    fn set_stencil_func(&mut self, func: CompareFunction, reference: u32, mask: u32) {
        self.state.stencil_func = (func, reference, mask);
        self.commands.push(Command::StencilFunc {
            func,
            reference,
            mask,
        });
    }

    fn set_stencil_op(&mut self, ops: StencilOps) {
        self.state.stencil_ops = ops;
        self.commands.push(Command::StencilOp(ops));
    }

    fn set_stencil_write_mask(&mut self, mask: u32) {
        self.state.stencil_write_mask = mask;
        self.commands.push(Command::StencilWriteMask(mask));
    }

    fn set_cull(&mut self, cull: CullFace) {
        self.state.cull = cull;
        self.commands.push(Command::Cull(cull));
    }

    fn active_texture(&mut self, unit: u32) {
        self.state.active_unit = unit;
        self.commands.push(Command::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, texture: Option<BoundTexture>) {
        let unit = self.state.active_unit;
        if let Some(slot) = self.state.textures.get_mut(unit as usize) {
            *slot = texture;
        }
        self.commands.push(Command::BindTexture { unit, texture });
    }

    fn bind_sampler(&mut self, unit: u32, sampler: Option<SamplerState>) {
        if let Some(slot) = self.state.samplers.get_mut(unit as usize) {
            *slot = sampler;
        }
        self.commands.push(Command::BindSampler { unit, sampler });
    }

    fn upload_geometry(&mut self, vertices: &[Vertex], indices: &[u32]) {
        self.commands.push(Command::UploadGeometry {
            vertices: vertices.len(),
            indices: indices.len(),
        });
    }

    fn upload_modifier_volumes(&mut self, positions: &[ModVolVertex]) {
        self.commands
            .push(Command::UploadModifierVolumes(positions.len()));
    }

    fn bind_vertex_array(&mut self, array: VertexArray) {
        self.state.vertex_array = array;
        self.commands.push(Command::BindVertexArray(array));
    }

    fn draw_strip(&mut self, first: u32, count: u32) {
        self.record_draw(DrawKind::Strip { first, count });
    }

    fn draw_triangles(&mut self, first_vertex: u32, vertex_count: u32) {
        self.record_draw(DrawKind::Triangles {
            first_vertex,
            vertex_count,
        });
    }

    fn draw_quad(&mut self, vertices: &[Vertex; 4]) {
        self.record_draw(DrawKind::Quad(*vertices));
    }

    fn reset_accumulation(&mut self) {
        self.commands.push(Command::ResetAccumulation);
    }

    fn resolve_accumulation(&mut self) {
        self.commands.push(Command::ResolveAccumulation);
    }

    fn draw_translucent_modifier_volumes(&mut self, records: &[ModifierVolumeParam]) {
        self.commands
            .push(Command::TranslucentModifierVolumes(records.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_captures_state() {
        let mut device = RecordingDevice::new();
        let program = device.compile_program(&ShaderVariant::default()).unwrap();
        device.use_program(program);
        device.set_depth_test(true);
        device.set_depth_write(false);
        device.active_texture(1);
        device.bind_texture(Some(BoundTexture::Device(TextureHandle(7))));
        device.draw_strip(3, 4);

        let draws: Vec<_> = device.draws().collect();
        assert_eq!(draws.len(), 1);
        let draw = draws[0];
        assert_eq!(draw.kind, DrawKind::Strip { first: 3, count: 4 });
        assert_eq!(draw.pass(), Some(Pass::Color));
        assert!(!draw.state.writes_depth());
        assert_eq!(
            draw.state.textures[1],
            Some(BoundTexture::Device(TextureHandle(7)))
        );
    }

    #[test]
    fn test_deleted_texture_is_unbound() {
        let mut device = RecordingDevice::new();
        let texture = device.create_color_texture(2, 2).unwrap();
        device.bind_texture(Some(BoundTexture::Device(texture)));
        device.delete_texture(texture);
        assert_eq!(device.state().textures[0], None);
        assert!(device.was_deleted(texture));
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn test_framebuffer_needs_live_attachment() {
        let mut device = RecordingDevice::new();
        let framebuffer = device.create_framebuffer();
        assert!(!device.is_framebuffer_complete(framebuffer), "no attachments");

        let texture = device.create_color_texture(2, 2).unwrap();
        device.attach_color(framebuffer, Some(texture));
        assert!(device.is_framebuffer_complete(framebuffer));

        device.delete_texture(texture);
        assert!(!device.is_framebuffer_complete(framebuffer), "dangling attachment");
    }

    #[test]
    fn test_rgba_size_checked() {
        let mut device = RecordingDevice::new();
        assert!(device.create_texture_from_rgba(2, 2, &[0; 16]).is_ok());
        assert!(device.create_texture_from_rgba(2, 2, &[0; 15]).is_err());
    }
}
