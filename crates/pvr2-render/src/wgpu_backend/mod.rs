//! Headless wgpu implementation of [`GraphicsDevice`].
//!
//! State-machine calls are recorded as operations and encoded on
//! [`WgpuDevice::flush`]. Pipelines are created when a draw is recorded,
//! keyed by the fixed-function state they bake in.
//!
//! Sorted translucency is approximated with weighted blended accumulation.
//! Translucent modifier volumes need per-fragment lists and are not drawn:
//! a warning is logged once per device, and shadows from those volumes are
//! missing from the output.

mod conversions;
mod ops;
mod pipelines;
mod shader;
mod textures;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pvr2_core::{
    BlendState, ClipRect, CompareFunction, CullFace, DeviceCaps, ModVolVertex,
    ModifierVolumeParam, Pass, SamplerState, ShaderVariant, StencilOp, StencilOps, TextureId,
    Vertex,
};

use self::conversions::SamplerKey;
use self::ops::{Attachments, BindingKey, DrawOp, DrawTarget, Geometry, Op, UnitSource};
use self::pipelines::{
    create_pipeline, GpuUniforms, PipelineKey, PipelineLayouts, StencilKey, TargetLayout,
    VertexLayout,
};
use self::shader::{capture_errors, fragment_entry, ShaderBuilder, ShaderProgram};
use self::textures::{
    aligned_bytes_per_row, GpuTexture, OitTargets, Placeholders, StencilSnapshot, TextureKind,
};
use crate::device::{
    BoundTexture, ClearValues, FramebufferHandle, GraphicsDevice, ProgramHandle, TextureHandle,
    VertexArray, DEPTH_UNIT, STENCIL_UNIT, TEXTURE_UNITS,
};
use crate::error::{RenderError, RenderResult};
use crate::uniforms::{FrameUniforms, ShaderUniforms};

/// What a texture unit holds, resolved at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitBinding {
    Cache(TextureId),
    Device(TextureHandle),
    /// The stencil snapshot of a depth/stencil texture.
    Stencil(TextureHandle),
}

#[derive(Debug, Clone, Copy)]
struct State {
    framebuffer: Option<FramebufferHandle>,
    program: Option<ProgramHandle>,
    uniforms: ShaderUniforms,
    frame: FrameUniforms,
    clip_test: [f32; 4],
    color_write: bool,
    blend: Option<BlendState>,
    scissor: Option<ClipRect>,
    depth_test: bool,
    depth_func: CompareFunction,
    depth_write: bool,
    stencil_test: bool,
    stencil_func: (CompareFunction, u32, u32),
    stencil_ops: StencilOps,
    stencil_write_mask: u32,
    cull: CullFace,
    active_unit: u32,
    units: [Option<UnitBinding>; TEXTURE_UNITS as usize],
    samplers: [Option<SamplerState>; TEXTURE_UNITS as usize],
    vertex_array: VertexArray,
}

impl Default for State {
    fn default() -> Self {
        Self {
            framebuffer: None,
            program: None,
            uniforms: ShaderUniforms::default(),
            frame: FrameUniforms::default(),
            clip_test: [0.0; 4],
            color_write: true,
            blend: None,
            scissor: None,
            depth_test: false,
            depth_func: CompareFunction::Less,
            depth_write: true,
            stencil_test: false,
            stencil_func: (CompareFunction::Always, 0, u32::MAX),
            stencil_ops: StencilOps::new(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep),
            stencil_write_mask: u32::MAX,
            cull: CullFace::None,
            active_unit: 0,
            units: [None; TEXTURE_UNITS as usize],
            samplers: [None; TEXTURE_UNITS as usize],
            vertex_array: VertexArray::Main,
        }
    }
}

struct GeometryBuffers {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

/// A [`GraphicsDevice`] rendering offscreen with wgpu.
///
/// Limitations against the hardware:
///
/// * Autosorted translucency is order-independent blending, not an exact
///   per-pixel sort.
/// * [`GraphicsDevice::draw_translucent_modifier_volumes`] is a no-op that
///   warns once. Translucent polygons inside those volumes keep their
///   unshadowed parameters.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: DeviceCaps,
    layouts: PipelineLayouts,
    placeholders: Placeholders,
    default_sampler: wgpu::Sampler,

    state: State,
    next_handle: u32,
    textures: HashMap<TextureHandle, GpuTexture>,
    /// Deleted while operations referring to them were pending.
    retired: HashMap<TextureHandle, GpuTexture>,
    cache_textures: HashMap<TextureId, GpuTexture>,
    snapshots: HashMap<TextureHandle, StencilSnapshot>,
    retired_snapshots: Vec<TextureHandle>,
    framebuffers: HashMap<FramebufferHandle, Attachments>,
    programs: Vec<ShaderProgram>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    /// Rejected by the backend, their draws are dropped.
    failed_pipelines: HashSet<PipelineKey>,
    samplers: HashMap<SamplerKey, wgpu::Sampler>,
    geometry: Option<GeometryBuffers>,
    modvol_buffer: Option<wgpu::Buffer>,
    oit: Option<OitTargets>,

    ops: Vec<Op>,
    draw_uniforms: Vec<GpuUniforms>,
    quad_vertices: Vec<Vertex>,
    uniform_stride: u32,

    warned_missing_textures: Vec<TextureId>,
    warned_translucent_modvols: bool,
}

impl WgpuDevice {
    /// Creates a device on the best available adapter, without a surface.
    pub async fn new_headless() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("pvr2 device (headless)"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?;

        let anisotropic = adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::ANISOTROPIC_FILTERING);
        let caps = DeviceCaps {
            max_anisotropy: if anisotropic { 16 } else { 1 },
        };
        log::info!(
            "wgpu device on {} ({:?}), max anisotropy {}",
            adapter.get_info().name,
            adapter.get_info().backend,
            caps.max_anisotropy
        );

        Self::from_device(device, queue, caps)
    }

    /// Wraps an existing device and queue.
    ///
    /// Fails when the backend rejects one of the fixed pipelines.
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        caps: DeviceCaps,
    ) -> RenderResult<Self> {
        device.on_uncaptured_error(Arc::new(|e: wgpu::Error| {
            log::error!("wgpu uncaptured error: {e}");
        }));
        let layouts = PipelineLayouts::new(&device)?;
        let placeholders = Placeholders::new(&device, &queue);
        let default_sampler = device.create_sampler(&SamplerKey::default().descriptor());
        Ok(Self {
            device,
            queue,
            caps,
            layouts,
            placeholders,
            default_sampler,
            state: State::default(),
            next_handle: 1,
            textures: HashMap::new(),
            retired: HashMap::new(),
            cache_textures: HashMap::new(),
            snapshots: HashMap::new(),
            retired_snapshots: Vec::new(),
            framebuffers: HashMap::new(),
            programs: Vec::new(),
            pipelines: HashMap::new(),
            failed_pipelines: HashSet::new(),
            samplers: HashMap::new(),
            geometry: None,
            modvol_buffer: None,
            oit: None,
            ops: Vec::new(),
            draw_uniforms: Vec::new(),
            quad_vertices: Vec::new(),
            uniform_stride: 256,
            warned_missing_textures: Vec::new(),
            warned_translucent_modvols: false,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Uploads the decoded pixels of a texture cache entry.
    pub fn register_texture(
        &mut self,
        id: TextureId,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> RenderResult<()> {
        check_rgba_len(width, height, rgba)?;
        if self.cache_textures.contains_key(&id) {
            // pending draws sample the previous contents
            self.flush();
        }
        let texture = GpuTexture::from_rgba(&self.device, &self.queue, width, height, rgba);
        self.cache_textures.insert(id, texture);
        self.warned_missing_textures.retain(|missing| *missing != id);
        Ok(())
    }

    /// Creates a framebuffer with a single color attachment to render a frame into.
    pub fn create_output_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> RenderResult<FramebufferHandle> {
        let color = self.create_color_texture(width, height)?;
        let framebuffer = self.create_framebuffer();
        self.attach_color(framebuffer, Some(color));
        Ok(framebuffer)
    }

    /// Flushes pending work and reads back the color attachment of
    /// `framebuffer` as tightly packed RGBA8 rows.
    pub fn read_output(&mut self, framebuffer: FramebufferHandle) -> RenderResult<Vec<u8>> {
        self.flush();

        let color = self
            .framebuffers
            .get(&framebuffer)
            .and_then(|attachments| attachments.color)
            .and_then(|handle| self.textures.get(&handle))
            .ok_or(RenderError::FramebufferIncomplete("output"))?;
        let Some(texture) = &color.texture else {
            return Err(RenderError::FramebufferIncomplete("output"));
        };
        let (width, height) = (color.width.max(1), color.height.max(1));

        let bytes_per_row = aligned_bytes_per_row(width, 4);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output readback"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("output readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|err| RenderError::ReadbackFailed(err.to_string()))?;
        rx.recv()
            .map_err(|_| RenderError::Timeout)?
            .map_err(|err| RenderError::ReadbackFailed(err.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let row_bytes = (width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(bytes_per_row as usize).take(height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }
        drop(data);
        buffer.unmap();
        Ok(pixels)
    }

    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn insert_texture(&mut self, texture: GpuTexture) -> TextureHandle {
        let handle = TextureHandle(self.allocate_handle());
        self.textures.insert(handle, texture);
        handle
    }

    fn bound_attachments(&self) -> Attachments {
        self.state
            .framebuffer
            .and_then(|fb| self.framebuffers.get(&fb).copied())
            .unwrap_or_default()
    }

    fn attachment_size(&self, attachments: Attachments) -> Option<(u32, u32)> {
        attachments
            .color
            .or(attachments.depth_stencil)
            .and_then(|handle| self.textures.get(&handle))
            .map(|texture| (texture.width, texture.height))
    }

    fn ensure_oit(&mut self, width: u32, height: u32) {
        match &self.oit {
            Some(oit) if oit.width == width && oit.height == height => {}
            Some(_) => {
                self.flush();
                self.oit = Some(OitTargets::new(&self.device, width, height));
                self.ops.push(Op::ClearAccumulation);
            }
            None => {
                self.oit = Some(OitTargets::new(&self.device, width, height));
                self.ops.push(Op::ClearAccumulation);
            }
        }
    }

    fn unit_source(&self, unit: u32) -> UnitSource {
        match self.state.units[unit as usize] {
            Some(UnitBinding::Cache(id)) => UnitSource::Cache(id),
            Some(UnitBinding::Device(handle)) => UnitSource::Device(handle),
            Some(UnitBinding::Stencil(_)) | None => UnitSource::Placeholder,
        }
    }

    fn warn_missing_texture(&mut self, source: UnitSource) {
        if let UnitSource::Cache(id) = source {
            if !self.cache_textures.contains_key(&id) && !self.warned_missing_textures.contains(&id)
            {
                log::warn!("texture {id:?} was never registered, sampling a placeholder");
                self.warned_missing_textures.push(id);
            }
        }
    }

    fn binding_key(&mut self, variant: Option<&ShaderVariant>) -> BindingKey {
        let textured = variant.is_some_and(|v| v.texture);
        let texture = |device: &Self, unit: u32| {
            let source = if textured {
                device.unit_source(unit)
            } else {
                UnitSource::Placeholder
            };
            let sampler = device.state.samplers[unit as usize]
                .as_ref()
                .map(SamplerKey::from)
                .unwrap_or_default();
            (source, sampler)
        };
        let textures = [texture(self, 0), texture(self, 1)];
        for (source, _) in textures {
            self.warn_missing_texture(source);
        }

        let pass = variant.map(|v| v.pass);
        let depth = match self.state.units[DEPTH_UNIT as usize] {
            Some(UnitBinding::Device(handle)) if pass == Some(Pass::Oit) => Some(handle),
            _ => None,
        };
        let stencil = match self.state.units[STENCIL_UNIT as usize] {
            Some(UnitBinding::Stencil(handle)) if pass == Some(Pass::Color) => Some(handle),
            _ => None,
        };
        BindingKey {
            textures,
            depth,
            stencil,
        }
    }

    fn record_draw(&mut self, vertex: VertexLayout, geometry: Geometry) {
        let Some(program) = self.state.program else {
            log::warn!("draw without a program");
            return;
        };
        let Some(variant) = self
            .programs
            .get((program.0 as usize).wrapping_sub(1))
            .map(|compiled| compiled.variant)
        else {
            log::warn!("draw with unknown program {program:?}");
            return;
        };

        let attachments = self.bound_attachments();
        let Some((width, height)) = self.attachment_size(attachments) else {
            log::warn!("draw without a bound framebuffer");
            return;
        };
        let oit = variant.is_some_and(|v| v.pass == Pass::Oit);
        let target = if oit {
            self.ensure_oit(width, height);
            DrawTarget::Oit
        } else {
            DrawTarget::Framebuffer(attachments)
        };

        let state = &self.state;
        let key = if oit {
            PipelineKey {
                program,
                vertex,
                target: TargetLayout::Oit,
                color_write: true,
                blend: None,
                depth: None,
                stencil: StencilKey::DISABLED,
                cull: state.cull,
            }
        } else {
            let depth_stencil = attachments.depth_stencil.is_some();
            PipelineKey {
                program,
                vertex,
                target: TargetLayout::Framebuffer {
                    color: attachments.color.is_some(),
                    depth_stencil,
                },
                color_write: state.color_write,
                blend: state.blend,
                depth: (depth_stencil && state.depth_test)
                    .then_some((state.depth_func, state.depth_write)),
                stencil: if depth_stencil && state.stencil_test {
                    StencilKey {
                        func: state.stencil_func.0,
                        ops: state.stencil_ops,
                        read_mask: state.stencil_func.2 & 0xFF,
                        write_mask: state.stencil_write_mask & 0xFF,
                    }
                } else {
                    StencilKey::DISABLED
                },
                cull: state.cull,
            }
        };

        if !self.pipeline_ready(&key) {
            return;
        }

        let bindings = self.binding_key(variant.as_ref());
        let lod_bias = |unit: usize| self.state.samplers[unit].map_or(0.0, |s| s.lod_bias);
        let uniforms = GpuUniforms {
            frame: self.state.frame,
            clip_test: self.state.clip_test,
            trilinear_alpha: self.state.uniforms.trilinear_alpha,
            palette_index: self.state.uniforms.palette_index,
            lod_bias: [lod_bias(0), lod_bias(1)],
            poly_number: self.state.uniforms.poly_number,
            tsp0: self.state.uniforms.tsp0,
            tsp1: self.state.uniforms.tsp1,
            tcw0: self.state.uniforms.tcw0,
        };
        self.draw_uniforms.push(uniforms);

        self.ops.push(Op::Draw(DrawOp {
            target,
            pipeline: key,
            stencil_reference: self.state.stencil_func.1,
            scissor: self.state.scissor,
            uniforms: (self.draw_uniforms.len() - 1) as u32,
            bindings,
            geometry,
        }));
    }

    /// Creates the pipeline for `key` on first use. Returns false when the
    /// backend rejects it.
    fn pipeline_ready(&mut self, key: &PipelineKey) -> bool {
        if self.pipelines.contains_key(key) {
            return true;
        }
        if self.failed_pipelines.contains(key) {
            return false;
        }
        let Some(compiled) = self.programs.get((key.program.0 as usize).wrapping_sub(1)) else {
            return false;
        };
        let created = capture_errors(&self.device, || {
            create_pipeline(
                &self.device,
                &self.layouts,
                &compiled.module,
                compiled.fragment_entry,
                key,
            )
        });
        match created {
            Ok(pipeline) => {
                self.pipelines.insert(*key, pipeline);
                true
            }
            Err(error) => {
                log::error!("dropping draws with pipeline {key:?}: {error}");
                self.failed_pipelines.insert(*key);
                false
            }
        }
    }

    fn add_program(&mut self, program: ShaderProgram) -> ProgramHandle {
        self.programs.push(program);
        ProgramHandle(self.programs.len() as u32)
    }
}

fn check_rgba_len(width: u32, height: u32, rgba: &[u8]) -> RenderResult<()> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() == expected {
        Ok(())
    } else {
        Err(RenderError::TextureCreationFailed(format!(
            "{width}x{height} needs {expected} bytes, got {}",
            rgba.len()
        )))
    }
}

impl GraphicsDevice for WgpuDevice {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_depth_stencil_texture(
        &mut self,
        width: u32,
        height: u32,
    ) -> RenderResult<TextureHandle> {
        let texture = GpuTexture::depth_stencil(&self.device, width, height);
        Ok(self.insert_texture(texture))
    }

    fn create_depth_view(&mut self, depth_stencil: TextureHandle) -> RenderResult<TextureHandle> {
        let view = self
            .textures
            .get(&depth_stencil)
            .and_then(GpuTexture::depth_view_of)
            .ok_or_else(|| {
                RenderError::TextureCreationFailed(format!(
                    "{depth_stencil:?} is not a depth/stencil texture"
                ))
            })?;
        Ok(self.insert_texture(view))
    }

    fn create_color_texture(&mut self, width: u32, height: u32) -> RenderResult<TextureHandle> {
        let texture = GpuTexture::color(&self.device, width, height);
        Ok(self.insert_texture(texture))
    }

    fn create_texture_from_rgba(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> RenderResult<TextureHandle> {
        check_rgba_len(width, height, rgba)?;
        let texture = GpuTexture::from_rgba(&self.device, &self.queue, width, height, rgba);
        Ok(self.insert_texture(texture))
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        let Some(gpu) = self.textures.remove(&texture) else {
            return;
        };
        for unit in &mut self.state.units {
            if matches!(unit, Some(UnitBinding::Device(h) | UnitBinding::Stencil(h)) if *h == texture)
            {
                *unit = None;
            }
        }
        if self.snapshots.contains_key(&texture) {
            self.retired_snapshots.push(texture);
        }
        self.retired.insert(texture, gpu);
    }

    fn create_framebuffer(&mut self) -> FramebufferHandle {
        let handle = FramebufferHandle(self.allocate_handle());
        self.framebuffers.insert(handle, Attachments::default());
        handle
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer);
        if self.state.framebuffer == Some(framebuffer) {
            self.state.framebuffer = None;
        }
    }

    fn attach_color(&mut self, framebuffer: FramebufferHandle, texture: Option<TextureHandle>) {
        if let Some(attachments) = self.framebuffers.get_mut(&framebuffer) {
            attachments.color = texture;
        }
    }

    fn attach_depth_stencil(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: Option<TextureHandle>,
    ) {
        if let Some(attachments) = self.framebuffers.get_mut(&framebuffer) {
            attachments.depth_stencil = texture;
        }
    }

    fn is_framebuffer_complete(&self, framebuffer: FramebufferHandle) -> bool {
        let Some(attachments) = self.framebuffers.get(&framebuffer) else {
            return false;
        };
        if attachments.is_empty() {
            return false;
        }
        let attached = |handle: Option<TextureHandle>, kind: TextureKind| match handle {
            None => Some(None),
            Some(handle) => self
                .textures
                .get(&handle)
                .filter(|texture| texture.kind == kind)
                .map(|texture| Some((texture.width, texture.height))),
        };
        match (
            attached(attachments.color, TextureKind::Color),
            attached(attachments.depth_stencil, TextureKind::DepthStencil),
        ) {
            (Some(Some(color)), Some(Some(depth))) => color == depth,
            (Some(_), Some(_)) => true,
            _ => false,
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.state.framebuffer = Some(framebuffer);
    }

    fn blit_depth(
        &mut self,
        src: FramebufferHandle,
        dst: FramebufferHandle,
        _width: u32,
        _height: u32,
    ) {
        let depth = |fb| self.framebuffers.get(&fb).and_then(|a| a.depth_stencil);
        match (depth(src), depth(dst)) {
            (Some(src), Some(dst)) if src != dst => self.ops.push(Op::BlitDepth { src, dst }),
            _ => log::warn!("depth blit between {src:?} and {dst:?} skipped, missing depth"),
        }
    }

    fn clear(&mut self, values: ClearValues) {
        let target = self.bound_attachments();
        if !target.is_empty() {
            self.ops.push(Op::Clear { target, values });
        }
    }

    fn compile_program(&mut self, variant: &ShaderVariant) -> RenderResult<ProgramHandle> {
        let module = ShaderBuilder::for_variant(variant).build_module(&self.device)?;
        log::debug!("compiled program variant {:#07x}", variant.key());
        Ok(self.add_program(ShaderProgram {
            module,
            fragment_entry: fragment_entry(variant),
            variant: Some(*variant),
        }))
    }

    fn compile_modifier_volume_program(&mut self) -> RenderResult<ProgramHandle> {
        let module = ShaderBuilder::for_modifier_volumes().build_module(&self.device)?;
        Ok(self.add_program(ShaderProgram {
            module,
            fragment_entry: "fs_main",
            variant: None,
        }))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.state.program = Some(program);
    }

    fn set_uniforms(&mut self, uniforms: &ShaderUniforms) {
        self.state.uniforms = *uniforms;
    }

    fn set_clip_test(&mut self, corners: [f32; 4]) {
        self.state.clip_test = corners;
    }

    fn set_frame_uniforms(&mut self, uniforms: &FrameUniforms) {
        self.state.frame = *uniforms;
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.state.color_write = enabled;
    }

    fn set_blend(&mut self, blend: Option<BlendState>) {
        self.state.blend = blend;
    }

    fn set_scissor(&mut self, rect: Option<ClipRect>) {
        self.state.scissor = rect;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
    }

    fn set_depth_func(&mut self, func: CompareFunction) {
        self.state.depth_func = func;
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.state.depth_write = enabled;
    }

    fn set_stencil_test(&mut self, enabled: bool) {
        self.state.stencil_test = enabled;
    }

    fn set_stencil_func(&mut self, func: CompareFunction, reference: u32, mask: u32) {
        self.state.stencil_func = (func, reference, mask);
    }

    fn set_stencil_op(&mut self, ops: StencilOps) {
        self.state.stencil_ops = ops;
    }

    fn set_stencil_write_mask(&mut self, mask: u32) {
        self.state.stencil_write_mask = mask;
    }

    fn set_cull(&mut self, cull: CullFace) {
        self.state.cull = cull;
    }

    fn active_texture(&mut self, unit: u32) {
        if unit < TEXTURE_UNITS {
            self.state.active_unit = unit;
        } else {
            log::warn!("texture unit {unit} out of range");
        }
    }

    fn bind_texture(&mut self, texture: Option<BoundTexture>) {
        let unit = self.state.active_unit;
        let binding = match texture {
            None => None,
            Some(BoundTexture::Cache(id)) => Some(UnitBinding::Cache(id)),
            Some(BoundTexture::Device(handle)) => {
                let depth_stencil = self
                    .textures
                    .get(&handle)
                    .filter(|texture| texture.kind == TextureKind::DepthStencil)
                    .map(|texture| (texture.width, texture.height));
                match depth_stencil {
                    Some((width, height)) if unit == STENCIL_UNIT => {
                        let stale = self
                            .snapshots
                            .get(&handle)
                            .is_some_and(|s| s.width != width || s.height != height);
                        if stale || !self.snapshots.contains_key(&handle) {
                            let snapshot = StencilSnapshot::new(&self.device, width, height);
                            self.snapshots.insert(handle, snapshot);
                        }
                        self.ops.push(Op::SnapshotStencil(handle));
                        Some(UnitBinding::Stencil(handle))
                    }
                    _ => Some(UnitBinding::Device(handle)),
                }
            }
        };
        self.state.units[unit as usize] = binding;
    }

    fn bind_sampler(&mut self, unit: u32, sampler: Option<SamplerState>) {
        if let Some(slot) = self.state.samplers.get_mut(unit as usize) {
            *slot = sampler;
        }
    }

    fn upload_geometry(&mut self, vertices: &[Vertex], indices: &[u32]) {
        use wgpu::util::DeviceExt;

        if !self.ops.is_empty() {
            self.flush();
        }
        self.geometry = (!vertices.is_empty() && !indices.is_empty()).then(|| GeometryBuffers {
            vertices: self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("pvr2 vertices"),
                    contents: bytemuck::cast_slice(vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
            indices: self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("pvr2 indices"),
                    contents: bytemuck::cast_slice(indices),
                    usage: wgpu::BufferUsages::INDEX,
                }),
        });
    }

    fn upload_modifier_volumes(&mut self, positions: &[ModVolVertex]) {
        use wgpu::util::DeviceExt;

        if !self.ops.is_empty() {
            self.flush();
        }
        self.modvol_buffer = (!positions.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("pvr2 modifier volumes"),
                    contents: bytemuck::cast_slice(positions),
                    usage: wgpu::BufferUsages::VERTEX,
                })
        });
    }

    fn bind_vertex_array(&mut self, array: VertexArray) {
        self.state.vertex_array = array;
    }

    fn draw_strip(&mut self, first: u32, count: u32) {
        if self.state.vertex_array != VertexArray::Main {
            log::warn!("strip draw with the modifier volume vertex array bound");
            return;
        }
        self.record_draw(VertexLayout::Strip, Geometry::Strip { first, count });
    }

    fn draw_triangles(&mut self, first_vertex: u32, vertex_count: u32) {
        self.record_draw(
            VertexLayout::ModifierVolume,
            Geometry::Triangles {
                first: first_vertex,
                count: vertex_count,
            },
        );
    }

    fn draw_quad(&mut self, vertices: &[Vertex; 4]) {
        let first = self.quad_vertices.len() as u32;
        self.quad_vertices.extend_from_slice(vertices);
        self.record_draw(VertexLayout::Quad, Geometry::Quad { first });
    }

    fn reset_accumulation(&mut self) {
        if self.oit.is_some() {
            self.ops.push(Op::ClearAccumulation);
        }
    }

    fn resolve_accumulation(&mut self) {
        let attachments = self.bound_attachments();
        let Some(target) = attachments.color else {
            log::warn!("accumulation resolve without a color attachment");
            return;
        };
        if self.oit.is_none() {
            if let Some((width, height)) = self.attachment_size(attachments) {
                self.ensure_oit(width, height);
            }
        }
        let background = self.unit_source(0);
        self.ops.push(Op::Resolve { target, background });
        self.ops.push(Op::ClearAccumulation);
    }

    fn draw_translucent_modifier_volumes(&mut self, records: &[ModifierVolumeParam]) {
        if !records.is_empty() && !self.warned_translucent_modvols {
            log::warn!("translucent modifier volumes are not supported by the wgpu device");
            self.warned_translucent_modvols = true;
        }
    }
}
