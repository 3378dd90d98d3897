//! Render pipelines, keyed by the fixed-function state they bake in.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use pvr2_core::{BlendState, CompareFunction, CullFace, StencilOp, StencilOps, Vertex};

use super::conversions::IntoWgpu;
use super::shader::capture_errors;
use super::textures::{
    ACCUM_FORMAT, COLOR_FORMAT, DEPTH_STENCIL_FORMAT, REVEAL_FORMAT, STENCIL_SNAPSHOT_FORMAT,
};
use crate::device::ProgramHandle;
use crate::error::{RenderError, RenderResult};
use crate::uniforms::FrameUniforms;

/// Per-draw uniform block (must match the WGSL `Uniforms` struct).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct GpuUniforms {
    pub frame: FrameUniforms,
    pub clip_test: [f32; 4],
    pub trilinear_alpha: f32,
    pub palette_index: f32,
    pub lod_bias: [f32; 2],
    pub poly_number: u32,
    pub tsp0: u32,
    pub tsp1: u32,
    pub tcw0: u32,
}

pub(crate) const UNIFORMS_SIZE: u64 = std::mem::size_of::<GpuUniforms>() as u64;

/// Stencil bits of a shadowed pixel: the polygon's shadow bit and the
/// merged volume bit.
pub(crate) const SHADOW_STENCIL: u32 = 0x81;

/// Vertex input of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum VertexLayout {
    /// Indexed strips from the geometry buffers.
    Strip,
    /// Non-indexed strips from the transient quad buffer.
    Quad,
    /// Position-only triangle lists.
    ModifierVolume,
}

/// Attachments a pipeline renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TargetLayout {
    Framebuffer { color: bool, depth_stencil: bool },
    /// The accumulation and revealage targets.
    Oit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StencilKey {
    pub func: CompareFunction,
    pub ops: StencilOps,
    pub read_mask: u32,
    pub write_mask: u32,
}

impl StencilKey {
    pub const DISABLED: Self = Self {
        func: CompareFunction::Always,
        ops: StencilOps::new(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep),
        read_mask: 0,
        write_mask: 0,
    };
}

/// Everything baked into a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramHandle,
    pub vertex: VertexLayout,
    pub target: TargetLayout,
    pub color_write: bool,
    pub blend: Option<BlendState>,
    /// `None` when the depth test is disabled.
    pub depth: Option<(CompareFunction, bool)>,
    pub stencil: StencilKey,
    pub cull: CullFace,
}

const STRIP_ATTRIBUTES: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Unorm8x4,
    2 => Unorm8x4,
    3 => Float32x2,
    4 => Unorm8x4,
    5 => Unorm8x4,
    6 => Float32x2,
];

const MODVOL_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(UNIFORMS_SIZE),
        },
        count: None,
    }
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    targets: &[Option<wgpu::ColorTargetState>],
    depth_stencil: Option<wgpu::DepthStencilState>,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Layouts and the fixed pipelines of the device.
pub(crate) struct PipelineLayouts {
    pub uniforms: wgpu::BindGroupLayout,
    pub textures: wgpu::BindGroupLayout,
    pub polygon: wgpu::PipelineLayout,
    pub depth_blit_layout: wgpu::BindGroupLayout,
    pub depth_blit: wgpu::RenderPipeline,
    pub resolve_layout: wgpu::BindGroupLayout,
    pub resolve: wgpu::RenderPipeline,
    pub stencil_snapshot: wgpu::RenderPipeline,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> RenderResult<Self> {
        capture_errors(device, || Self::create(device))
            .map_err(|error| RenderError::PipelineCreationFailed(format!("fixed pipelines: {error}")))
    }

    fn create(device: &wgpu::Device) -> Self {
        let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pvr2 uniforms layout"),
            entries: &[uniform_entry(0)],
        });
        let float = wgpu::TextureSampleType::Float { filterable: true };
        // depth is sampled through float bindings, GLSL only offers shadow
        // samplers for depth texture bindings
        let unfilterable = wgpu::TextureSampleType::Float { filterable: false };
        let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pvr2 textures layout"),
            entries: &[
                texture_entry(0, float),
                sampler_entry(1),
                texture_entry(2, float),
                sampler_entry(3),
                texture_entry(4, unfilterable),
                texture_entry(5, wgpu::TextureSampleType::Uint),
            ],
        });
        let polygon = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pvr2 polygon layout"),
            bind_group_layouts: &[&uniforms, &textures],
            push_constant_ranges: &[],
        });

        let depth_blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("depth blit layout"),
            entries: &[texture_entry(0, unfilterable)],
        });
        let depth_blit = fullscreen_pipeline(
            device,
            "depth blit",
            super::shader::DEPTH_BLIT,
            &[&depth_blit_layout],
            &[],
            Some(wgpu::DepthStencilState {
                format: DEPTH_STENCIL_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
        );

        let resolve_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("resolve layout"),
            entries: &[
                texture_entry(0, unfilterable),
                texture_entry(1, unfilterable),
                texture_entry(2, unfilterable),
            ],
        });
        let resolve = fullscreen_pipeline(
            device,
            "accumulation resolve",
            super::shader::RESOLVE,
            &[&resolve_layout],
            &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            None,
        );

        let shadowed = wgpu::StencilFaceState {
            compare: wgpu::CompareFunction::Equal,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Keep,
        };
        let stencil_snapshot = fullscreen_pipeline(
            device,
            "stencil snapshot",
            super::shader::STENCIL_SNAPSHOT,
            &[],
            &[Some(wgpu::ColorTargetState {
                format: STENCIL_SNAPSHOT_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            Some(wgpu::DepthStencilState {
                format: DEPTH_STENCIL_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState {
                    front: shadowed,
                    back: shadowed,
                    read_mask: SHADOW_STENCIL,
                    write_mask: 0,
                },
                bias: wgpu::DepthBiasState::default(),
            }),
        );

        Self {
            uniforms,
            textures,
            polygon,
            depth_blit_layout,
            depth_blit,
            resolve_layout,
            resolve,
            stencil_snapshot,
        }
    }
}

fn stencil_face(key: &StencilKey) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: key.func.into_wgpu(),
        fail_op: key.ops.fail.into_wgpu(),
        depth_fail_op: key.ops.depth_fail.into_wgpu(),
        pass_op: key.ops.pass.into_wgpu(),
    }
}

/// Builds the pipeline described by `key` for a compiled program.
pub(crate) fn create_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    module: &wgpu::ShaderModule,
    fragment_entry: &str,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let strip_buffers = [wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &STRIP_ATTRIBUTES,
    }];
    let modvol_buffers = [wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &MODVOL_ATTRIBUTES,
    }];
    let (buffers, topology, strip_index_format): (&[wgpu::VertexBufferLayout], _, _) =
        match key.vertex {
            VertexLayout::Strip => (
                &strip_buffers[..],
                wgpu::PrimitiveTopology::TriangleStrip,
                Some(wgpu::IndexFormat::Uint32),
            ),
            VertexLayout::Quad => (&strip_buffers[..], wgpu::PrimitiveTopology::TriangleStrip, None),
            VertexLayout::ModifierVolume => {
                (&modvol_buffers[..], wgpu::PrimitiveTopology::TriangleList, None)
            }
        };

    let write_mask = if key.color_write {
        wgpu::ColorWrites::ALL
    } else {
        wgpu::ColorWrites::empty()
    };
    let oit_targets = [
        Some(wgpu::ColorTargetState {
            format: ACCUM_FORMAT,
            blend: Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            }),
            write_mask: wgpu::ColorWrites::ALL,
        }),
        Some(wgpu::ColorTargetState {
            format: REVEAL_FORMAT,
            blend: Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::OneMinusSrc,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::REPLACE,
            }),
            write_mask: wgpu::ColorWrites::RED,
        }),
    ];
    let color_target = [Some(wgpu::ColorTargetState {
        format: COLOR_FORMAT,
        blend: key.blend.map(|blend| blend.into_wgpu()),
        write_mask,
    })];

    let (targets, has_depth): (&[Option<wgpu::ColorTargetState>], bool) = match key.target {
        TargetLayout::Oit => (&oit_targets[..], false),
        TargetLayout::Framebuffer {
            color,
            depth_stencil,
        } => (if color { &color_target[..] } else { &[] }, depth_stencil),
    };

    let depth_stencil = has_depth.then(|| {
        let (depth_compare, depth_write_enabled) = key
            .depth
            .map_or((wgpu::CompareFunction::Always, false), |(func, write)| {
                (func.into_wgpu(), write)
            });
        let face = stencil_face(&key.stencil);
        wgpu::DepthStencilState {
            format: DEPTH_STENCIL_FORMAT,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState {
                front: face,
                back: face,
                read_mask: key.stencil.read_mask,
                write_mask: key.stencil.write_mask,
            },
            bias: wgpu::DepthBiasState::default(),
        }
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("pvr2 polygon pipeline"),
        layout: Some(&layouts.polygon),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fragment_entry),
            targets,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: key.cull.into_wgpu(),
            ..wgpu::PrimitiveState::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_size() {
        // FrameUniforms, clip rect, four scalars, four words
        assert_eq!(UNIFORMS_SIZE, 176);
        assert!(UNIFORMS_SIZE <= 256, "one draw fits one dynamic offset step");
    }
}
