//! Deferred device operations and their encoding into wgpu passes.
//!
//! Calls on [`WgpuDevice`] only record operations. [`WgpuDevice::flush`]
//! encodes them in order, merging consecutive draws into the same
//! attachments into one render pass.

use std::collections::HashMap;

use pvr2_core::{ClipRect, TextureId};

use super::conversions::SamplerKey;
use super::pipelines::{PipelineKey, SHADOW_STENCIL, UNIFORMS_SIZE};
use super::textures::{GpuTexture, TextureKind};
use super::WgpuDevice;
use crate::device::{ClearValues, TextureHandle};

/// Attachments of a framebuffer at the time an operation was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Attachments {
    pub color: Option<TextureHandle>,
    pub depth_stencil: Option<TextureHandle>,
}

impl Attachments {
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.depth_stencil.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DrawTarget {
    Framebuffer(Attachments),
    Oit,
}

/// Texture source of a sampled unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum UnitSource {
    Placeholder,
    Cache(TextureId),
    Device(TextureHandle),
}

/// Everything bind group 1 of a draw refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BindingKey {
    pub textures: [(UnitSource, SamplerKey); 2],
    /// Depth view sampled by translucent fragments.
    pub depth: Option<TextureHandle>,
    /// Depth/stencil texture whose stencil snapshot is sampled.
    pub stencil: Option<TextureHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Geometry {
    Strip { first: u32, count: u32 },
    Triangles { first: u32, count: u32 },
    Quad { first: u32 },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DrawOp {
    pub target: DrawTarget,
    pub pipeline: PipelineKey,
    pub stencil_reference: u32,
    pub scissor: Option<ClipRect>,
    /// Index into the flush's uniform blocks.
    pub uniforms: u32,
    pub bindings: BindingKey,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Op {
    Clear {
        target: Attachments,
        values: ClearValues,
    },
    Draw(DrawOp),
    /// Depth copy between two depth/stencil textures.
    BlitDepth {
        src: TextureHandle,
        dst: TextureHandle,
    },
    SnapshotStencil(TextureHandle),
    /// Composite of the translucency accumulation over `background` into `target`.
    Resolve {
        target: TextureHandle,
        background: UnitSource,
    },
    ClearAccumulation,
}

fn clear_color(values: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(values[0]),
        g: f64::from(values[1]),
        b: f64::from(values[2]),
        a: f64::from(values[3]),
    }
}

fn load<T>(clear: Option<T>) -> wgpu::LoadOp<T> {
    clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear)
}

/// Intersects `rect` with the target, `None` when nothing is left.
fn clamp_scissor(rect: Option<ClipRect>, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let Some(rect) = rect else {
        return Some((0, 0, width, height));
    };
    let x0 = rect.x.clamp(0, width as i32);
    let y0 = rect.y.clamp(0, height as i32);
    let x1 = (rect.x + rect.width).clamp(0, width as i32);
    let y1 = (rect.y + rect.height).clamp(0, height as i32);
    (x1 > x0 && y1 > y0).then(|| (x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Bind groups created for one flush.
#[derive(Default)]
struct FlushResources {
    uniforms: Option<wgpu::BindGroup>,
    quad: Option<wgpu::Buffer>,
    draws: HashMap<BindingKey, wgpu::BindGroup>,
    /// Blit and resolve bind groups, by operation index.
    fixed: HashMap<usize, wgpu::BindGroup>,
}

impl WgpuDevice {
    pub(super) fn texture(&self, handle: TextureHandle) -> Option<&GpuTexture> {
        self.textures
            .get(&handle)
            .or_else(|| self.retired.get(&handle))
    }

    fn unit_view(&self, source: UnitSource) -> &wgpu::TextureView {
        let view = match source {
            UnitSource::Placeholder => None,
            UnitSource::Cache(id) => self.cache_textures.get(&id).map(|t| &t.view),
            UnitSource::Device(handle) => self
                .texture(handle)
                .filter(|t| t.kind == TextureKind::Color)
                .map(|t| &t.view),
        };
        view.unwrap_or(&self.placeholders.color)
    }

    fn depth_view(&self, handle: Option<TextureHandle>) -> &wgpu::TextureView {
        handle
            .and_then(|h| self.texture(h))
            .and_then(|t| match t.kind {
                TextureKind::DepthView => Some(&t.view),
                TextureKind::DepthStencil => t.depth_view.as_ref(),
                TextureKind::Color => None,
            })
            .unwrap_or(&self.placeholders.depth)
    }

    fn stencil_view(&self, handle: Option<TextureHandle>) -> &wgpu::TextureView {
        handle
            .and_then(|h| self.snapshots.get(&h))
            .map_or(&self.placeholders.stencil, |s| &s.view)
    }

    fn prepare(&mut self, ops: &[Op]) -> FlushResources {
        use wgpu::util::DeviceExt;

        let mut resources = FlushResources::default();

        if !self.draw_uniforms.is_empty() {
            let align = u64::from(self.device.limits().min_uniform_buffer_offset_alignment);
            let stride = UNIFORMS_SIZE.div_ceil(align) * align;
            let mut bytes = vec![0u8; stride as usize * self.draw_uniforms.len()];
            for (chunk, block) in bytes.chunks_mut(stride as usize).zip(&self.draw_uniforms) {
                chunk[..UNIFORMS_SIZE as usize].copy_from_slice(bytemuck::bytes_of(block));
            }
            let buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("pvr2 draw uniforms"),
                    contents: &bytes,
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            resources.uniforms = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("pvr2 draw uniforms"),
                layout: &self.layouts.uniforms,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(UNIFORMS_SIZE),
                    }),
                }],
            }));
            self.uniform_stride = stride as u32;
        }

        if !self.quad_vertices.is_empty() {
            resources.quad = Some(self.device.create_buffer_init(
                &wgpu::util::BufferInitDescriptor {
                    label: Some("pvr2 quads"),
                    contents: bytemuck::cast_slice(&self.quad_vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                },
            ));
        }

        // samplers first, they need the mutable cache
        for op in ops {
            if let Op::Draw(draw) = op {
                for (_, key) in draw.bindings.textures {
                    self.samplers
                        .entry(key)
                        .or_insert_with(|| self.device.create_sampler(&key.descriptor()));
                }
            }
        }

        for (index, op) in ops.iter().enumerate() {
            match op {
                Op::Draw(draw) if !resources.draws.contains_key(&draw.bindings) => {
                    let group = self.texture_bind_group(&draw.bindings);
                    resources.draws.insert(draw.bindings, group);
                }
                Op::BlitDepth { src, .. } => {
                    let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("depth blit"),
                        layout: &self.layouts.depth_blit_layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(
                                self.depth_view(Some(*src)),
                            ),
                        }],
                    });
                    resources.fixed.insert(index, group);
                }
                Op::Resolve { background, .. } => {
                    if let Some(oit) = &self.oit {
                        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some("accumulation resolve"),
                            layout: &self.layouts.resolve_layout,
                            entries: &[
                                wgpu::BindGroupEntry {
                                    binding: 0,
                                    resource: wgpu::BindingResource::TextureView(
                                        self.unit_view(*background),
                                    ),
                                },
                                wgpu::BindGroupEntry {
                                    binding: 1,
                                    resource: wgpu::BindingResource::TextureView(&oit.accum),
                                },
                                wgpu::BindGroupEntry {
                                    binding: 2,
                                    resource: wgpu::BindingResource::TextureView(&oit.reveal),
                                },
                            ],
                        });
                        resources.fixed.insert(index, group);
                    }
                }
                _ => {}
            }
        }
        resources
    }

    fn texture_bind_group(&self, key: &BindingKey) -> wgpu::BindGroup {
        let [(source0, sampler0), (source1, sampler1)] = key.textures;
        let sampler = |k: &SamplerKey| self.samplers.get(k).unwrap_or(&self.default_sampler);
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pvr2 textures"),
            layout: &self.layouts.textures,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(self.unit_view(source0)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler(&sampler0)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(self.unit_view(source1)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(sampler(&sampler1)),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(self.depth_view(key.depth)),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(self.stencil_view(key.stencil)),
                },
            ],
        })
    }

    /// Encodes and submits every recorded operation.
    pub fn flush(&mut self) {
        if self.ops.is_empty() {
            self.retire();
            return;
        }
        let ops = std::mem::take(&mut self.ops);
        let resources = self.prepare(&ops);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pvr2 frame"),
            });

        let mut index = 0;
        while index < ops.len() {
            match &ops[index] {
                Op::Draw(first) => {
                    let target = first.target;
                    let end = ops[index..]
                        .iter()
                        .position(|op| !matches!(op, Op::Draw(draw) if draw.target == target))
                        .map_or(ops.len(), |n| index + n);
                    self.encode_draws(&mut encoder, target, &ops[index..end], &resources);
                    index = end;
                    continue;
                }
                Op::Clear { target, values } => self.encode_clear(&mut encoder, *target, values),
                Op::BlitDepth { dst, .. } => {
                    if let (Some(group), Some(dst)) = (resources.fixed.get(&index), self.texture(*dst)) {
                        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                            label: Some("depth blit"),
                            color_attachments: &[],
                            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                                view: &dst.view,
                                depth_ops: Some(wgpu::Operations {
                                    load: wgpu::LoadOp::Load,
                                    store: wgpu::StoreOp::Store,
                                }),
                                stencil_ops: Some(wgpu::Operations {
                                    load: wgpu::LoadOp::Load,
                                    store: wgpu::StoreOp::Store,
                                }),
                            }),
                            timestamp_writes: None,
                            occlusion_query_set: None,
                        });
                        pass.set_pipeline(&self.layouts.depth_blit);
                        pass.set_bind_group(0, group, &[]);
                        pass.draw(0..3, 0..1);
                    }
                }
                Op::SnapshotStencil(handle) => {
                    let source = self
                        .texture(*handle)
                        .filter(|t| t.kind == TextureKind::DepthStencil);
                    if let (Some(snapshot), Some(source)) = (self.snapshots.get(handle), source) {
                        snapshot.capture(
                            &mut encoder,
                            &source.view,
                            &self.layouts.stencil_snapshot,
                            SHADOW_STENCIL,
                        );
                    }
                }
                Op::Resolve { target, .. } => {
                    if let (Some(group), Some(target)) = (resources.fixed.get(&index), self.texture(*target)) {
                        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                            label: Some("accumulation resolve"),
                            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                view: &target.view,
                                depth_slice: None,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: wgpu::LoadOp::Load,
                                    store: wgpu::StoreOp::Store,
                                },
                            })],
                            depth_stencil_attachment: None,
                            timestamp_writes: None,
                            occlusion_query_set: None,
                        });
                        pass.set_pipeline(&self.layouts.resolve);
                        pass.set_bind_group(0, group, &[]);
                        pass.draw(0..3, 0..1);
                    }
                }
                Op::ClearAccumulation => {
                    if let Some(oit) = &self.oit {
                        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                            label: Some("accumulation clear"),
                            color_attachments: &[
                                Some(wgpu::RenderPassColorAttachment {
                                    view: &oit.accum,
                                    depth_slice: None,
                                    resolve_target: None,
                                    ops: wgpu::Operations {
                                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                                        store: wgpu::StoreOp::Store,
                                    },
                                }),
                                Some(wgpu::RenderPassColorAttachment {
                                    view: &oit.reveal,
                                    depth_slice: None,
                                    resolve_target: None,
                                    ops: wgpu::Operations {
                                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                                        store: wgpu::StoreOp::Store,
                                    },
                                }),
                            ],
                            depth_stencil_attachment: None,
                            timestamp_writes: None,
                            occlusion_query_set: None,
                        });
                    }
                }
            }
            index += 1;
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.retire();
    }

    /// Drops per-flush data and resources deleted while operations were pending.
    fn retire(&mut self) {
        self.draw_uniforms.clear();
        self.quad_vertices.clear();
        self.retired.clear();
        for handle in self.retired_snapshots.drain(..) {
            self.snapshots.remove(&handle);
        }
    }

    fn encode_clear(&self, encoder: &mut wgpu::CommandEncoder, target: Attachments, values: &ClearValues) {
        let color = target.color.and_then(|h| self.texture(h));
        let depth = target.depth_stencil.and_then(|h| self.texture(h));
        if color.is_none() && depth.is_none() {
            return;
        }
        let color_attachment = color.map(|texture| wgpu::RenderPassColorAttachment {
            view: &texture.view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: load(values.color.map(clear_color)),
                store: wgpu::StoreOp::Store,
            },
        });
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("pvr2 clear"),
            color_attachments: &color_attachment.into_iter().map(Some).collect::<Vec<_>>(),
            depth_stencil_attachment: depth.map(|texture| wgpu::RenderPassDepthStencilAttachment {
                view: &texture.view,
                depth_ops: Some(wgpu::Operations {
                    load: load(values.depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: load(values.stencil),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn encode_draws(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: DrawTarget,
        ops: &[Op],
        resources: &FlushResources,
    ) {
        let Some(uniforms) = &resources.uniforms else {
            return;
        };

        let (color_attachments, depth, size) = match target {
            DrawTarget::Oit => {
                let Some(oit) = &self.oit else {
                    return;
                };
                let attachment = |view| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })
                };
                (
                    vec![attachment(&oit.accum), attachment(&oit.reveal)],
                    None,
                    (oit.width, oit.height),
                )
            }
            DrawTarget::Framebuffer(attachments) => {
                let color = attachments.color.and_then(|h| self.texture(h));
                let depth = attachments.depth_stencil.and_then(|h| self.texture(h));
                let Some(size) = color.or(depth).map(|t| (t.width, t.height)) else {
                    return;
                };
                let color = color.map(|texture| wgpu::RenderPassColorAttachment {
                    view: &texture.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                });
                (color.into_iter().map(Some).collect(), depth, size)
            }
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("pvr2 draws"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth.map(|texture| wgpu::RenderPassDepthStencilAttachment {
                view: &texture.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for op in ops {
            let Op::Draw(draw) = op else {
                continue;
            };
            let (Some(pipeline), Some(textures)) = (
                self.pipelines.get(&draw.pipeline),
                resources.draws.get(&draw.bindings),
            ) else {
                continue;
            };
            let Some((x, y, w, h)) = clamp_scissor(draw.scissor, size.0, size.1) else {
                continue;
            };

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, uniforms, &[draw.uniforms * self.uniform_stride]);
            pass.set_bind_group(1, textures, &[]);
            pass.set_stencil_reference(draw.stencil_reference & 0xFF);
            pass.set_scissor_rect(x, y, w, h);

            match draw.geometry {
                Geometry::Strip { first, count } => {
                    if let Some(geometry) = &self.geometry {
                        pass.set_vertex_buffer(0, geometry.vertices.slice(..));
                        pass.set_index_buffer(geometry.indices.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(first..first + count, 0, 0..1);
                    }
                }
                Geometry::Triangles { first, count } => {
                    if let Some(buffer) = &self.modvol_buffer {
                        pass.set_vertex_buffer(0, buffer.slice(..));
                        pass.draw(first..first + count, 0..1);
                    }
                }
                Geometry::Quad { first } => {
                    if let Some(buffer) = &resources.quad {
                        pass.set_vertex_buffer(0, buffer.slice(..));
                        pass.draw(first..first + 4, 0..1);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_scissor() {
        assert_eq!(clamp_scissor(None, 640, 480), Some((0, 0, 640, 480)));
        let rect = ClipRect::new(-10, 20, 100, 1000);
        assert_eq!(clamp_scissor(Some(rect), 640, 480), Some((0, 20, 90, 460)));
        let outside = ClipRect::new(700, 0, 32, 32);
        assert_eq!(clamp_scissor(Some(outside), 640, 480), None, "fully clipped draws are dropped");
    }
}
