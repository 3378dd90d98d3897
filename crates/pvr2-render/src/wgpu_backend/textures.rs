//! GPU textures owned by [`super::WgpuDevice`].

pub(crate) const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub(crate) const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Depth24PlusStencil8;
pub(crate) const ACCUM_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub(crate) const REVEAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;
pub(crate) const STENCIL_SNAPSHOT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Uint;
const PLACEHOLDER_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextureKind {
    /// RGBA8, attachable and sampled.
    Color,
    DepthStencil,
    /// Depth aspect view of a depth/stencil texture.
    DepthView,
}

pub(crate) struct GpuTexture {
    pub kind: TextureKind,
    /// `None` for views, which share their parent's texture.
    pub texture: Option<wgpu::Texture>,
    /// Full view for color textures; the attachment view for depth/stencil.
    pub view: wgpu::TextureView,
    /// Depth-only view of depth/stencil textures, sampled by the depth blit.
    pub depth_view: Option<wgpu::TextureView>,
    pub width: u32,
    pub height: u32,
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    }
}

fn create_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

pub(crate) fn depth_only_view(texture: &wgpu::Texture) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("depth only view"),
        aspect: wgpu::TextureAspect::DepthOnly,
        ..Default::default()
    })
}

impl GpuTexture {
    pub fn color(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = create_texture(
            device,
            "pvr2 color",
            width,
            height,
            COLOR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            kind: TextureKind::Color,
            texture: Some(texture),
            view,
            depth_view: None,
            width,
            height,
        }
    }

    pub fn depth_stencil(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = create_texture(
            device,
            "pvr2 depth/stencil",
            width,
            height,
            DEPTH_STENCIL_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth_only_view(&texture);
        Self {
            kind: TextureKind::DepthStencil,
            texture: Some(texture),
            view,
            depth_view: Some(depth_view),
            width,
            height,
        }
    }

    /// A sampled view of the depth aspect of `parent`.
    pub fn depth_view_of(parent: &Self) -> Option<Self> {
        let texture = parent.texture.as_ref()?;
        (parent.kind == TextureKind::DepthStencil).then(|| Self {
            kind: TextureKind::DepthView,
            texture: None,
            view: depth_only_view(texture),
            depth_view: None,
            width: parent.width,
            height: parent.height,
        })
    }

    /// Uploads tightly packed RGBA8 pixels into a new sampled texture.
    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Self {
        let texture = Self::color(device, width, height);
        if let Some(gpu) = &texture.texture {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: gpu,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                rgba,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                extent(width, height),
            );
        }
        texture
    }
}

/// Shadow mask of a depth/stencil texture, sampled by the color pass.
///
/// Rendered with a stencil test rather than copied: stencil aspects cannot
/// be copied out on every backend.
pub(crate) struct StencilSnapshot {
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl StencilSnapshot {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = create_texture(
            device,
            "stencil snapshot",
            width,
            height,
            STENCIL_SNAPSHOT_FORMAT,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        Self {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            width,
            height,
        }
    }

    /// Records the pass marking the pixels of `source` whose stencil holds
    /// `reference` under the pipeline's read mask.
    pub fn capture(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        reference: u32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("stencil snapshot"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            // read-only, the target keeps its depth and stencil
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: source,
                depth_ops: None,
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_stencil_reference(reference);
        pass.draw(0..3, 0..1);
    }
}

/// Weighted blended translucency targets.
pub(crate) struct OitTargets {
    pub accum: wgpu::TextureView,
    pub reveal: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl OitTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let accum = create_texture(device, "oit accum", width, height, ACCUM_FORMAT, usage);
        let reveal = create_texture(device, "oit reveal", width, height, REVEAL_FORMAT, usage);
        Self {
            accum: accum.create_view(&wgpu::TextureViewDescriptor::default()),
            reveal: reveal.create_view(&wgpu::TextureViewDescriptor::default()),
            width,
            height,
        }
    }
}

/// 1x1 textures bound to units without a texture.
pub(crate) struct Placeholders {
    pub color: wgpu::TextureView,
    pub depth: wgpu::TextureView,
    pub stencil: wgpu::TextureView,
}

impl Placeholders {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let color = GpuTexture::from_rgba(device, queue, 1, 1, &[255; 4]);
        let depth = create_texture(
            device,
            "placeholder depth",
            1,
            1,
            PLACEHOLDER_DEPTH_FORMAT,
            wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let stencil = create_texture(
            device,
            "placeholder stencil",
            1,
            1,
            STENCIL_SNAPSHOT_FORMAT,
            wgpu::TextureUsages::TEXTURE_BINDING,
        );
        Self {
            color: color.view,
            depth: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            stencil: stencil.create_view(&wgpu::TextureViewDescriptor::default()),
        }
    }
}

/// Row pitch for texture/buffer copies.
pub(crate) fn aligned_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unaligned = width.max(1) * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(aligned_bytes_per_row(1, 4), 256);
        assert_eq!(aligned_bytes_per_row(64, 4), 256);
        assert_eq!(aligned_bytes_per_row(65, 4), 512);
        assert_eq!(aligned_bytes_per_row(640, 1), 768);
    }
}
