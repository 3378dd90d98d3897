//! WGSL source assembly for the polygon program variants.

use pvr2_core::{Pass, ShaderVariant};

use crate::error::{RenderError, RenderResult};

const COMMON: &str = include_str!("../shaders/common.wgsl");
const POLYGON: &str = include_str!("../shaders/pvr2.wgsl");
const MODIFIER_VOLUME: &str = include_str!("../shaders/modvol.wgsl");
pub(crate) const DEPTH_BLIT: &str = include_str!("../shaders/depth_blit.wgsl");
pub(crate) const RESOLVE: &str = include_str!("../shaders/resolve.wgsl");
pub(crate) const STENCIL_SNAPSHOT: &str = include_str!("../shaders/stencil_snapshot.wgsl");

/// A compiled program and the fragment entry point its pipelines use.
pub(crate) struct ShaderProgram {
    pub module: wgpu::ShaderModule,
    pub fragment_entry: &'static str,
    /// `None` for the modifier volume program.
    pub variant: Option<ShaderVariant>,
}

/// Builder concatenating WGSL pieces into one module.
pub(crate) struct ShaderBuilder {
    sources: Vec<String>,
    label: String,
}

impl ShaderBuilder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            sources: Vec::new(),
            label: label.into(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Prepends the shared uniforms and the constants selecting `variant`.
    pub fn for_variant(variant: &ShaderVariant) -> Self {
        Self::new(format!("pvr2 variant {:#07x}", variant.key()))
            .with_source(variant_prelude(variant))
            .with_source(COMMON)
            .with_source(POLYGON)
    }

    pub fn for_modifier_volumes() -> Self {
        Self::new("pvr2 modifier volumes")
            .with_source(COMMON)
            .with_source(MODIFIER_VOLUME)
    }

    pub fn source(&self) -> String {
        self.sources.join("\n\n")
    }

    /// Creates the module, reporting WGSL validation errors.
    pub fn build_module(self, device: &wgpu::Device) -> RenderResult<wgpu::ShaderModule> {
        if self.sources.is_empty() {
            return Err(RenderError::ShaderCompilationFailed(format!(
                "{}: no source",
                self.label
            )));
        }
        let source = self.source();

        capture_errors(device, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&self.label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })
        .map_err(|error| RenderError::ShaderCompilationFailed(format!("{}: {error}", self.label)))
    }
}

/// Runs `create` under validation and internal error scopes.
///
/// Backend shader translation fails with an internal error, which would
/// otherwise reach the device's uncaptured error handler.
pub(crate) fn capture_errors<T>(
    device: &wgpu::Device,
    create: impl FnOnce() -> T,
) -> Result<T, wgpu::Error> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::Internal);
    let value = create();
    let internal = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());
    match internal.or(validation) {
        Some(error) => Err(error),
        None => Ok(value),
    }
}

/// Fragment entry point of a variant.
pub(crate) fn fragment_entry(variant: &ShaderVariant) -> &'static str {
    match variant.pass {
        Pass::Oit => "fs_oit",
        Pass::Depth | Pass::Color => "fs_main",
    }
}

fn variant_prelude(variant: &ShaderVariant) -> String {
    // flat shading takes the colours of the provoking vertex
    let interpolation = if variant.gouraud {
        ""
    } else {
        "@interpolate(flat) "
    };
    format!(
        "const PASS: u32 = {pass}u;
const ALPHA_TEST: bool = {alpha_test};
const INSIDE_CLIP: bool = {inside_clip};
const TEXTURE: bool = {texture};
const USE_ALPHA: bool = {use_alpha};
const IGNORE_TEX_A: bool = {ignore_tex_a};
const SHADER_INSTR: u32 = {shader_instr}u;
const OFFSET: bool = {offset};
const FOG_CTRL: u32 = {fog_ctrl}u;
const TWO_VOLUMES: bool = {two_volumes};
const BUMP_MAP: bool = {bump_map};
const FOG_CLAMPING: bool = {fog_clamping};
const PALETTE: bool = {palette};

struct VertexOutput {{
    @builtin(position) position: vec4<f32>,
    @location(0) {interpolation}col: vec4<f32>,
    @location(1) {interpolation}spc: vec4<f32>,
    @location(2) {interpolation}col1: vec4<f32>,
    @location(3) {interpolation}spc1: vec4<f32>,
    @location(4) uv: vec2<f32>,
    @location(5) uv1: vec2<f32>,
    @location(6) inv_w: f32,
}}",
        pass = variant.pass as u32,
        alpha_test = variant.alpha_test,
        inside_clip = variant.inside_clip,
        texture = variant.texture,
        use_alpha = variant.use_alpha,
        ignore_tex_a = variant.ignore_tex_a,
        shader_instr = variant.shader_instr,
        offset = variant.offset,
        fog_ctrl = variant.fog_ctrl,
        two_volumes = variant.two_volumes,
        bump_map = variant.bump_map,
        fog_clamping = variant.fog_clamping,
        palette = variant.palette,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_reflects_variant() {
        let variant = ShaderVariant {
            texture: true,
            shader_instr: 3,
            gouraud: false,
            pass: Pass::Oit,
            ..ShaderVariant::default()
        };
        let source = ShaderBuilder::for_variant(&variant).source();
        assert!(source.contains("const TEXTURE: bool = true;"));
        assert!(source.contains("const SHADER_INSTR: u32 = 3u;"));
        assert!(source.contains("const PASS: u32 = 2u;"));
        assert!(source.contains("@interpolate(flat) col"), "flat shading without gouraud");
        assert_eq!(fragment_entry(&variant), "fs_oit");
    }

    #[test]
    fn test_gouraud_interpolates() {
        let variant = ShaderVariant {
            gouraud: true,
            ..ShaderVariant::default()
        };
        let source = ShaderBuilder::for_variant(&variant).source();
        assert!(!source.contains("@interpolate(flat)"));
    }

    #[test]
    fn test_depth_read_as_float_texture() {
        // GLSL output has no texel fetch from depth samplers
        let sources = [
            ("polygon", POLYGON),
            ("modifier volume", MODIFIER_VOLUME),
            ("depth blit", DEPTH_BLIT),
            ("resolve", RESOLVE),
            ("stencil snapshot", STENCIL_SNAPSHOT),
        ];
        for (name, source) in sources {
            assert!(
                !source.contains("texture_depth_"),
                "{name} shader declares a depth texture binding"
            );
        }
        assert!(POLYGON.contains("var depth_tex: texture_2d<f32>;"));
        assert!(DEPTH_BLIT.contains("var source: texture_2d<f32>;"));
    }
}
