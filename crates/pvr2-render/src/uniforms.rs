//! Uniform blocks pushed to the shader programs.

use bytemuck::{Pod, Zeroable};
use pvr2_core::FrameData;

/// Per-draw uniforms, updated before every draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderUniforms {
    /// Blend factor between the two trilinear passes, 1 when not trilinear.
    pub trilinear_alpha: f32,
    /// Offset of the palette bank in the palette texture.
    pub palette_index: f32,
    /// Index of the record within its list.
    pub poly_number: u32,
    pub tsp0: u32,
    pub tsp1: u32,
    pub tcw0: u32,
    pub tcw1: u32,
}

impl Default for ShaderUniforms {
    fn default() -> Self {
        Self {
            trilinear_alpha: 1.0,
            palette_index: 0.0,
            poly_number: 0,
            tsp0: 0,
            tsp1: u32::MAX,
            tcw0: 0,
            tcw1: 0,
        }
    }
}

/// Uniforms constant over a frame (must match the WGSL `FrameUniforms` struct).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    /// Screen space to normalized device coordinates.
    pub ndc: [[f32; 4]; 4],
    pub fog_color: [f32; 4],
    pub fog_clamp_min: [f32; 4],
    pub fog_clamp_max: [f32; 4],
    pub pt_alpha_ref: f32,
    pub shadow_scale: f32,
    pub fog_density: f32,
    /// Maps 1/w into the 0..1 depth range.
    pub depth_scale: f32,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self::from_frame(&FrameData::default())
    }
}

/// Unpacks an ARGB8888 word into normalized RGBA.
#[must_use]
pub fn unpack_argb(argb: u32) -> [f32; 4] {
    let channel = |shift: u32| ((argb >> shift) & 0xFF) as f32 / 255.0;
    [channel(16), channel(8), channel(0), channel(24)]
}

impl FrameUniforms {
    #[must_use]
    pub fn from_frame(frame: &FrameData) -> Self {
        let max_z = frame
            .vertices
            .iter()
            .map(|v| v.z)
            .filter(|z| z.is_finite())
            .fold(0.0_f32, f32::max);
        Self {
            ndc: frame.ndc.to_cols_array_2d(),
            fog_color: frame.fog_color,
            fog_clamp_min: unpack_argb(frame.fog_clamp_min),
            fog_clamp_max: unpack_argb(frame.fog_clamp_max),
            pt_alpha_ref: frame.pt_alpha_ref,
            shadow_scale: frame.shadow_scale,
            fog_density: frame.fog_density,
            depth_scale: if max_z > 0.0 { 1.0 / max_z } else { 1.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvr2_core::Vertex;

    #[test]
    fn test_frame_uniforms_size() {
        // mat4 + three vec4 + four scalars
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 128);
    }

    #[test]
    fn test_unpack_argb() {
        assert_eq!(unpack_argb(0xFF00_0000), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(unpack_argb(0x00FF_0000), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(unpack_argb(0xFFFF_FFFF), [1.0; 4]);
    }

    #[test]
    fn test_depth_scale_from_vertices() {
        let frame = FrameData {
            vertices: vec![Vertex::new(0.0, 0.0, 0.5), Vertex::new(0.0, 0.0, 4.0)],
            ..FrameData::default()
        };
        let uniforms = FrameUniforms::from_frame(&frame);
        assert!((uniforms.depth_scale - 0.25).abs() < f32::EPSILON);

        let empty = FrameUniforms::from_frame(&FrameData::default());
        assert!((empty.depth_scale - 1.0).abs() < f32::EPSILON);
    }
}
