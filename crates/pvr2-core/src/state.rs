//! Backend-neutral fixed-function state and the PowerVR translation tables.
//!
//! Device implementations convert these enums into their own API types.

use serde::{Deserialize, Serialize};

use crate::params::Tsp;

/// Depth and stencil comparison functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Source/destination factors of an additive blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendState {
    pub const ALPHA: Self = Self {
        src: BlendFactor::SrcAlpha,
        dst: BlendFactor::OneMinusSrcAlpha,
    };

    pub const ADDITIVE: Self = Self {
        src: BlendFactor::SrcAlpha,
        dst: BlendFactor::One,
    };

    /// The blend a polygon requests through its TSP instruction fields.
    #[must_use]
    pub fn from_tsp(tsp: Tsp) -> Self {
        Self {
            src: SRC_BLEND[tsp.src_instr() as usize],
            dst: DST_BLEND[tsp.dst_instr() as usize],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Invert,
}

/// Stencil operations for the fail, depth-fail and pass cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOps {
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

impl StencilOps {
    #[must_use]
    pub const fn new(fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) -> Self {
        Self {
            fail,
            depth_fail,
            pass,
        }
    }
}

/// Faces discarded by rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    None,
    /// Counter-clockwise triangles are culled.
    Front,
    /// Clockwise triangles are culled.
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Full sampler description for one texture stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerState {
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    /// Mip level selection, `None` when mipmaps are not used.
    pub mipmap_filter: Option<FilterMode>,
    pub lod_bias: f32,
    pub anisotropy: u16,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            wrap_u: WrapMode::ClampToEdge,
            wrap_v: WrapMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: None,
            lod_bias: 0.0,
            anisotropy: 1,
        }
    }
}

/// A rectangle in target pixels with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClipRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ClipRect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Corners as `[x0, y0, x1, y1]`, the layout of the clip-test uniform.
    #[must_use]
    pub fn corners(&self) -> [f32; 4] {
        [
            self.x as f32,
            self.y as f32,
            (self.x + self.width) as f32,
            (self.y + self.height) as f32,
        ]
    }
}

/// Source blend factor by TSP `src_instr`.
pub const SRC_BLEND: [BlendFactor; 8] = [
    BlendFactor::Zero,
    BlendFactor::One,
    BlendFactor::DstColor,
    BlendFactor::OneMinusDstColor,
    BlendFactor::SrcAlpha,
    BlendFactor::OneMinusSrcAlpha,
    BlendFactor::DstAlpha,
    BlendFactor::OneMinusDstAlpha,
];

/// Destination blend factor by TSP `dst_instr`.
pub const DST_BLEND: [BlendFactor; 8] = [
    BlendFactor::Zero,
    BlendFactor::One,
    BlendFactor::SrcColor,
    BlendFactor::OneMinusSrcColor,
    BlendFactor::SrcAlpha,
    BlendFactor::OneMinusSrcAlpha,
    BlendFactor::DstAlpha,
    BlendFactor::OneMinusDstAlpha,
];

/// Depth compare function by ISP `depth_mode`.
pub const DEPTH_FUNCTION: [CompareFunction; 8] = [
    CompareFunction::Never,
    CompareFunction::Less,
    CompareFunction::Equal,
    CompareFunction::LessEqual,
    CompareFunction::Greater,
    CompareFunction::NotEqual,
    CompareFunction::GreaterEqual,
    CompareFunction::Always,
];

/// Texture LOD bias by TSP `mip_map_d`.
pub const LOD_BIAS: [f32; 16] = [
    0.0, -4.0, -2.0, -1.0, -0.5, -0.25, 0.0, 0.25, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0,
];

/// Maps a 2-bit ISP cull mode to the faces to discard.
#[must_use]
pub const fn cull_face(mode: u32) -> CullFace {
    match mode & 3 {
        2 => CullFace::Front,
        3 => CullFace::Back,
        _ => CullFace::None,
    }
}

/// Wrap mode for one texture axis.
#[must_use]
pub const fn wrap_mode(clamp: bool, mirror: bool) -> WrapMode {
    if clamp {
        WrapMode::ClampToEdge
    } else if mirror {
        WrapMode::MirroredRepeat
    } else {
        WrapMode::Repeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_from_tsp() {
        let tsp = Tsp(0).with_src_instr(4).with_dst_instr(5);
        assert_eq!(BlendState::from_tsp(tsp), BlendState::ALPHA);

        let tsp = Tsp(0).with_src_instr(2).with_dst_instr(2);
        let blend = BlendState::from_tsp(tsp);
        assert_eq!(blend.src, BlendFactor::DstColor);
        assert_eq!(blend.dst, BlendFactor::SrcColor, "index 2 differs between tables");
    }

    #[test]
    fn test_cull_face() {
        assert_eq!(cull_face(0), CullFace::None);
        assert_eq!(cull_face(1), CullFace::None);
        assert_eq!(cull_face(2), CullFace::Front);
        assert_eq!(cull_face(3), CullFace::Back);
        // geometry flip toggles between front and back
        assert_eq!(cull_face(2 ^ 1), CullFace::Back);
    }

    #[test]
    fn test_wrap_mode_clamp_wins() {
        assert_eq!(wrap_mode(true, true), WrapMode::ClampToEdge);
        assert_eq!(wrap_mode(false, true), WrapMode::MirroredRepeat);
        assert_eq!(wrap_mode(false, false), WrapMode::Repeat);
    }

    #[test]
    fn test_clip_rect_corners() {
        let rect = ClipRect::new(32, 64, 96, 128);
        assert_eq!(rect.corners(), [32.0, 64.0, 128.0, 192.0]);
    }
}
