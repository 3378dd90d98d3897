//! Core data model for pvr2-rs.
//!
//! This crate holds everything about a PowerVR2 frame that does not touch a GPU:
//! - [`PolyParam`] and [`ModifierVolumeParam`] records with their raw hardware words
//! - [`RenderPass`] descriptors and the per-pass record ranges
//! - [`ShaderVariant`] flags and their packed cache key
//! - Translation of blend, depth, cull and tile clip state into backend-neutral enums

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Shader variants and settings legitimately have many boolean flags
#![allow(clippy::struct_excessive_bools)]
// Register fields are narrow by construction
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod error;
pub mod frame;
pub mod modvol;
pub mod options;
pub mod params;
pub mod render_pass;
pub mod shader_key;
pub mod state;
pub mod tile_clip;
pub mod vertex;

pub use error::{FrameError, Result};
pub use frame::{quad_strip, screen_to_ndc, FrameBuilder, FrameData};
pub use modvol::{plan_modifier_volumes, ModVolDraw, ModVolMode};
pub use options::{DeviceCaps, RenderSettings};
pub use params::{
    is_gpu_handled_paletted, Isp, IspModVol, ListType, ModifierVolumeParam, Pcw, PixelFormat,
    PolyParam, Tcw, TextureId, Tsp,
};
pub use render_pass::{pass_ranges, PassRanges, RenderPass};
pub use shader_key::{Pass, ShaderVariant, FOG_DISABLED};
pub use state::{
    BlendFactor, BlendState, ClipRect, CompareFunction, CullFace, FilterMode, SamplerState,
    StencilOp, StencilOps, WrapMode,
};
pub use tile_clip::{tile_clip, TileClipContext, TileClipping};
pub use vertex::{ModVolVertex, Vertex};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec4};
