//! Rendering pipeline for pvr2-rs.
//!
//! [`Renderer::draw_strips`] turns a [`pvr2_core::FrameData`] into draw calls
//! against a [`GraphicsDevice`]:
//! - opaque and punch-through lists are drawn twice, once for depth and
//!   stencil and once for color
//! - modifier volumes mark shadowed pixels in the stencil between the two
//! - translucent lists are either blended in order or accumulated and resolved
//!
//! Two devices are provided: [`RecordingDevice`], which records every call for
//! inspection, and [`WgpuDevice`], which renders offscreen.

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Device calls mirror a state machine with many settings
#![allow(clippy::too_many_arguments)]
#![allow(clippy::struct_excessive_bools)]
// Handles, counts and pixel sizes are narrow by construction
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod device;
pub mod error;
pub mod list_drawer;
pub mod modvol;
pub mod overlay;
pub mod recording;
pub mod renderer;
pub mod resources;
pub mod screenshot;
pub mod shader_cache;
pub mod state_setter;
pub mod uniforms;
pub mod wgpu_backend;

pub use context::{DrawContext, FrameStats};
pub use device::{
    BoundTexture, ClearValues, FramebufferHandle, GraphicsDevice, ProgramHandle, TextureHandle,
    VertexArray, DEPTH_UNIT, STENCIL_UNIT, TEXTURE_UNITS,
};
pub use error::{RenderError, RenderResult};
pub use list_drawer::DrawMode;
pub use overlay::{GunCalibration, LightGunState, VmuPosition, VmuScreenParams};
pub use recording::{Command, DeviceState, DrawKind, DrawRecord, RecordingDevice};
pub use renderer::Renderer;
pub use resources::{AccumulationSlot, FrameTargets};
pub use screenshot::{encode_png, save_image, ScreenshotError};
pub use shader_cache::ShaderCache;
pub use uniforms::{FrameUniforms, ShaderUniforms};
pub use wgpu_backend::WgpuDevice;
