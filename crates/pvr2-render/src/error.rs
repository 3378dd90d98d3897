//! Rendering error types.

use pvr2_core::FrameError;
use thiserror::Error;

/// Errors that abort rendering of a frame.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// A framebuffer is missing attachments or has mismatched ones.
    #[error("framebuffer '{0}' is incomplete")]
    FramebufferIncomplete(&'static str),

    /// Shader compilation failed.
    #[error("shader compilation failed: {0}")]
    ShaderCompilationFailed(String),

    /// Pipeline creation failed.
    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),

    /// Texture creation failed.
    #[error("texture creation failed: {0}")]
    TextureCreationFailed(String),

    /// `draw_strips` was called before `create_textures`.
    #[error("render targets have not been created")]
    TargetsNotCreated,

    /// The frame refers to data it does not contain.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] FrameError),

    /// Reading the output back from the GPU failed.
    #[error("readback failed: {0}")]
    ReadbackFailed(String),

    /// Timeout waiting for GPU.
    #[error("timeout waiting for GPU")]
    Timeout,
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
