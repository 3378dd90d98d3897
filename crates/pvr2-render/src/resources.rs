//! Render targets shared by the passes of a frame.

use crate::device::{FramebufferHandle, GraphicsDevice, TextureHandle};
use crate::error::{RenderError, RenderResult};

/// Single-owner slot for the accumulation color texture.
///
/// The texture is never modified in place once a pass is finished: a new
/// texture is produced and [`AccumulationSlot::replace`] releases the old one.
#[derive(Debug, Default)]
pub struct AccumulationSlot {
    texture: Option<TextureHandle>,
}

impl AccumulationSlot {
    #[must_use]
    pub fn new(texture: TextureHandle) -> Self {
        Self {
            texture: Some(texture),
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<TextureHandle> {
        self.texture
    }

    /// Stores `texture` and deletes the previous occupant.
    pub fn replace(&mut self, device: &mut dyn GraphicsDevice, texture: TextureHandle) {
        if let Some(old) = self.texture.replace(texture) {
            device.delete_texture(old);
        }
    }

    /// Deletes the occupant, leaving the slot empty.
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(old) = self.texture.take() {
            device.delete_texture(old);
        }
    }
}

/// The geometry framebuffer and its attachments.
#[derive(Debug)]
pub struct FrameTargets {
    pub width: u32,
    pub height: u32,
    /// Framebuffer everything but the final resolve renders into.
    pub framebuffer: FramebufferHandle,
    pub depth_stencil: TextureHandle,
    /// Depth aspect of `depth_stencil`, sampled by the translucency pass.
    pub depth_view: TextureHandle,
    /// Color attachment of `framebuffer`.
    pub accumulation: AccumulationSlot,
    depth_save: Option<(FramebufferHandle, TextureHandle)>,
}

impl FrameTargets {
    /// Allocates the depth/stencil target, its depth view and the first
    /// accumulation texture.
    pub fn create(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<Self> {
        let framebuffer = device.create_framebuffer();
        device.bind_framebuffer(framebuffer);

        let depth_stencil = device.create_depth_stencil_texture(width, height)?;
        device.attach_depth_stencil(framebuffer, Some(depth_stencil));

        let color = device.create_color_texture(width, height)?;
        device.attach_color(framebuffer, Some(color));

        let depth_view = device.create_depth_view(depth_stencil)?;

        if !device.is_framebuffer_complete(framebuffer) {
            return Err(RenderError::FramebufferIncomplete("geometry"));
        }
        log::debug!("created {width}x{height} render targets");

        Ok(Self {
            width,
            height,
            framebuffer,
            depth_stencil,
            depth_view,
            accumulation: AccumulationSlot::new(color),
            depth_save: None,
        })
    }

    /// Framebuffer holding the saved depth, created on first use.
    pub fn depth_save_framebuffer(
        &mut self,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<FramebufferHandle> {
        let framebuffer = match self.depth_save {
            Some((framebuffer, _)) => framebuffer,
            None => {
                let framebuffer = device.create_framebuffer();
                let texture = device.create_depth_stencil_texture(self.width, self.height)?;
                device.attach_depth_stencil(framebuffer, Some(texture));
                self.depth_save = Some((framebuffer, texture));
                framebuffer
            }
        };
        if !device.is_framebuffer_complete(framebuffer) {
            return Err(RenderError::FramebufferIncomplete("depth save"));
        }
        Ok(framebuffer)
    }

    /// Deletes every texture and framebuffer.
    pub fn release(mut self, device: &mut dyn GraphicsDevice) {
        self.accumulation.release(device);
        if let Some((framebuffer, texture)) = self.depth_save.take() {
            device.delete_texture(texture);
            device.delete_framebuffer(framebuffer);
        }
        device.delete_texture(self.depth_view);
        device.delete_texture(self.depth_stencil);
        device.delete_framebuffer(self.framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Command, RecordingDevice};

    #[test]
    fn test_replace_deletes_previous() {
        let mut device = RecordingDevice::new();
        let a = device.create_color_texture(4, 4).unwrap();
        let b = device.create_color_texture(4, 4).unwrap();
        let mut slot = AccumulationSlot::new(a);

        slot.replace(&mut device, b);
        assert_eq!(slot.get(), Some(b));
        assert!(device.commands().contains(&Command::DeleteTexture(a)));
        assert!(!device.is_live(a));
        assert!(device.is_live(b));
    }

    #[test]
    fn test_create_targets() {
        let mut device = RecordingDevice::new();
        let targets = FrameTargets::create(&mut device, 640, 480).unwrap();
        assert_eq!(
            device.framebuffer_attachments(targets.framebuffer),
            (targets.accumulation.get(), Some(targets.depth_stencil))
        );
        assert_ne!(targets.depth_view, targets.depth_stencil);
    }

    #[test]
    fn test_incomplete_framebuffer_is_fatal() {
        let mut device = RecordingDevice::new();
        device.fail_framebuffer_check(true);
        assert!(matches!(
            FrameTargets::create(&mut device, 640, 480),
            Err(RenderError::FramebufferIncomplete("geometry"))
        ));
    }

    #[test]
    fn test_depth_save_created_once() {
        let mut device = RecordingDevice::new();
        let mut targets = FrameTargets::create(&mut device, 64, 64).unwrap();
        let a = targets.depth_save_framebuffer(&mut device).unwrap();
        let b = targets.depth_save_framebuffer(&mut device).unwrap();
        assert_eq!(a, b);

        targets.release(&mut device);
        assert_eq!(device.live_texture_count(), 0, "release frees every texture");
    }
}
