//! Single-quad overlays composited after a frame.

use pvr2_core::{quad_strip, screen_to_ndc, BlendState, CullFace, Pass, ShaderVariant, FOG_DISABLED};

use crate::device::{BoundTexture, GraphicsDevice, TextureHandle};
use crate::error::RenderResult;
use crate::renderer::Renderer;
use crate::uniforms::{FrameUniforms, ShaderUniforms};

/// Screen corner a VMU screen is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VmuPosition {
    #[default]
    UpperLeft,
    UpperRight,
    LowerLeft,
    LowerRight,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VmuScreenParams {
    pub position: VmuPosition,
    /// Scale of the 48x32 VMU screen.
    pub size_mult: f32,
}

impl Default for VmuScreenParams {
    fn default() -> Self {
        Self {
            position: VmuPosition::UpperLeft,
            size_mult: 1.0,
        }
    }
}

/// Light gun position in 640x480 screen space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightGunState {
    pub x: f32,
    pub y: f32,
    pub offscreen: bool,
    /// Crosshair colour, 0 hides the crosshair.
    pub colour: u32,
}

/// Light gun calibration. Offsets are percentages of the screen size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GunCalibration {
    pub x_offset: f32,
    pub y_offset: f32,
    pub x_ratio: f32,
    pub y_ratio: f32,
}

impl Default for GunCalibration {
    fn default() -> Self {
        Self {
            x_offset: 0.0,
            y_offset: 0.0,
            x_ratio: 1.0,
            y_ratio: 1.0,
        }
    }
}

const SCREEN_WIDTH: f32 = 640.0;
const SCREEN_HEIGHT: f32 = 480.0;
const VMU_WIDTH: f32 = 48.0;
const VMU_HEIGHT: f32 = 32.0;
const CROSSHAIR_SIZE: f32 = 32.0;

impl VmuPosition {
    /// Top-left corner of a `width` x `height` screen in 640x480 space.
    #[must_use]
    pub fn origin(self, width: f32, height: f32) -> (f32, f32) {
        match self {
            Self::UpperLeft => (0.0, 0.0),
            Self::UpperRight => (SCREEN_WIDTH - width, 0.0),
            Self::LowerLeft => (0.0, SCREEN_HEIGHT - height),
            Self::LowerRight => (SCREEN_WIDTH - width, SCREEN_HEIGHT - height),
        }
    }
}

impl GunCalibration {
    /// Centre of the crosshair in 640x480 space.
    #[must_use]
    pub fn crosshair_centre(&self, gun: &LightGunState) -> (f32, f32) {
        (
            (gun.x - self.x_offset / 100.0 * SCREEN_WIDTH) / self.x_ratio,
            (gun.y - self.y_offset / 100.0 * SCREEN_HEIGHT) / self.y_ratio,
        )
    }
}

fn overlay_variant(use_alpha: bool, ignore_tex_a: bool) -> ShaderVariant {
    ShaderVariant {
        texture: true,
        use_alpha,
        ignore_tex_a,
        fog_ctrl: FOG_DISABLED,
        pass: Pass::Color,
        ..ShaderVariant::default()
    }
}

impl Renderer {
    /// Common state of every overlay draw.
    fn begin_overlay(
        &mut self,
        device: &mut dyn GraphicsDevice,
        variant: &ShaderVariant,
        screen: (f32, f32),
        blend: Option<BlendState>,
        texture: TextureHandle,
    ) -> RenderResult<()> {
        device.set_scissor(None);
        device.set_depth_test(false);
        device.set_stencil_test(false);
        device.set_cull(CullFace::None);
        device.set_color_write(true);
        device.set_blend(blend);

        let program = self.shaders.get_program(device, variant)?;
        device.use_program(program);
        device.set_frame_uniforms(&FrameUniforms {
            ndc: screen_to_ndc(screen.0, screen.1).to_cols_array_2d(),
            depth_scale: 1.0,
            ..FrameUniforms::default()
        });
        device.set_uniforms(&ShaderUniforms::default());

        device.active_texture(0);
        device.bind_texture(Some(BoundTexture::Device(texture)));
        device.bind_sampler(0, None);
        Ok(())
    }

    /// Draws a captured framebuffer over the whole `width` x `height` target
    /// and releases `texture`.
    pub fn draw_framebuffer(
        &mut self,
        device: &mut dyn GraphicsDevice,
        texture: TextureHandle,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let (w, h) = (width as f32, height as f32);
        let result = self
            .begin_overlay(device, &overlay_variant(false, true), (w, h), None, texture)
            .map(|()| device.draw_quad(&quad_strip(0.0, 0.0, w, h, 1.0)));
        device.bind_texture(None);
        device.delete_texture(texture);
        result
    }

    /// Draws a VMU screen in one corner of the display.
    pub fn draw_vmu_overlay(
        &mut self,
        device: &mut dyn GraphicsDevice,
        texture: TextureHandle,
        params: &VmuScreenParams,
    ) -> RenderResult<()> {
        let width = VMU_WIDTH * params.size_mult;
        let height = VMU_HEIGHT * params.size_mult;
        let (x, y) = params.position.origin(width, height);

        self.begin_overlay(
            device,
            &overlay_variant(true, false),
            (SCREEN_WIDTH, SCREEN_HEIGHT),
            Some(BlendState::ALPHA),
            texture,
        )?;
        device.draw_quad(&quad_strip(x, y, x + width, y + height, 1.0));
        device.bind_texture(None);
        Ok(())
    }

    /// Draws the crosshair of one light gun. Does nothing when the gun points
    /// off screen or has no colour.
    pub fn draw_gun_crosshair(
        &mut self,
        device: &mut dyn GraphicsDevice,
        texture: TextureHandle,
        gun: &LightGunState,
        calibration: &GunCalibration,
    ) -> RenderResult<()> {
        if gun.offscreen || gun.colour == 0 {
            return Ok(());
        }
        let (cx, cy) = calibration.crosshair_centre(gun);
        let half = CROSSHAIR_SIZE / 2.0;

        self.begin_overlay(
            device,
            &overlay_variant(true, false),
            (SCREEN_WIDTH, SCREEN_HEIGHT),
            Some(BlendState::ADDITIVE),
            texture,
        )?;
        device.draw_quad(&quad_strip(cx - half, cy - half, cx + half, cy + half, 1.0));
        device.set_blend(Some(BlendState::ALPHA));
        device.bind_texture(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Command, DrawKind, RecordingDevice};
    use pvr2_core::RenderSettings;

    fn quad_bounds(kind: &DrawKind) -> (f32, f32, f32, f32) {
        let DrawKind::Quad(vertices) = kind else {
            panic!("expected a quad, got {kind:?}");
        };
        let xs = vertices.iter().map(|v| v.x);
        let ys = vertices.iter().map(|v| v.y);
        (
            xs.clone().fold(f32::MAX, f32::min),
            ys.clone().fold(f32::MAX, f32::min),
            xs.fold(f32::MIN, f32::max),
            ys.fold(f32::MIN, f32::max),
        )
    }

    #[test]
    fn test_framebuffer_overlay_releases_texture() {
        let mut device = RecordingDevice::new();
        let mut renderer = Renderer::new(RenderSettings::default());
        let texture = device.create_texture_from_rgba(2, 2, &[0; 16]).unwrap();

        renderer.draw_framebuffer(&mut device, texture, 640, 480).unwrap();

        let draw = device.draws().next().copied().unwrap();
        assert_eq!(draw.state.blend, None);
        assert!(!draw.state.depth_test && !draw.state.stencil_test);
        let variant = draw.variant.unwrap();
        assert!(variant.texture && variant.ignore_tex_a && !variant.use_alpha);
        assert_eq!(quad_bounds(&draw.kind), (0.0, 0.0, 640.0, 480.0));
        assert!(!device.is_live(texture), "framebuffer texture is consumed");
    }

    #[test]
    fn test_vmu_corners() {
        let params = VmuScreenParams {
            position: VmuPosition::LowerRight,
            size_mult: 2.0,
        };
        let mut device = RecordingDevice::new();
        let mut renderer = Renderer::new(RenderSettings::default());
        let texture = device.create_color_texture(48, 32).unwrap();

        renderer.draw_vmu_overlay(&mut device, texture, &params).unwrap();

        let draw = device.draws().next().copied().unwrap();
        assert_eq!(quad_bounds(&draw.kind), (544.0, 416.0, 640.0, 480.0));
        assert_eq!(draw.state.blend, Some(BlendState::ALPHA));
        assert!(device.is_live(texture), "VMU textures stay owned by the caller");

        assert_eq!(VmuPosition::UpperRight.origin(48.0, 32.0), (592.0, 0.0));
        assert_eq!(VmuPosition::LowerLeft.origin(48.0, 32.0), (0.0, 448.0));
    }

    #[test]
    fn test_crosshair_position_and_blend() {
        let gun = LightGunState {
            x: 352.0,
            y: 240.0,
            offscreen: false,
            colour: 0xFF00_00FF,
        };
        let calibration = GunCalibration {
            x_offset: 5.0,
            ..GunCalibration::default()
        };
        let mut device = RecordingDevice::new();
        let mut renderer = Renderer::new(RenderSettings::default());
        let texture = device.create_color_texture(32, 32).unwrap();

        renderer
            .draw_gun_crosshair(&mut device, texture, &gun, &calibration)
            .unwrap();

        let draw = device.draws().next().copied().unwrap();
        assert_eq!(draw.state.blend, Some(BlendState::ADDITIVE));
        assert_eq!(quad_bounds(&draw.kind), (304.0, 224.0, 336.0, 256.0));
        assert_eq!(
            device.commands().last(),
            Some(&Command::BindTexture {
                unit: 0,
                texture: None
            })
        );
        assert_eq!(device.state().blend, Some(BlendState::ALPHA), "alpha blending restored");
    }

    #[test]
    fn test_hidden_crosshair_draws_nothing() {
        let mut device = RecordingDevice::new();
        let mut renderer = Renderer::new(RenderSettings::default());
        let hidden = [
            LightGunState {
                offscreen: true,
                colour: 1,
                ..LightGunState::default()
            },
            LightGunState::default(),
        ];
        for gun in hidden {
            renderer
                .draw_gun_crosshair(&mut device, TextureHandle(1), &gun, &GunCalibration::default())
                .unwrap();
        }
        assert!(device.commands().is_empty());
    }
}
