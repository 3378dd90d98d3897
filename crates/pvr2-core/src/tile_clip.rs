//! User tile clipping.

use glam::{Mat4, Vec4};

use crate::state::ClipRect;

/// How a polygon's user clip rectangle restricts rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileClipping {
    Off,
    /// Fragments inside the rectangle are discarded.
    Inside,
    /// Fragments outside the rectangle are discarded.
    Outside,
}

/// Frame-level inputs needed to map a clip word to target pixels.
#[derive(Debug, Clone, Copy)]
pub struct TileClipContext {
    /// User clipping enabled in the settings.
    pub enabled: bool,
    pub is_rtt: bool,
    /// Maps 640x480 screen space to target pixels.
    pub viewport: Mat4,
    /// Render-to-texture upscale factor.
    pub rtt_scale: f32,
}

impl Default for TileClipContext {
    fn default() -> Self {
        Self {
            enabled: true,
            is_rtt: false,
            viewport: Mat4::IDENTITY,
            rtt_scale: 1.0,
        }
    }
}

const SCREEN_WIDTH: u32 = 640;
const SCREEN_HEIGHT: u32 = 480;
const TILE_SIZE: u32 = 32;

/// Decodes a tile clip word.
///
/// The returned rectangle is only meaningful when the mode is not
/// [`TileClipping::Off`].
#[must_use]
pub fn tile_clip(word: u32, ctx: &TileClipContext) -> (TileClipping, ClipRect) {
    if !ctx.enabled {
        return (TileClipping::Off, ClipRect::default());
    }
    let mode = word >> 28;
    if mode < 2 {
        return (TileClipping::Off, ClipRect::default());
    }
    let clipping = if mode & 1 == 1 {
        TileClipping::Inside
    } else {
        TileClipping::Outside
    };

    let x0 = (word & 63) * TILE_SIZE;
    let x1 = ((word >> 6) & 63) * TILE_SIZE + TILE_SIZE;
    let y0 = ((word >> 12) & 31) * TILE_SIZE;
    let y1 = ((word >> 17) & 31) * TILE_SIZE + TILE_SIZE;

    if clipping == TileClipping::Outside
        && x0 == 0
        && y0 == 0
        && x1 == SCREEN_WIDTH
        && y1 == SCREEN_HEIGHT
    {
        return (TileClipping::Off, ClipRect::default());
    }

    let (mut sx, mut sy, mut ex, mut ey) = (x0 as f32, y0 as f32, x1 as f32, y1 as f32);
    if ctx.is_rtt {
        sx *= ctx.rtt_scale;
        sy *= ctx.rtt_scale;
        ex *= ctx.rtt_scale;
        ey *= ctx.rtt_scale;
    } else {
        let start = ctx.viewport * Vec4::new(sx, sy, 0.0, 1.0);
        let end = ctx.viewport * Vec4::new(ex, ey, 0.0, 1.0);
        (sx, sy, ex, ey) = (start.x, start.y, end.x, end.y);
    }

    let rect = ClipRect::new(
        sx.round() as i32,
        sy.min(ey).round() as i32,
        (ex - sx).round() as i32,
        (ey - sy).abs().round() as i32,
    );
    (clipping, rect)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(mode: u32, x0: u32, x1: u32, y0: u32, y1: u32) -> u32 {
        (mode << 28) | x0 | (x1 << 6) | (y0 << 12) | (y1 << 17)
    }

    #[test]
    fn test_low_modes_are_off() {
        let ctx = TileClipContext::default();
        assert_eq!(tile_clip(word(0, 1, 2, 1, 2), &ctx).0, TileClipping::Off);
        assert_eq!(tile_clip(word(1, 1, 2, 1, 2), &ctx).0, TileClipping::Off);
    }

    #[test]
    fn test_disabled_setting_is_off() {
        let ctx = TileClipContext {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(tile_clip(word(3, 1, 2, 1, 2), &ctx).0, TileClipping::Off);
    }

    #[test]
    fn test_inside_rect() {
        let ctx = TileClipContext::default();
        let (mode, rect) = tile_clip(word(3, 1, 2, 1, 3), &ctx);
        assert_eq!(mode, TileClipping::Inside);
        assert_eq!(rect, ClipRect::new(32, 32, 64, 96));
    }

    #[test]
    fn test_full_screen_outside_is_off() {
        let ctx = TileClipContext::default();
        let (mode, _) = tile_clip(word(2, 0, 19, 0, 14), &ctx);
        assert_eq!(mode, TileClipping::Off, "full-screen outside clip clips nothing");

        let (mode, rect) = tile_clip(word(2, 0, 18, 0, 14), &ctx);
        assert_eq!(mode, TileClipping::Outside);
        assert_eq!(rect, ClipRect::new(0, 0, 608, 480));
    }

    #[test]
    fn test_viewport_scale_and_flip() {
        // Doubles the resolution and flips Y around a 960 pixel target.
        let viewport = Mat4::from_cols(
            Vec4::new(2.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, -2.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(0.0, 960.0, 0.0, 1.0),
        );
        let ctx = TileClipContext {
            viewport,
            ..Default::default()
        };
        let (_, rect) = tile_clip(word(2, 0, 0, 0, 0), &ctx);
        assert_eq!(rect, ClipRect::new(0, 896, 64, 64));
    }

    #[test]
    fn test_rtt_scale() {
        let ctx = TileClipContext {
            is_rtt: true,
            rtt_scale: 2.0,
            ..Default::default()
        };
        let (_, rect) = tile_clip(word(3, 2, 2, 1, 1), &ctx);
        assert_eq!(rect, ClipRect::new(128, 64, 64, 64));
    }
}
