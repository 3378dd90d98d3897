//! Renderer settings and device capabilities.

use serde::{Deserialize, Serialize};

/// User-facing render settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Honor per-polygon fog control.
    pub fog: bool,
    /// Draw modifier volumes (shadows).
    pub modifier_volumes: bool,
    pub use_mipmaps: bool,
    /// Requested anisotropy level, 1 disables it.
    pub anisotropic_filtering: u16,
    /// Honor user tile clipping.
    pub clipping: bool,
    /// Resolution multiplier for render-to-texture frames.
    pub render_to_texture_upscale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fog: true,
            modifier_volumes: true,
            use_mipmaps: true,
            anisotropic_filtering: 1,
            clipping: true,
            render_to_texture_upscale: 1.0,
        }
    }
}

/// Limits reported by the graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceCaps {
    pub max_anisotropy: u16,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self { max_anisotropy: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_json() {
        let settings: RenderSettings = serde_json::from_str(r#"{"fog": false}"#).unwrap();
        assert!(!settings.fog);
        assert!(settings.modifier_volumes, "unset fields keep their defaults");
        assert_eq!(settings.anisotropic_filtering, 1);
    }
}
