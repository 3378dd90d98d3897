//! Shader variant selection flags and their packed cache key.

use serde::{Deserialize, Serialize};

/// The rendering pass a draw belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Pass {
    /// Depth and stencil only, color writes off.
    Depth = 0,
    Color = 1,
    /// Translucent fragments into the accumulation buffers.
    Oit = 2,
}

impl Pass {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Depth),
            1 => Some(Self::Color),
            2 => Some(Self::Oit),
            _ => None,
        }
    }
}

/// Fog control value that disables fog.
pub const FOG_DISABLED: u32 = 2;

/// Flags that select one compiled fragment program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderVariant {
    pub alpha_test: bool,
    /// Discard fragments inside the tile clip rectangle.
    pub inside_clip: bool,
    pub texture: bool,
    pub use_alpha: bool,
    pub ignore_tex_a: bool,
    /// Texture/shading instruction, 2 bits.
    pub shader_instr: u32,
    pub offset: bool,
    /// Fog mode, 2 bits. [`FOG_DISABLED`] turns fog off.
    pub fog_ctrl: u32,
    pub two_volumes: bool,
    pub gouraud: bool,
    pub bump_map: bool,
    pub fog_clamping: bool,
    pub palette: bool,
    pub pass: Pass,
}

impl Default for ShaderVariant {
    fn default() -> Self {
        Self {
            alpha_test: false,
            inside_clip: false,
            texture: false,
            use_alpha: false,
            ignore_tex_a: false,
            shader_instr: 0,
            offset: false,
            fog_ctrl: FOG_DISABLED,
            two_volumes: false,
            gouraud: false,
            bump_map: false,
            fog_clamping: false,
            palette: false,
            pass: Pass::Color,
        }
    }
}

// Bit positions within the key, least significant first.
const PASS_SHIFT: u32 = 0;
const PALETTE_SHIFT: u32 = 2;
const FOG_CLAMPING_SHIFT: u32 = 3;
const BUMP_MAP_SHIFT: u32 = 4;
const GOURAUD_SHIFT: u32 = 5;
const TWO_VOLUMES_SHIFT: u32 = 6;
const FOG_CTRL_SHIFT: u32 = 7;
const OFFSET_SHIFT: u32 = 9;
const SHADER_INSTR_SHIFT: u32 = 10;
const IGNORE_TEX_A_SHIFT: u32 = 12;
const USE_ALPHA_SHIFT: u32 = 13;
const TEXTURE_SHIFT: u32 = 14;
const ALPHA_TEST_SHIFT: u32 = 15;
const INSIDE_CLIP_SHIFT: u32 = 16;

/// Number of significant bits in a [`ShaderVariant::key`].
pub const KEY_BITS: u32 = 17;

impl ShaderVariant {
    /// Packs the flags into a dense integer, unique per flag combination.
    ///
    /// Multi-bit fields are truncated to their width.
    #[must_use]
    pub fn key(&self) -> u32 {
        let flag = |value: bool, shift: u32| u32::from(value) << shift;
        (self.pass as u32) << PASS_SHIFT
            | flag(self.palette, PALETTE_SHIFT)
            | flag(self.fog_clamping, FOG_CLAMPING_SHIFT)
            | flag(self.bump_map, BUMP_MAP_SHIFT)
            | flag(self.gouraud, GOURAUD_SHIFT)
            | flag(self.two_volumes, TWO_VOLUMES_SHIFT)
            | (self.fog_ctrl & 3) << FOG_CTRL_SHIFT
            | flag(self.offset, OFFSET_SHIFT)
            | (self.shader_instr & 3) << SHADER_INSTR_SHIFT
            | flag(self.ignore_tex_a, IGNORE_TEX_A_SHIFT)
            | flag(self.use_alpha, USE_ALPHA_SHIFT)
            | flag(self.texture, TEXTURE_SHIFT)
            | flag(self.alpha_test, ALPHA_TEST_SHIFT)
            | flag(self.inside_clip, INSIDE_CLIP_SHIFT)
    }

    /// Rebuilds the flags from a key. Returns `None` for keys that no
    /// variant produces.
    #[must_use]
    pub fn from_key(key: u32) -> Option<Self> {
        if key >> KEY_BITS != 0 {
            return None;
        }
        let flag = |shift: u32| (key >> shift) & 1 != 0;
        Some(Self {
            alpha_test: flag(ALPHA_TEST_SHIFT),
            inside_clip: flag(INSIDE_CLIP_SHIFT),
            texture: flag(TEXTURE_SHIFT),
            use_alpha: flag(USE_ALPHA_SHIFT),
            ignore_tex_a: flag(IGNORE_TEX_A_SHIFT),
            shader_instr: (key >> SHADER_INSTR_SHIFT) & 3,
            offset: flag(OFFSET_SHIFT),
            fog_ctrl: (key >> FOG_CTRL_SHIFT) & 3,
            two_volumes: flag(TWO_VOLUMES_SHIFT),
            gouraud: flag(GOURAUD_SHIFT),
            bump_map: flag(BUMP_MAP_SHIFT),
            fog_clamping: flag(FOG_CLAMPING_SHIFT),
            palette: flag(PALETTE_SHIFT),
            pass: Pass::from_bits((key >> PASS_SHIFT) & 3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_key() {
        let variant = ShaderVariant::default();
        assert_eq!(variant.key(), (FOG_DISABLED << FOG_CTRL_SHIFT) | Pass::Color as u32);
    }

    #[test]
    fn test_pass_changes_key() {
        let depth = ShaderVariant {
            pass: Pass::Depth,
            ..Default::default()
        };
        let oit = ShaderVariant {
            pass: Pass::Oit,
            ..Default::default()
        };
        assert_ne!(depth.key(), oit.key());
        assert_eq!(depth.key() & 3, 0);
        assert_eq!(oit.key() & 3, 2);
    }

    #[test]
    fn test_inside_clip_is_top_bit() {
        let variant = ShaderVariant {
            inside_clip: true,
            pass: Pass::Depth,
            fog_ctrl: 0,
            ..Default::default()
        };
        assert_eq!(variant.key(), 1 << (KEY_BITS - 1));
    }

    #[test]
    fn test_from_key_rejects_invalid() {
        assert!(ShaderVariant::from_key(3).is_none(), "pass bits 3 are unused");
        assert!(ShaderVariant::from_key(1 << KEY_BITS).is_none());
    }

    fn variant_strategy() -> impl Strategy<Value = ShaderVariant> {
        (
            any::<[bool; 11]>(),
            0u32..4,
            0u32..4,
            prop_oneof![Just(Pass::Depth), Just(Pass::Color), Just(Pass::Oit)],
        )
            .prop_map(|(b, shader_instr, fog_ctrl, pass)| ShaderVariant {
                alpha_test: b[0],
                inside_clip: b[1],
                texture: b[2],
                use_alpha: b[3],
                ignore_tex_a: b[4],
                shader_instr,
                offset: b[5],
                fog_ctrl,
                two_volumes: b[6],
                gouraud: b[7],
                bump_map: b[8],
                fog_clamping: b[9],
                palette: b[10],
                pass,
            })
    }

    proptest! {
        #[test]
        fn prop_key_round_trip(variant in variant_strategy()) {
            prop_assert_eq!(ShaderVariant::from_key(variant.key()), Some(variant));
        }

        #[test]
        fn prop_distinct_variants_distinct_keys(a in variant_strategy(), b in variant_strategy()) {
            prop_assert_eq!(a == b, a.key() == b.key());
        }
    }
}
