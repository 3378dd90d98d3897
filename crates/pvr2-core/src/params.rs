//! Polygon and modifier volume parameter records.
//!
//! Each record keeps the raw 32-bit hardware words it was built from. The
//! word types decode individual bitfields on demand.

use serde::{Deserialize, Serialize};

macro_rules! register_word {
    (
        $(#[$meta:meta])*
        $name:ident {
            flags { $( $(#[$fm:meta])* $flag:ident, $with_flag:ident : $bit:literal; )* }
            fields { $( $(#[$vm:meta])* $field:ident, $with_field:ident : $offset:literal, $width:literal; )* }
        }
    ) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Returns the raw hardware word.
            #[must_use]
            pub const fn full(self) -> u32 {
                self.0
            }

            $(
                $(#[$fm])*
                #[must_use]
                pub const fn $flag(self) -> bool {
                    (self.0 >> $bit) & 1 != 0
                }

                #[must_use]
                pub const fn $with_flag(self, value: bool) -> Self {
                    Self((self.0 & !(1 << $bit)) | ((value as u32) << $bit))
                }
            )*

            $(
                $(#[$vm])*
                #[must_use]
                pub const fn $field(self) -> u32 {
                    (self.0 >> $offset) & ((1 << $width) - 1)
                }

                #[must_use]
                pub const fn $with_field(self, value: u32) -> Self {
                    let mask: u32 = ((1 << $width) - 1) << $offset;
                    Self((self.0 & !mask) | ((value << $offset) & mask))
                }
            )*
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({:#010x})"), self.0)
            }
        }
    };
}

register_word! {
    /// Parameter control word, written by the tile accelerator per strip.
    Pcw {
        flags {
            uv_16bit, with_uv_16bit: 0;
            gouraud, with_gouraud: 1;
            offset, with_offset: 2;
            texture, with_texture: 3;
            volume, with_volume: 6;
            /// Polygon is affected by modifier volumes.
            shadow, with_shadow: 7;
            group_en, with_group_en: 23;
            end_of_strip, with_end_of_strip: 28;
        }
        fields {
            col_type, with_col_type: 4, 2;
            user_clip, with_user_clip: 16, 2;
            strip_len, with_strip_len: 18, 2;
            list_type, with_list_type: 24, 3;
            para_type, with_para_type: 29, 3;
        }
    }
}

register_word! {
    /// ISP/TSP instruction word: depth, culling and z-write control.
    Isp {
        flags {
            dcalc_ctrl, with_dcalc_ctrl: 20;
            cache_bypass, with_cache_bypass: 21;
            uv_16bit, with_uv_16bit: 22;
            gouraud, with_gouraud: 23;
            offset, with_offset: 24;
            texture, with_texture: 25;
            z_write_dis, with_z_write_dis: 26;
        }
        fields {
            cull_mode, with_cull_mode: 27, 2;
            /// Index into the depth compare table. 0 never passes.
            depth_mode, with_depth_mode: 29, 3;
        }
    }
}

register_word! {
    /// Instruction word of a modifier volume triangle.
    IspModVol {
        flags {
            /// Last triangle of a volume.
            volume_last, with_volume_last: 26;
        }
        fields {
            cull_mode, with_cull_mode: 27, 2;
            /// 0 for a normal triangle, 1 closes an inclusion volume, 2 an exclusion volume.
            depth_mode, with_depth_mode: 29, 3;
        }
    }
}

register_word! {
    /// Texture and shading processor word.
    Tsp {
        flags {
            sup_sample, with_sup_sample: 12;
            clamp_v, with_clamp_v: 15;
            clamp_u, with_clamp_u: 16;
            flip_v, with_flip_v: 17;
            flip_u, with_flip_u: 18;
            ignore_tex_a, with_ignore_tex_a: 19;
            use_alpha, with_use_alpha: 20;
            color_clamp, with_color_clamp: 21;
            dst_select, with_dst_select: 24;
            src_select, with_src_select: 25;
        }
        fields {
            tex_v, with_tex_v: 0, 3;
            tex_u, with_tex_u: 3, 3;
            shad_instr, with_shad_instr: 6, 2;
            mip_map_d, with_mip_map_d: 8, 4;
            /// 0 point sampled, 1 bilinear, 2 and 3 trilinear pass A and B.
            filter_mode, with_filter_mode: 13, 2;
            fog_ctrl, with_fog_ctrl: 22, 2;
            dst_instr, with_dst_instr: 26, 3;
            src_instr, with_src_instr: 29, 3;
        }
    }
}

register_word! {
    /// Texture control word.
    Tcw {
        flags {
            stride_sel, with_stride_sel: 25;
            /// 0 for twiddled textures.
            scan_order, with_scan_order: 26;
            vq_comp, with_vq_comp: 30;
            mip_mapped, with_mip_mapped: 31;
        }
        fields {
            tex_addr, with_tex_addr: 0, 21;
            /// Palette bank, only meaningful for paletted formats.
            pal_select, with_pal_select: 21, 6;
            pixel_fmt, with_pixel_fmt: 27, 3;
        }
    }
}

impl Tsp {
    /// Marks a record without a second volume.
    pub const NONE: Self = Self(u32::MAX);

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

/// Texel layout encoded in [`Tcw::pixel_fmt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Argb1555,
    Rgb565,
    Argb4444,
    Yuv422,
    BumpMap,
    Pal4,
    Pal8,
    Reserved,
}

impl Tcw {
    #[must_use]
    pub const fn pixel_format(self) -> PixelFormat {
        match self.pixel_fmt() {
            0 => PixelFormat::Argb1555,
            1 => PixelFormat::Rgb565,
            2 => PixelFormat::Argb4444,
            3 => PixelFormat::Yuv422,
            4 => PixelFormat::BumpMap,
            5 => PixelFormat::Pal4,
            6 => PixelFormat::Pal8,
            _ => PixelFormat::Reserved,
        }
    }
}

/// Handle of a texture owned by the texture cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextureId(pub u32);

/// The polygon list a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListType {
    Opaque,
    PunchThrough,
    Translucent,
}

impl ListType {
    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Opaque => "OP",
            Self::PunchThrough => "PT",
            Self::Translucent => "TR",
        }
    }
}

fn default_tsp1() -> Tsp {
    Tsp::NONE
}

/// One draw call: a triangle strip and the state it is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyParam {
    /// Offset of the strip in the index buffer.
    pub first: u32,
    /// Number of strip indices.
    pub count: u32,
    #[serde(default)]
    pub pcw: Pcw,
    #[serde(default)]
    pub isp: Isp,
    #[serde(default)]
    pub tsp: Tsp,
    #[serde(default)]
    pub tcw: Tcw,
    /// Second volume parameters, [`Tsp::NONE`] when the polygon has one volume.
    #[serde(default = "default_tsp1")]
    pub tsp1: Tsp,
    #[serde(default)]
    pub tcw1: Tcw,
    #[serde(default)]
    pub texid: Option<TextureId>,
    #[serde(default)]
    pub texid1: Option<TextureId>,
    /// Raw user tile clip word, see [`crate::tile_clip`].
    #[serde(default)]
    pub tileclip: u32,
}

impl PolyParam {
    /// Creates a single-volume, untextured record covering `count` indices from `first`.
    #[must_use]
    pub fn new(first: u32, count: u32) -> Self {
        Self {
            first,
            count,
            pcw: Pcw::default(),
            isp: Isp::default(),
            tsp: Tsp::default(),
            tcw: Tcw::default(),
            tsp1: Tsp::NONE,
            tcw1: Tcw::default(),
            texid: None,
            texid1: None,
            tileclip: 0,
        }
    }

    /// End of the strip in the index buffer.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.first) + u64::from(self.count)
    }

    /// Whether the strip contains at least one triangle.
    #[must_use]
    pub fn has_triangles(&self) -> bool {
        self.count > 2
    }
}

impl Default for PolyParam {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// A run of modifier volume triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifierVolumeParam {
    /// First triangle in the modifier volume buffer.
    pub first: u32,
    /// Number of triangles.
    pub count: u32,
    #[serde(default)]
    pub isp: IspModVol,
}

impl ModifierVolumeParam {
    #[must_use]
    pub fn new(first: u32, count: u32, isp: IspModVol) -> Self {
        Self { first, count, isp }
    }

    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.first) + u64::from(self.count)
    }
}

/// Whether the palette lookup for this texture happens in the fragment shader.
#[must_use]
pub fn is_gpu_handled_paletted(tsp: Tsp, tcw: Tcw) -> bool {
    matches!(tcw.pixel_format(), PixelFormat::Pal4 | PixelFormat::Pal8)
        && tsp.filter_mode() == 0
        && !tcw.mip_mapped()
        && !tcw.vq_comp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsp_fields() {
        let tsp = Tsp(0)
            .with_src_instr(4)
            .with_dst_instr(5)
            .with_filter_mode(2)
            .with_mip_map_d(9)
            .with_clamp_u(true);
        assert_eq!(tsp.src_instr(), 4);
        assert_eq!(tsp.dst_instr(), 5);
        assert_eq!(tsp.filter_mode(), 2);
        assert_eq!(tsp.mip_map_d(), 9);
        assert!(tsp.clamp_u());
        assert!(!tsp.clamp_v());
        assert_eq!(tsp.full(), (4 << 29) | (5 << 26) | (2 << 13) | (9 << 8) | (1 << 16));
    }

    #[test]
    fn test_with_field_masks_overflow() {
        let isp = Isp(0).with_depth_mode(0xF);
        assert_eq!(isp.depth_mode(), 7, "value should be truncated to 3 bits");
        assert_eq!(isp.full(), 7 << 29);
    }

    #[test]
    fn test_flag_clear() {
        let pcw = Pcw(u32::MAX).with_shadow(false);
        assert!(!pcw.shadow());
        assert!(pcw.texture());
        assert_eq!(pcw.full(), u32::MAX & !(1 << 7));
    }

    #[test]
    fn test_pixel_format() {
        assert_eq!(Tcw(0).with_pixel_fmt(4).pixel_format(), PixelFormat::BumpMap);
        assert_eq!(Tcw(0).with_pixel_fmt(5).pixel_format(), PixelFormat::Pal4);
        assert_eq!(Tcw(0).with_pixel_fmt(7).pixel_format(), PixelFormat::Reserved);
    }

    #[test]
    fn test_gpu_handled_paletted() {
        let tcw = Tcw(0).with_pixel_fmt(6);
        assert!(is_gpu_handled_paletted(Tsp(0), tcw));
        assert!(!is_gpu_handled_paletted(Tsp(0).with_filter_mode(1), tcw));
        assert!(!is_gpu_handled_paletted(Tsp(0), tcw.with_mip_mapped(true)));
        assert!(!is_gpu_handled_paletted(Tsp(0), tcw.with_vq_comp(true)));
        assert!(!is_gpu_handled_paletted(Tsp(0), Tcw(0).with_pixel_fmt(1)));
    }

    #[test]
    fn test_poly_param_defaults_from_json() {
        let param: PolyParam = serde_json::from_str(r#"{"first": 6, "count": 4}"#).unwrap();
        assert_eq!(param.first, 6);
        assert!(param.tsp1.is_none(), "missing tsp1 must mean a single volume");
        assert_eq!(param.texid, None);
        assert_eq!(param.end(), 10);
    }

    #[test]
    fn test_word_debug_is_hex() {
        assert_eq!(format!("{:?}", Tcw(0x10)), "Tcw(0x00000010)");
    }
}
