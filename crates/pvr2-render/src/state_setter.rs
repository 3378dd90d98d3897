//! Per-draw fixed-function state and shader variant selection.

use pvr2_core::state::{cull_face, wrap_mode, DEPTH_FUNCTION, LOD_BIAS};
use pvr2_core::{
    is_gpu_handled_paletted, tile_clip, BlendState, CompareFunction, DeviceCaps, FilterMode,
    FrameData, ListType, Pass, PixelFormat, PolyParam, RenderSettings, SamplerState,
    ShaderVariant, Tcw, TileClipping, Tsp, FOG_DISABLED,
};

use crate::context::DrawContext;
use crate::device::BoundTexture;
use crate::error::RenderResult;
use crate::list_drawer::DrawMode;

/// Blend weight between trilinear passes A and B.
#[must_use]
pub fn trilinear_alpha(param: &PolyParam, list: ListType) -> f32 {
    // Not mipmapped means nothing to blend between.
    if param.pcw.texture()
        && param.tsp.filter_mode() > 1
        && list != ListType::PunchThrough
        && param.tcw.mip_mapped()
    {
        let alpha = 0.25 * (param.tsp.mip_map_d() & 3) as f32;
        if param.tsp.filter_mode() == 2 {
            1.0 - alpha
        } else {
            alpha
        }
    } else {
        1.0
    }
}

/// Palette bank offset for GPU-handled paletted textures.
#[must_use]
pub fn palette_index(tcw: Tcw) -> f32 {
    if tcw.pixel_format() == PixelFormat::Pal4 {
        (tcw.pal_select() << 4) as f32 / 1023.0
    } else {
        ((tcw.pal_select() >> 4) << 8) as f32 / 1023.0
    }
}

/// Chooses the shader variant a record is drawn with.
#[must_use]
pub fn select_variant(
    param: &PolyParam,
    mode: DrawMode,
    clipping: TileClipping,
    frame: &FrameData,
    settings: &RenderSettings,
) -> ShaderVariant {
    let list = mode.list();
    let pass = mode.pass();
    let inside_clip = clipping == TileClipping::Inside;

    if pass == Pass::Depth {
        return ShaderVariant {
            alpha_test: list == ListType::PunchThrough,
            inside_clip,
            texture: list == ListType::PunchThrough && param.pcw.texture(),
            use_alpha: true,
            ignore_tex_a: param.tsp.ignore_tex_a(),
            shader_instr: 0,
            offset: false,
            fog_ctrl: FOG_DISABLED,
            two_volumes: false,
            gouraud: false,
            bump_map: false,
            fog_clamping: false,
            palette: false,
            pass,
        };
    }

    // Translucent polygons never use the second volume.
    let two_volumes = !param.tsp1.is_none() && list != ListType::Translucent;
    let color_clamp = param.tsp.color_clamp()
        && (frame.fog_clamp_min != 0 || frame.fog_clamp_max != 0xFFFF_FFFF);
    let fog_ctrl = if settings.fog {
        param.tsp.fog_ctrl()
    } else {
        FOG_DISABLED
    };

    ShaderVariant {
        alpha_test: list == ListType::PunchThrough,
        inside_clip,
        texture: param.pcw.texture(),
        use_alpha: param.tsp.use_alpha(),
        ignore_tex_a: param.tsp.ignore_tex_a(),
        shader_instr: param.tsp.shad_instr(),
        offset: param.pcw.offset(),
        fog_ctrl,
        two_volumes,
        gouraud: param.pcw.gouraud(),
        bump_map: param.tcw.pixel_format() == PixelFormat::BumpMap,
        fog_clamping: color_clamp,
        palette: is_gpu_handled_paletted(param.tsp, param.tcw),
        pass,
    }
}

/// Sampler for one texture stage. Mipmapping is decided by the first
/// stage's texture control word.
#[must_use]
pub fn sampler_state(
    tsp: Tsp,
    tcw: Tcw,
    settings: &RenderSettings,
    caps: DeviceCaps,
) -> SamplerState {
    let mut sampler = SamplerState {
        wrap_u: wrap_mode(tsp.clamp_u(), tsp.flip_u()),
        wrap_v: wrap_mode(tsp.clamp_v(), tsp.flip_v()),
        ..SamplerState::default()
    };
    if tsp.filter_mode() == 0 {
        return sampler;
    }

    let mipmapped = tcw.mip_mapped() && !tcw.scan_order() && settings.use_mipmaps;
    sampler.mag_filter = FilterMode::Linear;
    sampler.min_filter = FilterMode::Linear;
    if mipmapped {
        sampler.mipmap_filter = Some(FilterMode::Nearest);
        sampler.lod_bias = LOD_BIAS[tsp.mip_map_d() as usize];
    }
    if caps.max_anisotropy > 1 {
        if settings.anisotropic_filtering > 1 {
            sampler.anisotropy = settings.anisotropic_filtering.min(caps.max_anisotropy);
            if mipmapped {
                sampler.mipmap_filter = Some(FilterMode::Linear);
            }
        } else {
            sampler.anisotropy = 1;
        }
    }
    sampler
}

/// Whether depth is written for `param` in `mode`.
#[must_use]
pub fn writes_depth(param: &PolyParam, mode: DrawMode) -> bool {
    match mode.pass() {
        // Z write disable is ignored for punch-through polygons.
        Pass::Depth | Pass::Color => {
            mode.list() == ListType::PunchThrough || !param.isp.z_write_dis()
        }
        Pass::Oit => false,
    }
}

/// Configures the device for drawing `param` in `mode`.
pub fn set_gp_state(ctx: &mut DrawContext<'_>, param: &PolyParam, mode: DrawMode) -> RenderResult<()> {
    let list = mode.list();

    ctx.uniforms.trilinear_alpha = trilinear_alpha(param, list);

    let (clipping, clip_rect) = tile_clip(param.tileclip, &ctx.tile_clip);
    let variant = select_variant(param, mode, clipping, ctx.frame, ctx.settings);
    let program = ctx.shaders.get_program(ctx.device, &variant)?;
    ctx.device.use_program(program);

    if variant.palette {
        ctx.uniforms.palette_index = palette_index(param.tcw);
    }
    ctx.uniforms.tsp0 = param.tsp.full();
    ctx.uniforms.tsp1 = param.tsp1.full();
    ctx.uniforms.tcw0 = param.tcw.full();
    ctx.uniforms.tcw1 = param.tcw1.full();
    ctx.device.set_uniforms(&ctx.uniforms);

    if mode.pass() == Pass::Color && list != ListType::Opaque {
        ctx.device.set_blend(Some(BlendState::from_tsp(param.tsp)));
    } else {
        ctx.device.set_blend(None);
    }

    if clipping == TileClipping::Inside {
        ctx.device.set_clip_test(clip_rect.corners());
    }
    if clipping == TileClipping::Outside {
        ctx.device.set_scissor(Some(clip_rect));
    } else {
        ctx.set_base_clipping();
    }

    // Marks the pixels modifier volumes may affect.
    let stencil = if param.pcw.shadow() { 0x80 } else { 0 };
    ctx.device
        .set_stencil_func(CompareFunction::Always, stencil, stencil);

    if variant.texture {
        let stages = [(param.texid, param.tsp), (param.texid1, param.tsp1)];
        for (unit, (texid, tsp)) in (0u32..).zip(stages) {
            ctx.device.active_texture(unit);
            ctx.device.bind_texture(texid.map(BoundTexture::Cache));
            if texid.is_some() {
                let sampler = sampler_state(tsp, param.tcw, ctx.settings, ctx.caps);
                ctx.device.bind_sampler(unit, Some(sampler));
            }
        }
        ctx.device.active_texture(0);
    }

    ctx.device
        .set_cull(cull_face(param.isp.cull_mode() ^ u32::from(ctx.frame.clip_flip)));

    // Autosorted translucent draws keep the depth function of the list.
    if mode.forces_greater_equal() {
        ctx.device.set_depth_func(CompareFunction::GreaterEqual);
    } else if mode.uses_record_depth_func() {
        ctx.device
            .set_depth_func(DEPTH_FUNCTION[param.isp.depth_mode() as usize]);
    }

    ctx.device.set_depth_write(writes_depth(param, mode));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvr2_core::{Isp, Pcw, WrapMode};

    fn textured() -> PolyParam {
        PolyParam {
            pcw: Pcw(0).with_texture(true),
            isp: Isp(0).with_depth_mode(6),
            ..PolyParam::new(0, 4)
        }
    }

    #[test]
    fn test_trilinear_alpha() {
        let mut param = textured();
        param.tcw = Tcw(0).with_mip_mapped(true);
        param.tsp = Tsp(0).with_filter_mode(2).with_mip_map_d(3);
        assert!((trilinear_alpha(&param, ListType::Opaque) - 0.25).abs() < 1e-6, "pass A is inverted");

        param.tsp = Tsp(0).with_filter_mode(3).with_mip_map_d(2);
        assert!((trilinear_alpha(&param, ListType::Opaque) - 0.5).abs() < 1e-6);

        assert!((trilinear_alpha(&param, ListType::PunchThrough) - 1.0).abs() < 1e-6);

        param.tcw = Tcw(0);
        assert!((trilinear_alpha(&param, ListType::Opaque) - 1.0).abs() < 1e-6, "needs mipmaps");
    }

    #[test]
    fn test_palette_index() {
        let pal4 = Tcw(0).with_pixel_fmt(5).with_pal_select(3);
        assert!((palette_index(pal4) - 48.0 / 1023.0).abs() < 1e-6);
        let pal8 = Tcw(0).with_pixel_fmt(6).with_pal_select(0x21);
        assert!((palette_index(pal8) - 512.0 / 1023.0).abs() < 1e-6);
    }

    #[test]
    fn test_depth_variant_is_simplified() {
        let mut param = textured();
        param.pcw = param.pcw.with_gouraud(true).with_offset(true);
        param.tsp1 = Tsp(0);
        let frame = FrameData::default();
        let settings = RenderSettings::default();

        let op = select_variant(&param, DrawMode::OpaqueDepth, TileClipping::Off, &frame, &settings);
        assert!(!op.texture, "opaque depth pass samples no texture");
        assert!(!op.alpha_test);
        assert!(op.use_alpha);
        assert!(!op.two_volumes && !op.gouraud && !op.offset);
        assert_eq!(op.fog_ctrl, FOG_DISABLED);

        let pt = select_variant(&param, DrawMode::PunchThroughDepth, TileClipping::Inside, &frame, &settings);
        assert!(pt.texture && pt.alpha_test && pt.inside_clip);
    }

    #[test]
    fn test_color_variant_flags() {
        let mut param = textured();
        param.tsp1 = Tsp(0);
        param.tsp = Tsp(0).with_fog_ctrl(1).with_color_clamp(true);
        let mut frame = FrameData::default();
        let settings = RenderSettings::default();

        let op = select_variant(&param, DrawMode::OpaqueColor, TileClipping::Off, &frame, &settings);
        assert!(op.two_volumes);
        assert_eq!(op.fog_ctrl, 1);
        assert!(!op.fog_clamping, "default clamp range disables clamping");

        frame.fog_clamp_max = 0x80FF_FFFF;
        let tr = select_variant(&param, DrawMode::TranslucentColor, TileClipping::Off, &frame, &settings);
        assert!(!tr.two_volumes, "translucent never uses two volumes");
        assert!(tr.fog_clamping);

        let no_fog = RenderSettings {
            fog: false,
            ..RenderSettings::default()
        };
        let op = select_variant(&param, DrawMode::OpaqueColor, TileClipping::Off, &frame, &no_fog);
        assert_eq!(op.fog_ctrl, FOG_DISABLED);
    }

    #[test]
    fn test_sampler_nearest() {
        let tsp = Tsp(0).with_clamp_u(true).with_flip_v(true);
        let sampler = sampler_state(tsp, Tcw(0), &RenderSettings::default(), DeviceCaps::default());
        assert_eq!(sampler.wrap_u, WrapMode::ClampToEdge);
        assert_eq!(sampler.wrap_v, WrapMode::MirroredRepeat);
        assert_eq!(sampler.min_filter, FilterMode::Nearest);
        assert_eq!(sampler.mipmap_filter, None);
    }

    #[test]
    fn test_sampler_mipmaps_and_anisotropy() {
        let tsp = Tsp(0).with_filter_mode(1).with_mip_map_d(1);
        let tcw = Tcw(0).with_mip_mapped(true);
        let settings = RenderSettings {
            anisotropic_filtering: 16,
            ..RenderSettings::default()
        };

        let sampler = sampler_state(tsp, tcw, &settings, DeviceCaps::default());
        assert_eq!(sampler.mipmap_filter, Some(FilterMode::Nearest));
        assert!((sampler.lod_bias + 4.0).abs() < 1e-6);
        assert_eq!(sampler.anisotropy, 1, "device without anisotropy");

        let caps = DeviceCaps { max_anisotropy: 8 };
        let sampler = sampler_state(tsp, tcw, &settings, caps);
        assert_eq!(sampler.anisotropy, 8, "clamped to the device maximum");
        assert_eq!(sampler.mipmap_filter, Some(FilterMode::Linear));

        let strided = sampler_state(tsp, tcw.with_scan_order(true), &settings, caps);
        assert_eq!(strided.mipmap_filter, None, "non-twiddled textures have no mipmaps");
    }

    #[test]
    fn test_depth_write_policy() {
        let mut param = textured();
        param.isp = param.isp.with_z_write_dis(true);
        assert!(writes_depth(&param, DrawMode::PunchThroughDepth));
        assert!(writes_depth(&param, DrawMode::PunchThroughColor));
        assert!(!writes_depth(&param, DrawMode::OpaqueDepth));
        assert!(!writes_depth(&param, DrawMode::OpaqueColor));
        param.isp = param.isp.with_z_write_dis(false);
        assert!(!writes_depth(&param, DrawMode::TranslucentOit), "OIT never writes depth");
    }
}
