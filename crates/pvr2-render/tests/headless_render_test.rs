//! Offscreen rendering through the wgpu device.
//!
//! These tests need a GPU adapter (real or software fallback). Without
//! one they print a notice and return early.

use pvr2_core::{
    quad_strip, DeviceCaps, FrameBuilder, FrameData, Isp, ListType, PolyParam, RenderSettings, Tsp,
};
use pvr2_render::{Renderer, WgpuDevice};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

fn device() -> Option<WgpuDevice> {
    match pollster::block_on(WgpuDevice::new_headless()) {
        Ok(device) => Some(device),
        Err(e) => {
            eprintln!("Skipping headless tests: no GPU adapter available ({e})");
            None
        }
    }
}

fn pixel(pixels: &[u8], x: u32, y: u32) -> [u8; 4] {
    let i = ((y * WIDTH + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

fn red_quad_param() -> PolyParam {
    PolyParam {
        isp: Isp(0).with_depth_mode(6),
        tsp: Tsp(0).with_fog_ctrl(2),
        ..PolyParam::new(0, 0)
    }
}

/// Two opaque passes, so the second one saves and restores depth and
/// samples the stencil snapshot.
fn two_pass_frame() -> FrameData {
    let back = quad_strip(0.0, 0.0, 640.0, 480.0, 0.5).map(|v| v.with_color([0, 0, 255, 255]));
    let front = quad_strip(100.0, 100.0, 300.0, 300.0, 1.0).map(|v| v.with_color([255, 0, 0, 255]));
    FrameBuilder::new()
        .strip(ListType::Opaque, &back, red_quad_param())
        .end_pass(false)
        .strip(ListType::Opaque, &front, red_quad_param())
        .end_pass(false)
        .build()
}

#[test]
fn test_every_adapter_builds_fixed_pipelines() {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapters = instance.enumerate_adapters(wgpu::Backends::all());
    if adapters.is_empty() {
        eprintln!("Skipping adapter tests: no GPU adapter available");
        return;
    }

    for adapter in adapters {
        let info = adapter.get_info();
        let Ok((device, queue)) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default()))
        else {
            eprintln!("Skipping {} ({:?}): no device", info.name, info.backend);
            continue;
        };

        let mut device = WgpuDevice::from_device(device, queue, DeviceCaps::default())
            .unwrap_or_else(|e| panic!("{} ({:?}): {e}", info.name, info.backend));

        let mut renderer = Renderer::new(RenderSettings::default());
        renderer
            .create_textures(&mut device, WIDTH, HEIGHT)
            .expect("render targets");
        let output = device
            .create_output_target(WIDTH, HEIGHT)
            .expect("output target");
        let stats = renderer
            .draw_strips(&mut device, &two_pass_frame(), output, WIDTH, HEIGHT)
            .expect("two pass frame");
        assert_eq!(stats.passes_drawn, 2);
        assert_eq!(stats.depth_blits, 2, "second pass saves and restores depth");

        let pixels = device.read_output(output).expect("readback");
        let front = pixel(&pixels, 200, 200);
        let back = pixel(&pixels, 500, 400);
        assert!(
            front[0] > 200 && front[2] < 50,
            "{:?}: second pass quad should be red, got {front:?}",
            info.backend
        );
        assert!(
            back[2] > 200 && back[0] < 50,
            "{:?}: first pass stays blue, got {back:?}",
            info.backend
        );
    }
}

#[test]
fn headless_render_tests() {
    let Some(mut device) = device() else {
        return;
    };
    let mut renderer = Renderer::new(RenderSettings::default());
    renderer
        .create_textures(&mut device, WIDTH, HEIGHT)
        .expect("render targets");
    let output = device
        .create_output_target(WIDTH, HEIGHT)
        .expect("output target");

    // --- Empty frame resolves to a uniform image ---
    {
        let frame = FrameBuilder::new().build();
        renderer
            .draw_strips(&mut device, &frame, output, WIDTH, HEIGHT)
            .expect("empty frame");
        let pixels = device.read_output(output).expect("readback");
        assert_eq!(pixels.len(), (WIDTH * HEIGHT * 4) as usize);
        let first = &pixels[0..4];
        assert!(
            pixels.chunks(4).all(|px| px == first),
            "empty frame should be uniform"
        );
    }

    // --- Opaque quad covers only its rectangle ---
    {
        let quad = quad_strip(100.0, 100.0, 300.0, 300.0, 1.0).map(|v| v.with_color([255, 0, 0, 255]));
        let param = PolyParam {
            isp: Isp(0).with_depth_mode(6),
            tsp: Tsp(0).with_fog_ctrl(2),
            ..PolyParam::new(0, 0)
        };
        let frame = FrameBuilder::new()
            .strip(ListType::Opaque, &quad, param)
            .build();
        let stats = renderer
            .draw_strips(&mut device, &frame, output, WIDTH, HEIGHT)
            .expect("opaque frame");
        assert_eq!(stats.color_draws, 1);

        let pixels = device.read_output(output).expect("readback");
        let inside = pixel(&pixels, 200, 200);
        let outside = pixel(&pixels, 500, 400);
        assert!(inside[0] > 200, "quad should be red, got {inside:?}");
        assert!(inside[1] < 50 && inside[2] < 50, "quad should be red, got {inside:?}");
        assert_ne!(inside, outside, "background stays untouched");
    }

    // --- Sorted translucency accumulates over the opaque result ---
    {
        let opaque = quad_strip(0.0, 0.0, 640.0, 480.0, 0.5).map(|v| v.with_color([0, 0, 255, 255]));
        let glass = quad_strip(200.0, 200.0, 400.0, 400.0, 1.0).map(|v| v.with_color([0, 255, 0, 128]));
        let frame = FrameBuilder::new()
            .strip(
                ListType::Opaque,
                &opaque,
                PolyParam {
                    isp: Isp(0).with_depth_mode(6),
                    tsp: Tsp(0).with_fog_ctrl(2),
                    ..PolyParam::new(0, 0)
                },
            )
            .strip(
                ListType::Translucent,
                &glass,
                PolyParam {
                    isp: Isp(0).with_depth_mode(6),
                    tsp: Tsp(0)
                        .with_fog_ctrl(2)
                        .with_use_alpha(true)
                        .with_src_instr(4)
                        .with_dst_instr(5),
                    ..PolyParam::new(0, 0)
                },
            )
            .end_pass(true)
            .build();
        let stats = renderer
            .draw_strips(&mut device, &frame, output, WIDTH, HEIGHT)
            .expect("translucent frame");
        assert_eq!(stats.oit_draws, 1);

        let pixels = device.read_output(output).expect("readback");
        let covered = pixel(&pixels, 300, 300);
        let bare = pixel(&pixels, 50, 50);
        assert!(bare[2] > 200 && bare[1] < 50, "opaque background is blue, got {bare:?}");
        assert!(covered[1] > 50, "translucent quad adds green, got {covered:?}");
    }

    // --- Render targets can be recreated at another size ---
    {
        renderer
            .create_textures(&mut device, 320, 240)
            .expect("smaller targets");
        let small = device.create_output_target(320, 240).expect("output");
        let frame = FrameBuilder::new().build();
        renderer
            .draw_strips(&mut device, &frame, small, 320, 240)
            .expect("small frame");
        let pixels = device.read_output(small).expect("readback");
        assert_eq!(pixels.len(), 320 * 240 * 4);
    }
}
