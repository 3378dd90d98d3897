use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pvr2_core::{FrameData, RenderSettings, TextureId};
use pvr2_render::{save_image, FrameStats, GraphicsDevice, RecordingDevice, Renderer, WgpuDevice};

#[derive(Parser)]
#[command(name = "pvr2-replay")]
#[command(about = "Replays a captured PowerVR2 frame", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Captured frame (JSON)
    frame: PathBuf,

    /// Render settings (JSON), defaults when omitted
    #[arg(global = true, short, long)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the frame through the recording device and print pipeline statistics
    Stats {
        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render the frame offscreen and write an image
    Render {
        /// Output image (png or jpg)
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "640")]
        width: u32,

        #[arg(long, default_value = "480")]
        height: u32,

        /// Texture cache entry as `<id>=<image>`, may be repeated
        #[arg(long = "texture", value_parser = parse_texture)]
        textures: Vec<(TextureId, PathBuf)>,
    },
}

fn parse_texture(arg: &str) -> Result<(TextureId, PathBuf), String> {
    let (id, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected <id>=<image>, got '{arg}'"))?;
    let id = match id.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => id.parse(),
    }
    .map_err(|e| format!("invalid texture id '{id}': {e}"))?;
    Ok((TextureId(id), PathBuf::from(path)))
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<RenderSettings> {
    let Some(path) = path else {
        return Ok(RenderSettings::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing settings {}", path.display()))
}

fn print_stats(stats: &FrameStats, json: bool) {
    if json {
        let value = serde_json::json!({
            "passes_drawn": stats.passes_drawn,
            "passes_skipped": stats.passes_skipped,
            "depth_draws": stats.depth_draws,
            "color_draws": stats.color_draws,
            "oit_draws": stats.oit_draws,
            "modvol_draws": stats.modvol_draws,
            "depth_blits": stats.depth_blits,
            "resolves": stats.resolves,
        });
        println!("{value}");
        return;
    }
    println!("passes drawn:   {}", stats.passes_drawn);
    println!("passes skipped: {}", stats.passes_skipped);
    println!("depth draws:    {}", stats.depth_draws);
    println!("color draws:    {}", stats.color_draws);
    println!("sorted draws:   {}", stats.oit_draws);
    println!("volume draws:   {}", stats.modvol_draws);
    println!("depth blits:    {}", stats.depth_blits);
    println!("resolves:       {}", stats.resolves);
}

fn stats(frame: &FrameData, settings: RenderSettings, json: bool) -> anyhow::Result<()> {
    let mut device = RecordingDevice::new();
    let mut renderer = Renderer::new(settings);
    renderer.create_textures(&mut device, 640, 480)?;
    let output = device.create_framebuffer();
    let color = device.create_color_texture(640, 480)?;
    device.attach_color(output, Some(color));

    let stats = renderer.draw_strips(&mut device, frame, output, 640, 480)?;
    log::debug!(
        "{} device calls, {} programs",
        device.commands().len(),
        device.compile_count()
    );
    print_stats(&stats, json);
    Ok(())
}

fn render(
    frame: &FrameData,
    settings: RenderSettings,
    output: &Path,
    width: u32,
    height: u32,
    textures: &[(TextureId, PathBuf)],
) -> anyhow::Result<()> {
    if width == 0 || height == 0 {
        bail!("output size must be non-zero, got {width}x{height}");
    }
    let mut device = pollster::block_on(WgpuDevice::new_headless())
        .context("creating headless graphics device")?;

    for (id, path) in textures {
        let image = image::open(path)
            .with_context(|| format!("loading texture {}", path.display()))?
            .to_rgba8();
        device.register_texture(*id, image.width(), image.height(), image.as_raw())?;
    }

    let mut renderer = Renderer::new(settings);
    renderer.create_textures(&mut device, width, height)?;
    let target = device.create_output_target(width, height)?;
    let stats = renderer.draw_strips(&mut device, frame, target, width, height)?;
    log::info!(
        "rendered {} polygon draws in {} passes",
        stats.polygon_draws(),
        stats.passes_drawn
    );

    let pixels = device.read_output(target)?;
    save_image(output, &pixels, width, height)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let frame = FrameData::load(&cli.frame)
        .with_context(|| format!("loading frame {}", cli.frame.display()))?;
    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Stats { json } => stats(&frame, settings, json),
        Commands::Render {
            output,
            width,
            height,
            textures,
        } => render(&frame, settings, &output, width, height, &textures),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_texture() {
        let (id, path) = parse_texture("0x1f=tex/wall.png").expect("hex id");
        assert_eq!(id, TextureId(0x1f));
        assert_eq!(path, PathBuf::from("tex/wall.png"));

        let (id, _) = parse_texture("12=a.png").expect("decimal id");
        assert_eq!(id, TextureId(12));

        assert!(parse_texture("wall.png").is_err(), "id is required");
        assert!(parse_texture("zz=wall.png").is_err());
    }

    #[test]
    fn test_default_settings_without_file() {
        let settings = load_settings(None).expect("defaults");
        assert_eq!(settings, RenderSettings::default());
    }
}
