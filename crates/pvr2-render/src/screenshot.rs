//! Writing rendered frames to image files.

use std::path::Path;

use image::{ImageBuffer, Rgba};

/// Error type for frame capture.
#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    #[error("failed to save image: {0}")]
    IoError(#[from] std::io::Error),

    #[error("image encoding error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("expected {expected} bytes of RGBA data, got {actual}")]
    InvalidImageData { expected: usize, actual: usize },
}

fn to_image(
    rgba: &[u8],
    width: u32,
    height: u32,
) -> Result<ImageBuffer<Rgba<u8>, Vec<u8>>, ScreenshotError> {
    let expected = width as usize * height as usize * 4;
    ImageBuffer::from_raw(width, height, rgba.to_vec()).ok_or(ScreenshotError::InvalidImageData {
        expected,
        actual: rgba.len(),
    })
}

/// Saves tightly packed RGBA8 rows, top row first, to `path`.
///
/// The format follows the extension: `png`, or `jpg`/`jpeg` with alpha
/// dropped.
pub fn save_image(
    path: impl AsRef<Path>,
    rgba: &[u8],
    width: u32,
    height: u32,
) -> Result<(), ScreenshotError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let img = to_image(rgba, width, height)?;
    match extension.as_str() {
        "png" => img.save_with_format(path, image::ImageFormat::Png)?,
        "jpg" | "jpeg" => {
            let rgb = image::DynamicImage::ImageRgba8(img).to_rgb8();
            rgb.save_with_format(path, image::ImageFormat::Jpeg)?;
        }
        _ => return Err(ScreenshotError::UnsupportedFormat(extension)),
    }
    log::info!("saved {width}x{height} frame to {}", path.display());
    Ok(())
}

/// Encodes RGBA8 pixels as PNG in memory.
pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ScreenshotError> {
    let img = to_image(rgba, width, height)?;
    let mut buffer = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_png_signature() {
        let png = encode_png(&[255; 2 * 2 * 4], 2, 2).unwrap();
        assert_eq!(&png[..4], b"\x89PNG", "output must be a PNG stream");
    }

    #[test]
    fn test_short_buffer_rejected() {
        let err = encode_png(&[0; 12], 2, 2).unwrap_err();
        assert!(matches!(
            err,
            ScreenshotError::InvalidImageData {
                expected: 16,
                actual: 12
            }
        ));
    }

    #[test]
    fn test_unknown_extension() {
        let err = save_image("frame.tga", &[0; 4], 1, 1).unwrap_err();
        assert!(matches!(err, ScreenshotError::UnsupportedFormat(ext) if ext == "tga"));
    }
}
