use crate::error::{DetectError, Result};
use crate::image_utils::image::{Image, PixelFormat};
use image::{ImageError, RgbImage};
use std::path::Path;

fn image_error(filepath: &Path, err: ImageError) -> DetectError {
    match err {
        ImageError::IoError(source) => DetectError::io(filepath, source),
        other => DetectError::InvalidImage(format!("{}: {}", filepath.display(), other)),
    }
}

/// Decodes an image file into the pipeline's image type.
pub fn read_image(filepath: &Path) -> Result<Image> {
    let dynamic_image = image::open(filepath).map_err(|e| image_error(filepath, e))?;
    Ok(Image::from(dynamic_image))
}

pub fn read_image_as_rgb8(filepath: &Path) -> Result<RgbImage> {
    Ok(read_image(filepath)?.to_rgb_image())
}

/// Writes an image, picking the encoder from the file extension.
pub fn save_image(image: &Image, filepath: &Path) -> Result<()> {
    let saved = match image.format() {
        PixelFormat::Rgb8 => image.to_rgb_image().save(filepath),
        // JPEG has no alpha channel.
        PixelFormat::Rgba8 if is_jpeg(filepath) => image.to_rgb_image().save(filepath),
        PixelFormat::Rgba8 => image.to_rgba_image().save(filepath),
    };
    saved.map_err(|e| image_error(filepath, e))
}

fn is_jpeg(filepath: &Path) -> bool {
    filepath
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}
