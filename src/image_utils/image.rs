use crate::error::{DetectError, Result};
use image::{DynamicImage, RgbImage, RgbaImage};

/// Sample layout of an [`Image`]. Both formats are 8 bits per channel, interleaved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    pub fn from_channel_count(channels: usize) -> Option<Self> {
        match channels {
            3 => Some(PixelFormat::Rgb8),
            4 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }
}

/// The image type the pipeline consumes and produces.
///
/// Kept independent of any image library so a host can hand over raw camera or decoder
/// buffers; conversions to and from the `image` crate are provided below.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Image {
    /// Wraps a raw interleaved sample buffer, checking it against the declared geometry.
    pub fn from_raw(width: u32, height: u32, channels: usize, data: Vec<u8>) -> Result<Self> {
        let format = PixelFormat::from_channel_count(channels).ok_or_else(|| {
            DetectError::InvalidImage(format!(
                "unsupported pixel format with {} channels, expected RGB8 or RGBA8",
                channels
            ))
        })?;
        let expected = width as usize * height as usize * channels;
        if data.len() != expected {
            return Err(DetectError::InvalidImage(format!(
                "{}x{} {:?} image needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }
        Ok(Image {
            width,
            height,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Red, green and blue of the pixel at (x, y); alpha is dropped.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.format.channels();
        let idx = (y as usize * self.width as usize + x as usize) * channels;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Copies the pixels into an `RgbImage`, dropping alpha if present.
    pub fn to_rgb_image(&self) -> RgbImage {
        match self.format {
            PixelFormat::Rgb8 => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .unwrap_or_else(|| unreachable!("buffer length checked on construction")),
            PixelFormat::Rgba8 => DynamicImage::ImageRgba8(self.to_rgba_image()).into_rgb8(),
        }
    }

    /// Copies the pixels into an `RgbaImage`; RGB input gets an opaque alpha channel.
    pub fn to_rgba_image(&self) -> RgbaImage {
        match self.format {
            PixelFormat::Rgb8 => DynamicImage::ImageRgb8(self.to_rgb_image()).into_rgba8(),
            PixelFormat::Rgba8 => RgbaImage::from_raw(self.width, self.height, self.data.clone())
                .unwrap_or_else(|| unreachable!("buffer length checked on construction")),
        }
    }

    /// Converts an RGBA working copy back into this image's pixel format.
    pub(crate) fn with_format_of(rgba: RgbaImage, format: PixelFormat) -> Image {
        match format {
            PixelFormat::Rgba8 => Image::from(rgba),
            PixelFormat::Rgb8 => Image::from(DynamicImage::ImageRgba8(rgba).into_rgb8()),
        }
    }
}

impl From<RgbImage> for Image {
    fn from(rgb_image: RgbImage) -> Self {
        Image {
            width: rgb_image.width(),
            height: rgb_image.height(),
            format: PixelFormat::Rgb8,
            data: rgb_image.into_raw(),
        }
    }
}

impl From<RgbaImage> for Image {
    fn from(rgba_image: RgbaImage) -> Self {
        Image {
            width: rgba_image.width(),
            height: rgba_image.height(),
            format: PixelFormat::Rgba8,
            data: rgba_image.into_raw(),
        }
    }
}

impl From<DynamicImage> for Image {
    /// Images carrying alpha become RGBA8, everything else (grey, 16 bit, float) RGB8.
    fn from(dynamic_image: DynamicImage) -> Self {
        if dynamic_image.color().has_alpha() {
            Image::from(dynamic_image.into_rgba8())
        } else {
            Image::from(dynamic_image.into_rgb8())
        }
    }
}
