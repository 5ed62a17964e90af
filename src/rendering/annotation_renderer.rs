use crate::annotations::detection::{Detection, ImageSpace};
use crate::error::{DetectError, Result};
use crate::image_utils::image::Image;
use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

pub const LABEL_FONT_SIZE: f32 = 20.0;
// Rough average glyph advance relative to font size, used only to size label tabs when no
// font is loaded.
const LABEL_CHAR_WIDTH_RATIO: f32 = 0.55;
const LABEL_PADDING: i32 = 2;
pub const BOX_THICKNESS: u32 = 2;
const TEXT_COLOR: [u8; 4] = [255, 255, 255, 255];

/// Default box colours, picked by class id.
const PALETTE: [[u8; 3]; 6] = [
    [0, 0, 255],
    [255, 56, 56],
    [72, 249, 10],
    [255, 157, 151],
    [0, 194, 255],
    [255, 178, 29],
];

/// Draws detections onto a copy of an image.
///
/// Each detection gets a hollow rectangle in its class colour and a filled label tab above it
/// (inside the box when there is no room above) reading `"<class> <confidence>"`. Text is only
/// rendered when a font has been supplied. Boxes are drawn without anti-aliasing and glyph
/// coverage blending is deterministic, so equal inputs give pixel-identical output. The
/// renderer holds no mutable state and can be shared between threads.
#[derive(Clone)]
pub struct AnnotationRenderer {
    font: Option<FontArc>,
    class_names: Vec<String>,
    font_size: f32,
    thickness: u32,
    palette: Vec<[u8; 3]>,
}

impl Default for AnnotationRenderer {
    fn default() -> Self {
        AnnotationRenderer {
            font: None,
            class_names: Vec::new(),
            font_size: LABEL_FONT_SIZE,
            thickness: BOX_THICKNESS,
            palette: PALETTE.to_vec(),
        }
    }
}

impl AnnotationRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Loads a TrueType/OpenType font for label text.
    pub fn with_font_file(self, font_path: &Path) -> Result<Self> {
        let bytes = std::fs::read(font_path).map_err(|e| DetectError::io(font_path, e))?;
        let font = FontArc::try_from_vec(bytes).map_err(|e| {
            DetectError::InvalidConfig(format!("{}: {}", font_path.display(), e))
        })?;
        Ok(self.with_font(font))
    }

    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = class_names;
        self
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.font_size = font_size;
        self
    }

    /// Replaces the box colours; class `i` uses `palette[i % len]`. An empty palette keeps the
    /// current one.
    pub fn with_palette(mut self, palette: Vec<[u8; 3]>) -> Self {
        if !palette.is_empty() {
            self.palette = palette;
        }
        self
    }

    fn color_for(&self, class_id: usize) -> Rgba<u8> {
        let [r, g, b] = self.palette[class_id % self.palette.len()];
        Rgba([r, g, b, 255])
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Class name for `class_id`, or the id itself when no name is known.
    pub fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }

    pub fn label(&self, detection: &Detection<ImageSpace>) -> String {
        format!("{} {:.2}", self.class_name(detection.class_id()), detection.confidence())
    }

    /// Returns a new image with every detection drawn on it; `image` is left untouched.
    pub fn annotate(&self, image: &Image, detections: &[Detection<ImageSpace>]) -> Result<Image> {
        if image.is_empty() {
            return Err(DetectError::InvalidImage(format!(
                "cannot annotate a {}x{} image",
                image.width(),
                image.height()
            )));
        }
        let mut canvas = image.to_rgba_image();
        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }
        Ok(Image::with_format_of(canvas, image.format()))
    }

    fn draw_detection(&self, canvas: &mut RgbaImage, detection: &Detection<ImageSpace>) {
        let (w, h) = (canvas.width() as i32, canvas.height() as i32);
        let rect = detection.rect();
        let x_min = (rect.left().floor() as i32).clamp(0, w - 1);
        let y_min = (rect.top().floor() as i32).clamp(0, h - 1);
        let x_max = ((rect.right().ceil() as i32) - 1).clamp(0, w - 1);
        let y_max = ((rect.bottom().ceil() as i32) - 1).clamp(0, h - 1);
        if x_min > x_max || y_min > y_max {
            return;
        }
        let color = self.color_for(detection.class_id());

        for inset in 0..self.thickness as i32 {
            let box_w = x_max - x_min + 1 - 2 * inset;
            let box_h = y_max - y_min + 1 - 2 * inset;
            if box_w <= 0 || box_h <= 0 {
                break;
            }
            let outline = Rect::at(x_min + inset, y_min + inset).of_size(box_w as u32, box_h as u32);
            draw_hollow_rect_mut(canvas, outline, color);
        }

        let label = self.label(detection);
        let scale = PxScale::from(self.font_size);
        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, &label),
            None => (
                (label.chars().count() as f32 * self.font_size * LABEL_CHAR_WIDTH_RATIO) as u32,
                self.font_size as u32,
            ),
        };
        let tab_w = (text_w as i32 + 2 * LABEL_PADDING).min(w - x_min);
        let tab_h = (text_h as i32 + 2 * LABEL_PADDING).min(h);
        if tab_w <= 0 || tab_h <= 0 {
            return;
        }
        let tab_y = if y_min - tab_h >= 0 { y_min - tab_h } else { y_min };
        let tab = Rect::at(x_min, tab_y).of_size(tab_w as u32, tab_h as u32);
        draw_filled_rect_mut(canvas, tab, color);

        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                Rgba(TEXT_COLOR),
                x_min + LABEL_PADDING,
                tab_y + LABEL_PADDING,
                scale,
                font,
                &label,
            );
        }
    }
}
