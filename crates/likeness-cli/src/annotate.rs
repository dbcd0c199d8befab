//! Annotated copy of a query image: a box and a caption per classified face.

use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use likeness_core::ClassificationResult;
use std::path::{Path, PathBuf};

/// DejaVu Sans Mono, see `assets/DejaVuSansMono.LICENSE`.
const CAPTION_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");
const CAPTION_SCALE: f32 = 14.0;
const CAPTION_PADDING: u32 = 2;
const OUTLINE_THICKNESS: u32 = 2;
const KNOWN_COLOUR: Rgb<u8> = Rgb([0, 160, 0]);
const UNKNOWN_COLOUR: Rgb<u8> = Rgb([200, 30, 30]);
const TEXT_COLOUR: Rgb<u8> = Rgb([255, 255, 255]);

/// `<dir>/<stem>_result.jpg` next to the input image.
pub fn result_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_result.jpg"))
}

/// Draws classification results with the bundled caption font.
pub struct Annotator {
    font: FontRef<'static>,
    scale: PxScale,
}

impl Annotator {
    pub fn new() -> Result<Self, InvalidFont> {
        Ok(Self {
            font: FontRef::try_from_slice(CAPTION_FONT)?,
            scale: PxScale::from(CAPTION_SCALE),
        })
    }

    /// Copy of `image` with an outline and a `"<label> - <conf> - <index>"`
    /// caption for every face.
    pub fn draw(&self, image: &DynamicImage, results: &[ClassificationResult]) -> RgbImage {
        let mut canvas = image.to_rgb8();
        let (width, height) = canvas.dimensions();

        for (index, result) in results.iter().enumerate() {
            let colour = if result.is_unknown() { UNKNOWN_COLOUR } else { KNOWN_COLOUR };
            let rect = result.bbox.to_pixel_rect(width, height);
            draw_outline(&mut canvas, rect, colour);
            self.draw_caption(&mut canvas, rect, &result.caption(index), colour);
        }
        canvas
    }

    fn draw_caption(&self, canvas: &mut RgbImage, rect: (u32, u32, u32, u32), caption: &str, colour: Rgb<u8>) {
        let (text_w, text_h) = text_size(self.scale, &self.font, caption);
        let label_size = (text_w + 2 * CAPTION_PADDING, text_h + 2 * CAPTION_PADDING);
        let (x, y) = caption_origin(rect, label_size, canvas.dimensions());

        draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(label_size.0, label_size.1), colour);
        let pad = CAPTION_PADDING as i32;
        draw_text_mut(canvas, TEXT_COLOUR, x + pad, y + pad, self.scale, &self.font, caption);
    }
}

/// Top-left corner of a caption label: above the box when it fits, otherwise
/// just inside its top edge; shifted left to stay within the image.
fn caption_origin(rect: (u32, u32, u32, u32), label: (u32, u32), image: (u32, u32)) -> (i32, i32) {
    let (x, y, _, _) = rect;
    let (label_w, label_h) = label;
    let y = if y >= label_h { y - label_h } else { y };
    let x = x.min(image.0.saturating_sub(label_w));
    (x as i32, y as i32)
}

fn draw_outline(canvas: &mut RgbImage, rect: (u32, u32, u32, u32), colour: Rgb<u8>) {
    let (x, y, w, h) = rect;
    for inset in 0..OUTLINE_THICKNESS {
        if w <= 2 * inset || h <= 2 * inset {
            break;
        }
        let outline = Rect::at((x + inset) as i32, (y + inset) as i32).of_size(w - 2 * inset, h - 2 * inset);
        draw_hollow_rect_mut(canvas, outline, colour);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use likeness_core::BoundingBox;

    const GREY: Rgb<u8> = Rgb([128, 128, 128]);

    fn result(label: &str, bbox: BoundingBox) -> ClassificationResult {
        ClassificationResult {
            label: label.to_string(),
            confidence: 0.8,
            bbox,
        }
    }

    #[test]
    fn test_result_path() {
        assert_eq!(
            result_path(Path::new("/tmp/query/group.png")),
            PathBuf::from("/tmp/query/group_result.jpg")
        );
        assert_eq!(result_path(Path::new("solo.jpeg")), PathBuf::from("solo_result.jpg"));
    }

    #[test]
    fn test_outline_only_edges() {
        let mut canvas = RgbImage::from_pixel(100, 100, GREY);
        draw_outline(&mut canvas, (10, 10, 40, 40), KNOWN_COLOUR);

        assert_eq!(*canvas.get_pixel(10, 10), KNOWN_COLOUR);
        assert_eq!(*canvas.get_pixel(11, 30), KNOWN_COLOUR);
        assert_eq!(*canvas.get_pixel(49, 30), KNOWN_COLOUR);
        assert_eq!(*canvas.get_pixel(30, 48), KNOWN_COLOUR);
        assert_eq!(*canvas.get_pixel(12, 30), GREY);
        assert_eq!(*canvas.get_pixel(30, 30), GREY);
        assert_eq!(*canvas.get_pixel(5, 5), GREY);
    }

    #[test]
    fn test_single_pixel_outline() {
        let mut canvas = RgbImage::from_pixel(10, 10, GREY);
        draw_outline(&mut canvas, (5, 5, 1, 1), UNKNOWN_COLOUR);
        assert_eq!(*canvas.get_pixel(5, 5), UNKNOWN_COLOUR);
        assert_eq!(canvas.pixels().filter(|p| **p != GREY).count(), 1);
    }

    #[test]
    fn test_caption_origin() {
        // Room above the box.
        assert_eq!(caption_origin((40, 50, 30, 30), (60, 20), (200, 200)), (40, 30));
        // Box touching the top edge: caption goes inside.
        assert_eq!(caption_origin((40, 5, 30, 30), (60, 20), (200, 200)), (40, 5));
        // Box near the right edge: caption shifts left.
        assert_eq!(caption_origin((180, 50, 20, 20), (60, 20), (200, 200)), (140, 30));
        // Caption wider than the image starts at the left edge.
        assert_eq!(caption_origin((10, 50, 20, 20), (300, 20), (200, 200)), (0, 30));
    }

    #[test]
    fn test_draw_writes_caption_above_box() {
        let annotator = Annotator::new().unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(600, 200, GREY));
        let results = vec![
            result("madonna", BoundingBox::new(0.1, 0.5, 0.3, 0.3)),
            ClassificationResult::unknown(BoundingBox::new(0.6, 0.5, 0.3, 0.3)),
        ];

        let canvas = annotator.draw(&image, &results);

        // Label background sits directly above each box's top-left corner.
        assert_eq!(*canvas.get_pixel(60, 99), KNOWN_COLOUR);
        assert_eq!(*canvas.get_pixel(360, 99), UNKNOWN_COLOUR);
        // Glyphs were rendered inside the label strip.
        let strip_has_text = (80..100)
            .flat_map(|y| (60..200).map(move |x| (x, y)))
            .any(|(x, y)| {
                let p = *canvas.get_pixel(x, y);
                p != KNOWN_COLOUR && p != GREY
            });
        assert!(strip_has_text);
        // Box interiors are untouched.
        assert_eq!(*canvas.get_pixel(150, 130), GREY);
        assert_eq!(*canvas.get_pixel(450, 130), GREY);
    }

    #[test]
    fn test_draw_without_faces_is_a_copy() {
        let annotator = Annotator::new().unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, GREY));
        assert!(annotator.draw(&image, &[]).pixels().all(|p| *p == GREY));
    }
}
