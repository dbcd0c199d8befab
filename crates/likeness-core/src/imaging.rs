//! Image file helpers: content sniffing, oriented decoding, cropping, rotation.

use crate::types::{BoundingBox, DetectedFace};
use image::{DynamicImage, ImageDecoder, ImageReader, ImageResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes read from the head of a file when sniffing its format.
const SNIFF_LEN: u64 = 64;

/// Check whether a file's leading bytes identify a known image format.
///
/// Directories, unreadable files and unknown formats are all `false`.
pub fn is_image(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    if file.take(SNIFF_LEN).read_to_end(&mut head).is_err() {
        return false;
    }
    image::guess_format(&head).is_ok()
}

/// Decode an image and apply its EXIF orientation, if any.
pub fn load_oriented(path: &Path) -> ImageResult<DynamicImage> {
    let mut decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Crop a normalized bounding box out of an image, clamped to its bounds.
pub fn crop(image: &DynamicImage, bbox: &BoundingBox) -> DynamicImage {
    let (x, y, w, h) = bbox.to_pixel_rect(image.width(), image.height());
    image.crop_imm(x, y, w, h)
}

/// Pick the face with the largest normalized area; ties keep the first seen.
pub fn select_largest(faces: &[DetectedFace]) -> Option<&DetectedFace> {
    let mut best: Option<&DetectedFace> = None;
    for face in faces {
        match best {
            Some(current) if face.bbox.area() <= current.bbox.area() => {}
            _ => best = Some(face),
        }
    }
    best
}

/// Rotate counter-clockwise by `quarter_turns * 90` degrees.
pub fn rotate_quarter_turns(image: &DynamicImage, quarter_turns: u32) -> DynamicImage {
    match quarter_turns % 4 {
        1 => image.rotate270(),
        2 => image.rotate180(),
        3 => image.rotate90(),
        _ => image.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaceClass;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn face(x: f32, y: f32, w: f32, h: f32) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox::new(x, y, w, h),
            class: FaceClass::Face,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_is_image_sniffs_content() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("photo.png");
        RgbImage::new(4, 4).save(&png).unwrap();

        // Extension lies, content wins.
        let disguised = dir.path().join("photo.txt");
        fs::copy(&png, &disguised).unwrap();
        let text = dir.path().join("notes.jpg");
        fs::write(&text, "not an image at all").unwrap();

        assert!(is_image(&png));
        assert!(is_image(&disguised));
        assert!(!is_image(&text));
        assert!(!is_image(dir.path()));
        assert!(!is_image(&dir.path().join("missing.png")));
    }

    #[test]
    fn test_load_oriented_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbImage::new(30, 10).save(&path).unwrap();

        let image = load_oriented(&path).unwrap();
        assert_eq!((image.width(), image.height()), (30, 10));
    }

    #[test]
    fn test_load_oriented_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"\x89PNG\r\n\x1a\ntruncated").unwrap();
        assert!(load_oriented(&path).is_err());
    }

    #[test]
    fn test_crop_clamped() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 50));
        let cropped = crop(&image, &BoundingBox::new(0.9, -0.2, 0.5, 0.6));
        assert_eq!((cropped.width(), cropped.height()), (10, 30));
    }

    #[test]
    fn test_select_largest_by_area() {
        let faces = vec![face(0.0, 0.0, 0.1, 0.1), face(0.5, 0.5, 0.3, 0.2), face(0.2, 0.2, 0.2, 0.2)];
        let largest = select_largest(&faces).unwrap();
        assert!((largest.bbox.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_select_largest_tie_keeps_first() {
        let faces = vec![face(0.1, 0.0, 0.2, 0.2), face(0.6, 0.0, 0.2, 0.2)];
        let largest = select_largest(&faces).unwrap();
        assert!((largest.bbox.x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_select_largest_zero_area() {
        let faces = vec![face(0.3, 0.0, 0.0, 0.0)];
        assert!(select_largest(&faces).is_some());
        assert!(select_largest(&[]).is_none());
    }

    #[test]
    fn test_rotate_counter_clockwise() {
        // 2x1: red on the left, blue on the right.
        let mut source = RgbImage::new(2, 1);
        source.put_pixel(0, 0, Rgb([255, 0, 0]));
        source.put_pixel(1, 0, Rgb([0, 0, 255]));
        let image = DynamicImage::ImageRgb8(source);

        let quarter = rotate_quarter_turns(&image, 1).to_rgb8();
        assert_eq!(quarter.dimensions(), (1, 2));
        assert_eq!(quarter.get_pixel(0, 0), &Rgb([0, 0, 255]));

        let half = rotate_quarter_turns(&image, 2).to_rgb8();
        assert_eq!(half.dimensions(), (2, 1));
        assert_eq!(half.get_pixel(0, 0), &Rgb([0, 0, 255]));

        assert_eq!(rotate_quarter_turns(&image, 4), image);
    }
}
