//! Rotation augmentation: densifies a label's reference set from one crop.

use crate::encoder::FaceEncoder;
use crate::imaging;
use crate::types::Embedding;
use image::DynamicImage;

/// Counter-clockwise quarter turns applied to each crop: 90° and 180°. No 270°.
const AUGMENT_QUARTER_TURNS: [u32; 2] = [1, 2];

/// Encode rotated variants of a face crop.
///
/// Returns at most two embeddings in rotation order. A variant that fails to
/// encode is logged and left out; the caller's base embedding is unaffected.
pub fn augment(face: &DynamicImage, encoder: &dyn FaceEncoder) -> Vec<Embedding> {
    AUGMENT_QUARTER_TURNS
        .iter()
        .filter_map(|&turns| {
            let rotated = imaging::rotate_quarter_turns(face, turns);
            match encoder.embed(&rotated) {
                Ok(embedding) => Some(embedding),
                Err(err) => {
                    tracing::warn!(degrees = turns * 90, error = %err, "augmented face encoding failed; skipping variant");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEncoder;
    use image::RgbImage;

    #[test]
    fn test_augment_adds_two_rotations() {
        let face = DynamicImage::ImageRgb8(RgbImage::new(20, 10));
        let encoder = FakeEncoder::default();

        let extra = augment(&face, &encoder);

        assert_eq!(extra.len(), 2);
        assert_eq!(encoder.calls(), 2);
        // 90°: width and height swap; 180°: they do not.
        assert_eq!(&extra[0].values[3..], &[10.0, 20.0]);
        assert_eq!(&extra[1].values[3..], &[20.0, 10.0]);
    }

    #[test]
    fn test_augment_skips_failed_variant() {
        let face = DynamicImage::ImageRgb8(RgbImage::new(20, 10));
        let encoder = FakeEncoder::failing_on_portrait();

        let extra = augment(&face, &encoder);

        assert_eq!(encoder.calls(), 2);
        assert_eq!(extra.len(), 1);
        assert_eq!(&extra[0].values[3..], &[20.0, 10.0]);
    }
}
