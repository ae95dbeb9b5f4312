//! Data Augmentation Module
//!
//! Random geometric and photometric transforms applied per image while
//! batches are assembled. Two presets cover the experiments:
//!
//! - **Padded crop + flip**: zero-pad by 4, crop back to the original size at a
//!   random offset, mirror horizontally half of the time.
//! - **Rotate / translate / flip / contrast**: random rotation and shift with
//!   reflected borders, independent horizontal and vertical flips, and a mild
//!   per-channel contrast change.
//!
//! Output dimensions always match the input. All randomness comes from the
//! caller's RNG, so a fixed seed reproduces the same augmented batch.

use std::f32::consts::PI;

use image::{imageops, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentationConfig {
    /// Zero padding added on every side before a random crop (0 = no crop)
    pub crop_padding: u32,
    /// Probability of a horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
    /// Probability of a vertical flip (0.0 - 1.0)
    pub vertical_flip_prob: f32,
    /// Rotation range as a fraction of a full turn (angle in ±factor·2π)
    pub rotation_factor: f32,
    /// Shift range as a fraction of height/width
    pub translation_factor: f32,
    /// Contrast factor drawn from [1 - f, 1 + f]
    pub contrast_factor: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self::padded_crop_flip()
    }
}

impl AugmentationConfig {
    /// Random crop of a 4-pixel zero-padded image plus horizontal flip
    pub fn padded_crop_flip() -> Self {
        Self {
            crop_padding: 4,
            horizontal_flip_prob: 0.5,
            ..Self::none()
        }
    }

    /// Rotation, translation, both flips and contrast
    pub fn rotate_translate_flip_contrast() -> Self {
        Self {
            crop_padding: 0,
            horizontal_flip_prob: 0.5,
            vertical_flip_prob: 0.5,
            rotation_factor: 0.15,
            translation_factor: 0.1,
            contrast_factor: 0.1,
        }
    }

    /// Disable all augmentations (for evaluation)
    pub fn none() -> Self {
        Self {
            crop_padding: 0,
            horizontal_flip_prob: 0.0,
            vertical_flip_prob: 0.0,
            rotation_factor: 0.0,
            translation_factor: 0.0,
            contrast_factor: 0.0,
        }
    }

    /// True when `augment` can only return its input unchanged
    pub fn is_identity(&self) -> bool {
        *self == Self::none()
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Apply all configured augmentations in a fixed order:
    /// crop, rotation, translation, flips, contrast.
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let mut result = img.clone();

        if self.config.crop_padding > 0 {
            let max_offset = 2 * self.config.crop_padding;
            let ox = rng.gen_range(0..=max_offset);
            let oy = rng.gen_range(0..=max_offset);
            result = padded_crop(&result, self.config.crop_padding, ox, oy);
        }

        if self.config.rotation_factor > 0.0 {
            let factor = self.config.rotation_factor;
            let angle = rng.gen_range(-factor..=factor) * 2.0 * PI;
            result = rotate(&result, angle);
        }

        if self.config.translation_factor > 0.0 {
            let factor = self.config.translation_factor;
            let (width, height) = result.dimensions();
            let dx = rng.gen_range(-factor..=factor) * width as f32;
            let dy = rng.gen_range(-factor..=factor) * height as f32;
            result = translate(&result, dx, dy);
        }

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            imageops::flip_horizontal_in_place(&mut result);
        }

        if rng.gen::<f32>() < self.config.vertical_flip_prob {
            imageops::flip_vertical_in_place(&mut result);
        }

        if self.config.contrast_factor > 0.0 {
            let factor = self.config.contrast_factor;
            let contrast = rng.gen_range((1.0 - factor).max(0.0)..=1.0 + factor);
            result = adjust_contrast(&result, contrast);
        }

        result
    }
}

/// Crop `img` out of a zero-padded canvas at offset (`ox`, `oy`)
///
/// Offsets are measured on the padded canvas, so `(padding, padding)` returns
/// the input unchanged.
pub fn padded_crop(img: &RgbImage, padding: u32, ox: u32, oy: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let sx = (x + ox) as i64 - padding as i64;
        let sy = (y + oy) as i64 - padding as i64;
        if sx >= 0 && sy >= 0 && sx < width as i64 && sy < height as i64 {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Rotate counter-clockwise by `angle` radians around the image centre
pub fn rotate(img: &RgbImage, angle: f32) -> RgbImage {
    if angle.abs() < 1e-6 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let (sin_a, cos_a) = angle.sin_cos();

    // Inverse mapping: output pixel -> source coordinate
    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let src_x = cx + dx * cos_a - dy * sin_a;
        let src_y = cy + dx * sin_a + dy * cos_a;
        bilinear_sample_reflect(img, src_x, src_y)
    })
}

/// Shift the image content by (`dx`, `dy`) pixels
pub fn translate(img: &RgbImage, dx: f32, dy: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        bilinear_sample_reflect(img, x as f32 - dx, y as f32 - dy)
    })
}

/// Scale each channel's distance from its mean by `factor`
pub fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let count = (img.width() as f64 * img.height() as f64).max(1.0);
    let mut sums = [0.0f64; 3];
    for pixel in img.pixels() {
        for c in 0..3 {
            sums[c] += pixel[c] as f64;
        }
    }
    let means = sums.map(|s| (s / count) as f32);

    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for c in 0..3 {
            let v = (pixel[c] as f32 - means[c]) * factor + means[c];
            pixel[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Mirror an out-of-range index back into `0..len` (`d c b a | a b c d | d c b a`)
fn reflect_index(i: i64, len: i64) -> u32 {
    let period = 2 * len;
    let m = i.rem_euclid(period);
    (if m < len { m } else { period - 1 - m }) as u32
}

/// Sample a pixel using bilinear interpolation with reflected borders
fn bilinear_sample_reflect(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    let (w, h) = (width as i64, height as i64);

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let xa = reflect_index(x0, w);
    let xb = reflect_index(x0 + 1, w);
    let ya = reflect_index(y0, h);
    let yb = reflect_index(y0 + 1, h);

    let p00 = img.get_pixel(xa, ya);
    let p10 = img.get_pixel(xb, ya);
    let p01 = img.get_pixel(xa, yb);
    let p11 = img.get_pixel(xb, yb);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]))
    }

    #[test]
    fn test_presets() {
        let wrn = AugmentationConfig::padded_crop_flip();
        assert_eq!(wrn.crop_padding, 4);
        assert_eq!(wrn.vertical_flip_prob, 0.0);

        let mobile = AugmentationConfig::rotate_translate_flip_contrast();
        assert_eq!(mobile.rotation_factor, 0.15);
        assert_eq!(mobile.translation_factor, 0.1);
        assert_eq!(mobile.contrast_factor, 0.1);

        assert!(AugmentationConfig::none().is_identity());
        assert!(!mobile.is_identity());
    }

    #[test]
    fn test_none_is_identity() {
        let aug = Augmenter::new(AugmentationConfig::none());
        let img = create_test_image(32, 32);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(aug.augment(&img, &mut rng), img);
    }

    #[test]
    fn test_dimensions_preserved() {
        let img = create_test_image(48, 40);
        for config in [
            AugmentationConfig::padded_crop_flip(),
            AugmentationConfig::rotate_translate_flip_contrast(),
        ] {
            let aug = Augmenter::new(config);
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            for _ in 0..5 {
                assert_eq!(aug.augment(&img, &mut rng).dimensions(), (48, 40));
            }
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let aug = Augmenter::new(AugmentationConfig::rotate_translate_flip_contrast());
        let img = create_test_image(32, 32);
        let a = aug.augment(&img, &mut ChaCha8Rng::seed_from_u64(3));
        let b = aug.augment(&img, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_padded_crop() {
        let img = create_test_image(32, 32);
        assert_eq!(padded_crop(&img, 4, 4, 4), img);

        // Offset (0, 0) shifts content down-right, exposing zero padding
        let shifted = padded_crop(&img, 4, 0, 0);
        assert_eq!(shifted.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(shifted.get_pixel(4, 4), img.get_pixel(0, 0));
        assert_eq!(shifted.get_pixel(31, 31), img.get_pixel(27, 27));
    }

    #[test]
    fn test_translate_reflects_border() {
        let img = create_test_image(16, 16);
        let shifted = translate(&img, 2.0, 0.0);
        assert_eq!(shifted.get_pixel(5, 3), img.get_pixel(3, 3));
        // Column 0 reads source column -2, mirrored to column 1
        assert_eq!(shifted.get_pixel(0, 3), img.get_pixel(1, 3));
    }

    #[test]
    fn test_rotate_half_turn() {
        let img = create_test_image(9, 9);
        let rotated = rotate(&img, PI);
        assert_eq!(rotated.get_pixel(0, 0), img.get_pixel(8, 8));
        assert_eq!(rotated.get_pixel(4, 4), img.get_pixel(4, 4));
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        assert_eq!(reflect_index(2, 4), 2);
    }

    #[test]
    fn test_contrast_keeps_channel_mean() {
        let img = create_test_image(32, 32);
        let flat = adjust_contrast(&img, 1.0);
        assert_eq!(flat, img);

        let stretched = adjust_contrast(&img, 1.1);
        // Blue channel is constant, so it cannot change
        assert!(stretched.pixels().all(|p| p[2] == 128));
        // Red spreads away from its mean
        assert!(stretched.get_pixel(0, 0)[0] < img.get_pixel(0, 0)[0] || img.get_pixel(0, 0)[0] == 0);
        assert!(stretched.get_pixel(31, 0)[0] > img.get_pixel(31, 0)[0]);
    }
}
