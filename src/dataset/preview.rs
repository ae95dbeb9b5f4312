//! Sample previews
//!
//! Writes 3x3 contact sheets so a run can be sanity-checked by eye: the first
//! nine training images, and nine random augmentations of a single image.

use std::path::Path;

use image::{imageops, Rgb, RgbImage};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::dataset::augmentation::Augmenter;
use crate::dataset::burn_dataset::CifarItem;
use crate::dataset::cifar10::class_name;
use crate::utils::error::{CifarError, Result};

const GRID_SIDE: u32 = 3;
const GAP: u32 = 2;

/// Tile up to nine equally sized images into a 3x3 grid on a white background
pub fn compose_grid(images: &[RgbImage]) -> Result<RgbImage> {
    let first = images
        .first()
        .ok_or_else(|| CifarError::Dataset("no images to preview".to_string()))?;
    let (cell_w, cell_h) = first.dimensions();

    let width = GRID_SIDE * cell_w + (GRID_SIDE + 1) * GAP;
    let height = GRID_SIDE * cell_h + (GRID_SIDE + 1) * GAP;
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    for (i, img) in images.iter().take((GRID_SIDE * GRID_SIDE) as usize).enumerate() {
        if img.dimensions() != (cell_w, cell_h) {
            return Err(CifarError::Image(format!(
                "preview image {} is {:?}, expected {:?}",
                i,
                img.dimensions(),
                (cell_w, cell_h)
            )));
        }
        let col = i as u32 % GRID_SIDE;
        let row = i as u32 / GRID_SIDE;
        let x = GAP + col * (cell_w + GAP);
        let y = GAP + row * (cell_h + GAP);
        imageops::replace(&mut canvas, img, x as i64, y as i64);
    }

    Ok(canvas)
}

/// Save the first nine items as a grid and log their labels
pub fn save_sample_grid(items: &[CifarItem], path: &Path) -> Result<()> {
    let shown: Vec<&CifarItem> = items.iter().take(9).collect();
    for (i, item) in shown.iter().enumerate() {
        info!(
            "Sample {}: label {} ({})",
            i + 1,
            item.label,
            class_name(item.label).unwrap_or("unknown")
        );
    }

    let images: Vec<RgbImage> = shown.iter().map(|item| item.image.clone()).collect();
    compose_grid(&images)?.save(path)?;
    info!("Saved sample grid to {:?}", path);
    Ok(())
}

/// Save nine independent augmentations of `image` as a grid
pub fn save_augmented_grid(
    image: &RgbImage,
    augmenter: &Augmenter,
    rng: &mut ChaCha8Rng,
    path: &Path,
) -> Result<()> {
    let images: Vec<RgbImage> = (0..9).map(|_| augmenter.augment(image, rng)).collect();
    compose_grid(&images)?.save(path)?;
    info!("Saved augmented samples to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use rand::SeedableRng;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb([value, value, value]))
    }

    #[test]
    fn test_grid_layout() {
        let images: Vec<RgbImage> = (0..9).map(|i| solid(i * 10)).collect();
        let grid = compose_grid(&images).unwrap();

        assert_eq!(grid.dimensions(), (3 * 8 + 4 * GAP, 3 * 8 + 4 * GAP));
        // Gap stays white, cell (row 1, col 2) holds image 5
        assert_eq!(grid.get_pixel(0, 0).0, [255, 255, 255]);
        let x = GAP + 2 * (8 + GAP);
        let y = GAP + (8 + GAP);
        assert_eq!(grid.get_pixel(x, y).0, [50, 50, 50]);
    }

    #[test]
    fn test_grid_rejects_empty_and_mismatched() {
        assert!(compose_grid(&[]).is_err());
        let mixed = vec![solid(0), RgbImage::new(4, 4)];
        assert!(matches!(compose_grid(&mixed), Err(CifarError::Image(_))));
    }

    #[test]
    fn test_save_grids() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<CifarItem> = (0..12)
            .map(|i| CifarItem {
                image: solid(i as u8),
                label: i % 10,
            })
            .collect();

        let samples = dir.path().join("samples.png");
        save_sample_grid(&items, &samples).unwrap();
        assert_eq!(image::open(&samples).unwrap().width(), 3 * 8 + 4 * GAP);

        let augmented = dir.path().join("augmented_samples.png");
        let augmenter = Augmenter::new(AugmentationConfig::rotate_translate_flip_contrast());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        save_augmented_grid(&items[0].image, &augmenter, &mut rng, &augmented).unwrap();
        assert!(augmented.exists());
    }
}
