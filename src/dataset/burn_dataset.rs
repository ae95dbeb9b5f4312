//! Burn Dataset Integration for CIFAR-10
//!
//! Implements Burn's `Dataset` and `Batcher` traits on top of the decoded
//! CIFAR-10 images.
//!
//! Batches are prepared in parallel on a rayon pool: every image is resized,
//! optionally augmented, converted to CHW floats and normalized
//! independently. Each image gets its own RNG derived from the batcher seed
//! and a batch counter, so results do not depend on how rayon schedules work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::RgbImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::dataset::cifar10::{Cifar10Dataset, Cifar10Image};
use crate::utils::error::{CifarError, Result};

/// Per-channel mean of the CIFAR-10 training set (RGB, unit range)
pub const CIFAR10_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
/// Per-channel standard deviation used alongside [`CIFAR10_MEAN`]
pub const CIFAR10_STD: [f32; 3] = [0.2023, 0.1994, 0.2010];

/// A single labelled image ready for batching
#[derive(Clone, Debug)]
pub struct CifarItem {
    pub image: RgbImage,
    pub label: usize,
}

impl From<Cifar10Image> for CifarItem {
    fn from(img: Cifar10Image) -> Self {
        Self {
            image: img.data,
            label: img.label,
        }
    }
}

/// In-memory Burn dataset of CIFAR-10 items
#[derive(Clone, Debug, Default)]
pub struct CifarBurnDataset {
    items: Vec<CifarItem>,
}

impl CifarBurnDataset {
    pub fn new(items: Vec<CifarItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[CifarItem] {
        &self.items
    }

    /// Labels in dataset order
    pub fn labels(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }
}

impl From<Cifar10Dataset> for CifarBurnDataset {
    fn from(dataset: Cifar10Dataset) -> Self {
        Self::new(dataset.images.into_iter().map(CifarItem::from).collect())
    }
}

impl Dataset<CifarItem> for CifarBurnDataset {
    fn get(&self, index: usize) -> Option<CifarItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// One-hot encode `label` over `num_classes` classes
pub fn one_hot(label: usize, num_classes: usize) -> Result<Vec<f32>> {
    if label >= num_classes {
        return Err(CifarError::Dataset(format!(
            "label {} out of range for {} classes",
            label, num_classes
        )));
    }
    let mut encoded = vec![0.0f32; num_classes];
    encoded[label] = 1.0;
    Ok(encoded)
}

/// How u8 pixel values are mapped to network inputs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    /// `(x / 255 - mean) / std` with the CIFAR-10 channel statistics
    Cifar10MeanStd,
    /// Raw 0-255 values as floats
    Raw255,
    /// `x / 255`
    UnitRange,
}

impl Normalization {
    #[inline]
    pub fn apply(&self, value: u8, channel: usize) -> f32 {
        match self {
            Normalization::Cifar10MeanStd => {
                (value as f32 / 255.0 - CIFAR10_MEAN[channel]) / CIFAR10_STD[channel]
            }
            Normalization::Raw255 => value as f32,
            Normalization::UnitRange => value as f32 / 255.0,
        }
    }
}

/// Resize to `size`x`size` with bilinear filtering (no-op when already that size)
pub fn resize_image(img: &RgbImage, size: u32) -> RgbImage {
    if img.dimensions() == (size, size) {
        img.clone()
    } else {
        image::imageops::resize(img, size, size, FilterType::Triangle)
    }
}

/// Convert an HWC image to normalized CHW floats
pub fn to_chw(img: &RgbImage, normalization: Normalization) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + offset] = normalization.apply(pixel[c], c);
        }
    }

    data
}

/// Batch of CIFAR-10 images
#[derive(Clone, Debug)]
pub struct CifarBatch<B: Backend> {
    /// Images with shape [batch_size, 3, size, size]
    pub images: Tensor<B, 4>,
    /// Integer labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
    /// One-hot labels with shape [batch_size, num_classes]
    pub one_hot: Tensor<B, 2>,
}

/// Batcher that resizes, augments and normalizes items in parallel
#[derive(Clone)]
pub struct CifarBatcher {
    image_size: usize,
    num_classes: usize,
    normalization: Normalization,
    augmenter: Option<Augmenter>,
    seed: u64,
    batch_counter: Arc<AtomicU64>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl CifarBatcher {
    pub fn new(image_size: usize, num_classes: usize, normalization: Normalization) -> Self {
        Self {
            image_size,
            num_classes,
            normalization,
            augmenter: None,
            seed: 42,
            batch_counter: Arc::new(AtomicU64::new(0)),
            pool: None,
        }
    }

    /// Enable augmentation; a config that can never change an image is ignored
    pub fn with_augmentation(mut self, config: AugmentationConfig) -> Self {
        self.augmenter = if config.is_identity() {
            None
        } else {
            Some(Augmenter::new(config))
        };
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Prepare batches on a dedicated pool of `num_workers` threads (0 = rayon's global pool)
    pub fn with_num_workers(mut self, num_workers: usize) -> Result<Self> {
        self.pool = if num_workers == 0 {
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(num_workers)
                .thread_name(|i| format!("cifar-batcher-{}", i))
                .build()
                .map_err(|e| CifarError::Dataset(format!("failed to build worker pool: {}", e)))?;
            Some(Arc::new(pool))
        };
        Ok(self)
    }

    pub fn is_augmenting(&self) -> bool {
        self.augmenter.is_some()
    }

    /// Key = (seed, batch_index), stream = item_index
    fn item_rng(&self, batch_index: u64, item_index: usize) -> ChaCha8Rng {
        let mut key = [0u8; 32];
        key[..8].copy_from_slice(&self.seed.to_le_bytes());
        key[8..16].copy_from_slice(&batch_index.to_le_bytes());
        let mut rng = ChaCha8Rng::from_seed(key);
        rng.set_stream(item_index as u64);
        rng
    }

    /// Resize, augment and convert one image
    pub fn prepare_image(&self, image: &RgbImage, rng: &mut ChaCha8Rng) -> Vec<f32> {
        let resized = resize_image(image, self.image_size as u32);
        match &self.augmenter {
            Some(augmenter) => to_chw(&augmenter.augment(&resized, rng), self.normalization),
            None => to_chw(&resized, self.normalization),
        }
    }

    fn prepare_all(&self, items: &[CifarItem], batch_index: u64) -> Vec<Vec<f32>> {
        let work = || {
            items
                .par_iter()
                .enumerate()
                .map(|(i, item)| {
                    let mut rng = self.item_rng(batch_index, i);
                    self.prepare_image(&item.image, &mut rng)
                })
                .collect::<Vec<_>>()
        };

        match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }
}

impl<B: Backend> Batcher<B, CifarItem, CifarBatch<B>> for CifarBatcher {
    fn batch(&self, items: Vec<CifarItem>, device: &B::Device) -> CifarBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let batch_index = self.batch_counter.fetch_add(1, Ordering::SeqCst);

        let images_data: Vec<f32> = self
            .prepare_all(&items, batch_index)
            .into_iter()
            .flatten()
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        let one_hot_data: Vec<f32> = items
            .iter()
            .flat_map(|item| {
                one_hot(item.label, self.num_classes).unwrap_or_else(|e| {
                    tracing::warn!("{}; using an all-zero target row", e);
                    vec![0.0; self.num_classes]
                })
            })
            .collect();
        let one_hot = Tensor::<B, 2>::from_floats(
            TensorData::new(one_hot_data, [batch_size, self.num_classes]),
            device,
        );

        CifarBatch {
            images,
            targets,
            one_hot,
        }
    }
}
