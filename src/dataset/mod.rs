//! Dataset module for CIFAR-10 data handling
//!
//! - Decoding the binary CIFAR-10 batches and selecting slices of a split
//! - Random augmentation of individual images
//! - Burn `Dataset`/`Batcher` glue with parallel batch preparation
//! - Preview grids of raw and augmented samples

pub mod augmentation;
pub mod burn_dataset;
pub mod cifar10;
pub mod preview;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{
    one_hot, CifarBatch, CifarBatcher, CifarBurnDataset, CifarItem, Normalization,
};
pub use cifar10::{class_name, Cifar10Dataset, Cifar10Image, DatasetSlice, Split, CLASS_NAMES};
