//! # cifar_zoo
//!
//! CIFAR-10 image classification experiments built on the Burn framework.
//!
//! ## Experiments
//!
//! - **WideResNet**: WRN-28-10 trained on the full training split at 32x32 with
//!   random-crop and flip augmentation, evaluated on the full test split.
//! - **Mobile**: MobileNetV2 trained from scratch on `train[:800]`, upscaled to
//!   224x224 with rotation/translation/flip/contrast augmentation and one-hot
//!   labels, validated on `test[:200]` after every epoch.
//!
//! ## Modules
//!
//! - `dataset`: CIFAR-10 binary reader, slices, augmentation, Burn batching
//! - `model`: WideResNet and MobileNetV2
//! - `training`: Training/evaluation loops and the experiment pipelines
//! - `config`: JSON-serializable experiment settings
//! - `utils`: Logging, metrics, charts and errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cifar_zoo::config::WideResNetExperimentConfig;
//! use cifar_zoo::training::run_wide_resnet_experiment;
//!
//! let config = WideResNetExperimentConfig::quick();
//! let summary = run_wide_resnet_experiment(&config)?;
//! println!("test accuracy: {:.2}%", summary.report.accuracy);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

pub use dataset::{
    CifarBatch, CifarBatcher, CifarBurnDataset, CifarItem, Cifar10Dataset, DatasetSlice, Split,
};
pub use model::{ImageClassifier, MobileNetV2, MobileNetV2Config, WideResNet, WideResNetConfig};
pub use training::{EvaluationReport, TrainingConfig, TrainingHistory};
pub use utils::error::{CifarError, Result};
pub use utils::metrics::ConfusionMatrix;

/// CIFAR-10 classes
pub const NUM_CLASSES: usize = 10;
