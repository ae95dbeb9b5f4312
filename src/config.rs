//! Experiment Configuration Module
//!
//! Serializable settings for the two experiments. Every field has a default
//! matching the reference runs, so a JSON file only needs to list what it
//! changes. CLI flags are applied on top of whatever is loaded here.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::cifar10::DatasetSlice;
use crate::utils::error::{CifarError, Result};

/// Default location of the extracted `cifar-10-batches-bin` directory
pub const DEFAULT_DATA_DIR: &str = "data/cifar-10-batches-bin";

/// Settings for the WideResNet experiment (full CIFAR-10, 32x32)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WideResNetExperimentConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub train_split: String,
    pub test_split: String,

    /// Total depth, must satisfy (depth - 4) % 6 == 0
    pub depth: usize,
    pub widen_factor: usize,
    pub drop_rate: f64,

    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Batches between running-loss log lines
    pub log_interval: usize,
    pub augmentation: bool,

    pub seed: u64,
    /// Batch preparation threads (0 = rayon default)
    pub num_workers: usize,
    pub save_model: bool,
}

impl Default for WideResNetExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            output_dir: PathBuf::from("output/wide_resnet"),
            train_split: "train".to_string(),
            test_split: "test".to_string(),
            depth: 28,
            widen_factor: 10,
            drop_rate: 0.3,
            epochs: 10,
            batch_size: 64,
            learning_rate: 1e-3,
            log_interval: 100,
            augmentation: true,
            seed: 42,
            num_workers: 0,
            save_model: false,
        }
    }
}

impl WideResNetExperimentConfig {
    /// Small network for smoke runs on CPU
    pub fn quick() -> Self {
        Self {
            train_split: "train[:2000]".to_string(),
            test_split: "test[:500]".to_string(),
            depth: 10,
            widen_factor: 1,
            drop_rate: 0.0,
            epochs: 2,
            log_interval: 10,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.depth < 10 || (self.depth - 4) % 6 != 0 {
            return Err(CifarError::Config(format!(
                "depth must be 6n+4 with n >= 1, got {}",
                self.depth
            )));
        }
        if self.widen_factor == 0 {
            return Err(CifarError::Config("widen_factor must be at least 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.drop_rate) {
            return Err(CifarError::Config(
                "drop_rate must be in range [0.0, 1.0)".to_string(),
            ));
        }
        validate_common(
            self.epochs,
            self.batch_size,
            self.learning_rate,
            self.log_interval,
        )?;
        validate_splits(&self.train_split, &self.test_split)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }
}

/// Settings for the mobile-network experiment (CIFAR-10 subset, upscaled)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileExperimentConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub train_split: String,
    pub test_split: String,

    /// Side length images are resized to before entering the network
    pub image_size: usize,
    pub width_multiplier: f64,
    pub dropout: f64,

    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub log_interval: usize,
    pub augmentation: bool,

    pub seed: u64,
    pub num_workers: usize,
    pub save_model: bool,
}

impl Default for MobileExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            output_dir: PathBuf::from("output/mobile"),
            train_split: "train[:800]".to_string(),
            test_split: "test[:200]".to_string(),
            image_size: 224,
            width_multiplier: 1.0,
            dropout: 0.2,
            epochs: 10,
            batch_size: 16,
            learning_rate: 1e-3,
            log_interval: 100,
            augmentation: true,
            seed: 42,
            num_workers: 0,
            save_model: false,
        }
    }
}

impl MobileExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        // Five stride-2 stages need at least 32 pixels
        if self.image_size < 32 {
            return Err(CifarError::Config(format!(
                "image_size must be at least 32, got {}",
                self.image_size
            )));
        }
        if self.width_multiplier <= 0.0 {
            return Err(CifarError::Config(
                "width_multiplier must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(CifarError::Config(
                "dropout must be in range [0.0, 1.0)".to_string(),
            ));
        }
        validate_common(
            self.epochs,
            self.batch_size,
            self.learning_rate,
            self.log_interval,
        )?;
        validate_splits(&self.train_split, &self.test_split)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }
}

fn validate_common(
    epochs: usize,
    batch_size: usize,
    learning_rate: f64,
    log_interval: usize,
) -> Result<()> {
    if epochs == 0 {
        return Err(CifarError::Config("epochs must be greater than 0".to_string()));
    }
    if batch_size == 0 {
        return Err(CifarError::Config(
            "batch_size must be greater than 0".to_string(),
        ));
    }
    if learning_rate <= 0.0 || !learning_rate.is_finite() {
        return Err(CifarError::Config(format!(
            "learning_rate must be a positive number, got {}",
            learning_rate
        )));
    }
    if log_interval == 0 {
        return Err(CifarError::Config(
            "log_interval must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_splits(train_split: &str, test_split: &str) -> Result<()> {
    train_split.parse::<DatasetSlice>()?;
    test_split.parse::<DatasetSlice>()?;
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        WideResNetExperimentConfig::default().validate().unwrap();
        WideResNetExperimentConfig::quick().validate().unwrap();
        MobileExperimentConfig::default().validate().unwrap();
    }

    #[test]
    fn test_wide_resnet_defaults() {
        let config = WideResNetExperimentConfig::default();
        assert_eq!(config.depth, 28);
        assert_eq!(config.widen_factor, 10);
        assert_eq!(config.batch_size, 64);
        assert!((config.drop_rate - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_depth_rejected() {
        for depth in [4, 8, 27, 29] {
            let config = WideResNetExperimentConfig {
                depth,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "depth {} accepted", depth);
        }
    }

    #[test]
    fn test_invalid_split_rejected() {
        let config = MobileExperimentConfig {
            train_split: "validation[:10]".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = MobileExperimentConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CifarError::Config(_))));
    }

    #[test]
    fn test_save_load_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mobile.json");

        let config = MobileExperimentConfig {
            epochs: 3,
            image_size: 96,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = MobileExperimentConfig::load(&path).unwrap();
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.image_size, 96);

        // Missing fields fall back to defaults
        let partial = dir.path().join("wrn.json");
        std::fs::write(&partial, r#"{ "depth": 16, "widen_factor": 4 }"#).unwrap();
        let loaded = WideResNetExperimentConfig::load(&partial).unwrap();
        assert_eq!(loaded.depth, 16);
        assert_eq!(loaded.widen_factor, 4);
        assert_eq!(loaded.batch_size, 64);
    }
}
