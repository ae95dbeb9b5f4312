//! Training and evaluation loops
//!
//! A plain epoch loop over Burn primitives rather than the high-level
//! learner: shuffle indices, build each batch on demand, forward, loss,
//! backward, Adam step. Evaluation runs on the inner backend so no gradients
//! are tracked and dropout is inactive.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{
        activation::log_softmax,
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::burn_dataset::{CifarBatch, CifarBatcher, CifarBurnDataset, CifarItem};
use crate::model::ImageClassifier;
use crate::utils::error::{CifarError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::ConfusionMatrix;

/// Which loss the training loop minimises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    /// Softmax cross-entropy on integer labels
    CrossEntropy,
    /// Cross-entropy against one-hot label vectors
    CategoricalCrossEntropy,
}

/// Hyperparameters of the training loop
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
    /// Batches between running-loss log lines
    pub log_interval: usize,
    pub loss: LossKind,
    /// Reshuffle the training set every epoch
    pub shuffle: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 64,
            learning_rate: 1e-3,
            seed: 42,
            log_interval: 100,
            loss: LossKind::CrossEntropy,
            shuffle: true,
        }
    }
}

/// Metrics recorded for one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    /// Percentage in [0, 100]
    pub train_accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    pub duration_secs: f64,
}

/// Per-epoch history of a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn train_accuracies(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.train_accuracy).collect()
    }

    /// Validation accuracies, empty when no validation set was used
    pub fn val_accuracies(&self) -> Vec<f64> {
        self.epochs.iter().filter_map(|e| e.val_accuracy).collect()
    }

    pub fn final_train_accuracy(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.train_accuracy)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Result of evaluating a model on a held-out set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Percentage in [0, 100]
    pub accuracy: f64,
    pub avg_loss: f64,
    pub num_samples: usize,
    pub confusion: ConfusionMatrix,
}

fn make_batch<B: Backend>(
    batcher: &CifarBatcher,
    items: Vec<CifarItem>,
    device: &B::Device,
) -> CifarBatch<B> {
    <CifarBatcher as Batcher<B, CifarItem, CifarBatch<B>>>::batch(batcher, items, device)
}

/// `-mean(sum(one_hot * log_softmax(logits)))`
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    one_hot: Tensor<B, 2>,
) -> Tensor<B, 1> {
    (one_hot * log_softmax(logits, 1))
        .sum_dim(1)
        .mean()
        .neg()
}

fn compute_loss<B: Backend>(kind: LossKind, logits: Tensor<B, 2>, batch: &CifarBatch<B>) -> Tensor<B, 1> {
    match kind {
        LossKind::CrossEntropy => CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, batch.targets.clone()),
        LossKind::CategoricalCrossEntropy => categorical_cross_entropy(logits, batch.one_hot.clone()),
    }
}

fn predictions<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    logits.argmax(1).flatten::<1>(0, 1)
}

fn count_correct<B: Backend>(predicted: Tensor<B, 1, Int>, targets: Tensor<B, 1, Int>) -> usize {
    let correct: i64 = predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

fn check_inputs(dataset: &CifarBurnDataset, batch_size: usize, what: &str) -> Result<()> {
    use burn::data::dataset::Dataset;

    if batch_size == 0 {
        return Err(CifarError::Training("batch_size must be greater than 0".to_string()));
    }
    if dataset.is_empty() {
        return Err(CifarError::Training(format!("{} set is empty", what)));
    }
    Ok(())
}

/// Train `model` on `train_data`, optionally validating after every epoch
///
/// # Type Parameters
/// * `B` - The autodiff backend (e.g. `Autodiff<NdArray>`)
/// * `M` - Any classifier whose inner module can be evaluated without autodiff
pub fn train_model<B, M>(
    mut model: M,
    train_data: &CifarBurnDataset,
    validation_data: Option<&CifarBurnDataset>,
    train_batcher: &CifarBatcher,
    eval_batcher: &CifarBatcher,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<(M, TrainingHistory)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    use burn::data::dataset::Dataset;

    check_inputs(train_data, config.batch_size, "training")?;
    let log_interval = config.log_interval.max(1);

    let mut optimizer = AdamConfig::new().init::<B, M>();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut logger = TrainingLogger::new(config.epochs);
    let mut history = TrainingHistory::default();

    let num_samples = train_data.len();
    let num_batches = num_samples.div_ceil(config.batch_size);
    info!(
        "Training on {} samples | {} batches/epoch | batch size {} | lr {}",
        num_samples, num_batches, config.batch_size, config.learning_rate
    );

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        let epoch_start = Instant::now();

        let mut indices: Vec<usize> = (0..num_samples).collect();
        if config.shuffle {
            indices.shuffle(&mut rng);
        }

        let mut epoch_loss = 0.0f64;
        let mut running_loss = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        // Last partial batch is kept
        for (batch_idx, chunk) in indices.chunks(config.batch_size).enumerate() {
            let items: Vec<CifarItem> = chunk.iter().filter_map(|&i| train_data.get(i)).collect();
            let batch = make_batch::<B>(train_batcher, items, device);

            let logits = model.forward(batch.images.clone());
            let loss = compute_loss(config.loss, logits.clone(), &batch);

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(CifarError::Training(format!(
                    "loss became {} at epoch {}, batch {}",
                    loss_value,
                    epoch + 1,
                    batch_idx + 1
                )));
            }
            epoch_loss += loss_value;
            running_loss += loss_value;

            correct += count_correct(predictions(logits), batch.targets.clone());
            seen += chunk.len();

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            if (batch_idx + 1) % log_interval == 0 {
                info!(
                    "[Epoch {}, Batch {}] loss: {:.3}",
                    epoch + 1,
                    batch_idx + 1,
                    running_loss / log_interval as f64
                );
                running_loss = 0.0;
            } else {
                debug!("[Epoch {}, Batch {}] loss: {:.4}", epoch + 1, batch_idx + 1, loss_value);
            }
        }

        let train_loss = epoch_loss / num_batches.max(1) as f64;
        let train_accuracy = 100.0 * correct as f64 / seen.max(1) as f64;

        let validation = match validation_data {
            Some(val) => Some(evaluate_model(
                &model.valid(),
                val,
                eval_batcher,
                config.batch_size,
                config.loss,
                device,
            )?),
            None => None,
        };

        logger.end_epoch(
            train_loss,
            train_accuracy,
            validation.as_ref().map(|r| r.accuracy),
        );

        history.epochs.push(EpochRecord {
            epoch: epoch + 1,
            train_loss,
            train_accuracy,
            val_loss: validation.as_ref().map(|r| r.avg_loss),
            val_accuracy: validation.as_ref().map(|r| r.accuracy),
            duration_secs: epoch_start.elapsed().as_secs_f64(),
        });
    }

    logger.log_complete(history.final_train_accuracy().unwrap_or(0.0));
    Ok((model, history))
}

/// Evaluate `model` on `dataset` in order, without shuffling
pub fn evaluate_model<B, M>(
    model: &M,
    dataset: &CifarBurnDataset,
    batcher: &CifarBatcher,
    batch_size: usize,
    loss: LossKind,
    device: &B::Device,
) -> Result<EvaluationReport>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    use burn::data::dataset::Dataset;

    check_inputs(dataset, batch_size, "evaluation")?;

    let mut confusion = ConfusionMatrix::new(model.num_classes());
    let mut total_loss = 0.0f64;
    let mut num_batches = 0usize;

    let len = dataset.len();
    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<CifarItem> = (start..end).filter_map(|i| dataset.get(i)).collect();
        let labels: Vec<usize> = items.iter().map(|item| item.label).collect();

        let batch = make_batch::<B>(batcher, items, device);
        let logits = model.forward(batch.images.clone());

        let batch_loss: f64 = compute_loss(loss, logits.clone(), &batch).into_scalar().elem();
        total_loss += batch_loss;
        num_batches += 1;

        let predicted: Vec<usize> = predictions(logits)
            .into_data()
            .iter::<i64>()
            .map(|p| p as usize)
            .collect();
        confusion.extend(&predicted, &labels);
    }

    Ok(EvaluationReport {
        accuracy: confusion.accuracy(),
        avg_loss: total_loss / num_batches.max(1) as f64,
        num_samples: confusion.total(),
        confusion,
    })
}

/// Save model weights with Burn's compact recorder; returns the written path
pub fn save_model<B: Backend, M: Module<B>>(model: M, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    model
        .save_file(path.to_path_buf(), &CompactRecorder::new())
        .map_err(|e| CifarError::Serialization(format!("failed to save model: {:?}", e)))?;

    let written = path.with_extension("mpk");
    info!("Saved model to {:?}", written);
    Ok(written)
}
