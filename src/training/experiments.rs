//! End-to-end experiment runners
//!
//! Each runner is a straight pipeline: load data, write previews, build the
//! model, train, evaluate on the test slice, then write the accuracy chart,
//! `history.json`, `evaluation.json`, `run.json` and optionally the weights.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use chrono::{DateTime, Local};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use crate::backend::{backend_name, default_device, TrainingBackend};
use crate::config::{MobileExperimentConfig, WideResNetExperimentConfig};
use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::dataset::burn_dataset::{
    resize_image, CifarBatcher, CifarBurnDataset, CifarItem, Normalization,
};
use crate::dataset::cifar10::{Cifar10Dataset, DatasetSlice, CLASS_NAMES};
use crate::dataset::preview::{save_augmented_grid, save_sample_grid};
use crate::model::{log_summary, MobileNetV2Config, WideResNetConfig};
use crate::training::trainer::{
    evaluate_model, save_model, train_model, EvaluationReport, LossKind, TrainingConfig,
    TrainingHistory,
};
use crate::utils::charts::{generate_line_chart, DataSeries, COLOR_TRAIN, COLOR_VALIDATION};
use crate::NUM_CLASSES;

/// What an experiment run produced
#[derive(Debug)]
pub struct ExperimentSummary {
    pub history: TrainingHistory,
    pub report: EvaluationReport,
    pub output_dir: PathBuf,
    pub checkpoint: Option<PathBuf>,
    pub started_at: DateTime<Local>,
}

/// Settings and timing of one run, written next to the results
#[derive(Serialize)]
struct RunRecord<'a, C: Serialize> {
    experiment: &'a str,
    backend: &'static str,
    started_at: String,
    finished_at: String,
    test_accuracy: f64,
    config: &'a C,
}

fn write_run_record<C: Serialize>(
    output_dir: &Path,
    experiment: &str,
    config: &C,
    started_at: &DateTime<Local>,
    report: &EvaluationReport,
) -> Result<()> {
    let record = RunRecord {
        experiment,
        backend: backend_name(),
        started_at: started_at.to_rfc3339(),
        finished_at: Local::now().to_rfc3339(),
        test_accuracy: report.accuracy,
        config,
    };
    std::fs::write(
        output_dir.join("run.json"),
        serde_json::to_string_pretty(&record)?,
    )?;
    Ok(())
}

fn load_split(data_dir: &Path, split: &str) -> Result<CifarBurnDataset> {
    let slice: DatasetSlice = split.parse()?;
    let dataset = Cifar10Dataset::load_slice(data_dir, &slice)
        .with_context(|| format!("Failed to load {} from {:?}", slice, data_dir))?;

    let distribution = dataset.class_distribution();
    let summary: Vec<String> = CLASS_NAMES
        .iter()
        .zip(distribution.iter())
        .map(|(name, count)| format!("{}={}", name, count))
        .collect();
    info!("{} class distribution: {}", slice, summary.join(", "));

    Ok(dataset.into())
}

fn write_outputs(
    output_dir: &Path,
    title: &str,
    history: &TrainingHistory,
    report: &EvaluationReport,
) -> Result<()> {
    let mut series = vec![DataSeries::from_epoch_values(
        "train",
        &history.train_accuracies(),
        COLOR_TRAIN,
    )];
    let val = history.val_accuracies();
    if !val.is_empty() {
        series.push(DataSeries::from_epoch_values("validation", &val, COLOR_VALIDATION));
    }

    let chart_path = output_dir.join("training_accuracy.svg");
    generate_line_chart(title, "Epoch", "Accuracy", &series, &chart_path)
        .with_context(|| format!("Failed to write chart {:?}", chart_path))?;

    history.save(&output_dir.join("history.json"))?;
    std::fs::write(
        output_dir.join("evaluation.json"),
        serde_json::to_string_pretty(report)?,
    )?;

    info!("Wrote chart, history and evaluation to {:?}", output_dir);
    Ok(())
}

fn print_report(report: &EvaluationReport) {
    println!();
    println!(
        "  {} Accuracy on test set: {}",
        "→".cyan(),
        format!("{:.2}%", report.accuracy).green().bold()
    );
    println!("  Test loss: {:.4} over {} images", report.avg_loss, report.num_samples);
    println!();
    for line in report.confusion.per_class_table(&CLASS_NAMES).lines() {
        println!("  {}", line);
    }
    println!();
}

/// Run the WideResNet experiment on the default backend
pub fn run_wide_resnet_experiment(config: &WideResNetExperimentConfig) -> Result<ExperimentSummary> {
    run_wide_resnet_experiment_on::<TrainingBackend>(config, &default_device())
}

pub fn run_wide_resnet_experiment_on<B: AutodiffBackend>(
    config: &WideResNetExperimentConfig,
    device: &B::Device,
) -> Result<ExperimentSummary> {
    config.validate()?;
    let started_at = Local::now();
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {:?}", config.output_dir))?;

    println!("{}", "Loading CIFAR-10...".cyan().bold());
    let train_data = load_split(&config.data_dir, &config.train_split)?;
    let test_data = load_split(&config.data_dir, &config.test_split)?;

    save_sample_grid(train_data.items(), &config.output_dir.join("samples.png"))?;

    let augmentation = if config.augmentation {
        AugmentationConfig::padded_crop_flip()
    } else {
        AugmentationConfig::none()
    };
    let train_batcher = CifarBatcher::new(32, NUM_CLASSES, Normalization::Cifar10MeanStd)
        .with_augmentation(augmentation)
        .with_seed(config.seed)
        .with_num_workers(config.num_workers)?;
    let eval_batcher = CifarBatcher::new(32, NUM_CLASSES, Normalization::Cifar10MeanStd)
        .with_num_workers(config.num_workers)?;

    println!("{}", "Creating Model...".cyan().bold());
    let model_config = WideResNetConfig::new(config.depth, NUM_CLASSES)
        .with_widen_factor(config.widen_factor)
        .with_drop_rate(config.drop_rate);
    let model = model_config.init::<B>(device)?;
    log_summary(&model_config.name(), &model_config.layer_summary()?, &model);

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Backend:        {}", backend_name());
    println!("  Train samples:  {}", train_data.items().len());
    println!("  Test samples:   {}", test_data.items().len());
    println!("  Epochs:         {}", config.epochs);
    println!("  Batch size:     {}", config.batch_size);
    println!("  Learning rate:  {}", config.learning_rate);
    println!("  Augmentation:   {}", train_batcher.is_augmenting());
    println!();

    let training = TrainingConfig {
        epochs: config.epochs,
        batch_size: config.batch_size,
        learning_rate: config.learning_rate,
        seed: config.seed,
        log_interval: config.log_interval,
        loss: LossKind::CrossEntropy,
        shuffle: true,
    };

    println!("{}", "Starting Training...".green().bold());
    let (model, history) = train_model(
        model,
        &train_data,
        None,
        &train_batcher,
        &eval_batcher,
        &training,
        device,
    )?;

    println!("{}", "Evaluating...".cyan().bold());
    let report = evaluate_model(
        &model.valid(),
        &test_data,
        &eval_batcher,
        config.batch_size,
        LossKind::CrossEntropy,
        device,
    )?;
    print_report(&report);

    write_outputs(
        &config.output_dir,
        &format!("{} Training Accuracy", model_config.name()),
        &history,
        &report,
    )?;
    write_run_record(&config.output_dir, &model_config.name(), config, &started_at, &report)?;

    let checkpoint = if config.save_model {
        Some(save_model(model, &config.output_dir.join("model"))?)
    } else {
        None
    };

    Ok(ExperimentSummary {
        history,
        report,
        output_dir: config.output_dir.clone(),
        checkpoint,
        started_at,
    })
}

/// Run the mobile-network experiment on the default backend
pub fn run_mobile_experiment(config: &MobileExperimentConfig) -> Result<ExperimentSummary> {
    run_mobile_experiment_on::<TrainingBackend>(config, &default_device())
}

pub fn run_mobile_experiment_on<B: AutodiffBackend>(
    config: &MobileExperimentConfig,
    device: &B::Device,
) -> Result<ExperimentSummary> {
    config.validate()?;
    let started_at = Local::now();
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {:?}", config.output_dir))?;

    println!("{}", "Loading CIFAR-10 subset...".cyan().bold());
    let train_data = load_split(&config.data_dir, &config.train_split)?;
    let test_data = load_split(&config.data_dir, &config.test_split)?;

    let size = config.image_size as u32;
    let preview_items: Vec<CifarItem> = train_data
        .items()
        .iter()
        .take(9)
        .map(|item| CifarItem {
            image: resize_image(&item.image, size),
            label: item.label,
        })
        .collect();
    save_sample_grid(&preview_items, &config.output_dir.join("samples.png"))?;

    let augmentation = if config.augmentation {
        AugmentationConfig::rotate_translate_flip_contrast()
    } else {
        AugmentationConfig::none()
    };
    if let Some(first) = preview_items.first() {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        save_augmented_grid(
            &first.image,
            &Augmenter::new(AugmentationConfig::rotate_translate_flip_contrast()),
            &mut rng,
            &config.output_dir.join("augmented_samples.png"),
        )?;
    }

    let train_batcher = CifarBatcher::new(config.image_size, NUM_CLASSES, Normalization::Raw255)
        .with_augmentation(augmentation)
        .with_seed(config.seed)
        .with_num_workers(config.num_workers)?;
    let eval_batcher = CifarBatcher::new(config.image_size, NUM_CLASSES, Normalization::Raw255)
        .with_num_workers(config.num_workers)?;

    println!("{}", "Creating Model...".cyan().bold());
    let model_config = MobileNetV2Config::new(NUM_CLASSES)
        .with_width_multiplier(config.width_multiplier)
        .with_dropout(config.dropout);
    let model = model_config.init::<B>(device)?;
    log_summary("MobileNetV2", &model_config.layer_summary(), &model);

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Backend:        {}", backend_name());
    println!("  Train split:    {} ({} images)", config.train_split, train_data.items().len());
    println!("  Test split:     {} ({} images)", config.test_split, test_data.items().len());
    println!("  Image size:     {}x{}", config.image_size, config.image_size);
    println!("  Epochs:         {}", config.epochs);
    println!("  Batch size:     {}", config.batch_size);
    println!("  Augmentation:   {}", train_batcher.is_augmenting());
    println!();

    // The subset keeps its on-disk order every epoch
    let training = TrainingConfig {
        epochs: config.epochs,
        batch_size: config.batch_size,
        learning_rate: config.learning_rate,
        seed: config.seed,
        log_interval: config.log_interval,
        loss: LossKind::CategoricalCrossEntropy,
        shuffle: false,
    };

    println!("{}", "Starting Training...".green().bold());
    let (model, history) = train_model(
        model,
        &train_data,
        Some(&test_data),
        &train_batcher,
        &eval_batcher,
        &training,
        device,
    )?;

    println!("{}", "Evaluating...".cyan().bold());
    let report = evaluate_model(
        &model.valid(),
        &test_data,
        &eval_batcher,
        config.batch_size,
        LossKind::CategoricalCrossEntropy,
        device,
    )?;
    print_report(&report);

    write_outputs(&config.output_dir, "MobileNetV2 Accuracy", &history, &report)?;
    write_run_record(&config.output_dir, "MobileNetV2", config, &started_at, &report)?;

    let checkpoint = if config.save_model {
        Some(save_model(model, &config.output_dir.join("model"))?)
    } else {
        None
    };

    Ok(ExperimentSummary {
        history,
        report,
        output_dir: config.output_dir.clone(),
        checkpoint,
        started_at,
    })
}
