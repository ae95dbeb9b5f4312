//! cifar_zoo CLI
//!
//! Runs the WideResNet and mobile-network CIFAR-10 experiments, prints
//! dataset statistics and writes preview grids.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use cifar_zoo::config::{MobileExperimentConfig, WideResNetExperimentConfig, DEFAULT_DATA_DIR};
use cifar_zoo::dataset::augmentation::{AugmentationConfig, Augmenter};
use cifar_zoo::dataset::preview::{save_augmented_grid, save_sample_grid};
use cifar_zoo::dataset::{Cifar10Dataset, CifarBurnDataset, Split, CLASS_NAMES};
use cifar_zoo::training::{run_mobile_experiment, run_wide_resnet_experiment, ExperimentSummary};
use cifar_zoo::utils::format_duration;
use cifar_zoo::utils::logging::{init_logging, LogConfig};

/// CIFAR-10 classification experiments with Burn
#[derive(Parser, Debug)]
#[command(name = "cifar_zoo")]
#[command(version)]
#[command(about = "CIFAR-10 WideResNet and MobileNetV2 experiments with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false", global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train and evaluate a WideResNet on full CIFAR-10
    WideResnet {
        /// JSON config file; flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory containing the extracted cifar-10-batches-bin files
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Network depth (6n + 4)
        #[arg(long)]
        depth: Option<usize>,

        #[arg(long)]
        widen_factor: Option<usize>,

        #[arg(long)]
        drop_rate: Option<f64>,

        #[arg(short, long)]
        learning_rate: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Save the trained weights as model.mpk
        #[arg(long, default_value = "false")]
        save_model: bool,

        /// Small network and data subset for a fast end-to-end check
        #[arg(long, default_value = "false", conflicts_with = "config")]
        quick: bool,
    },

    /// Train a MobileNetV2 on a CIFAR-10 subset at 224x224
    Mobile {
        /// JSON config file; flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Training slice, e.g. train[:800]
        #[arg(long)]
        train_split: Option<String>,

        /// Test slice, e.g. test[:200]
        #[arg(long)]
        test_split: Option<String>,

        #[arg(long)]
        image_size: Option<usize>,

        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Train on un-augmented images
        #[arg(long, default_value = "false")]
        no_augmentation: bool,

        #[arg(long, default_value = "false")]
        save_model: bool,
    },

    /// Show the class distribution of both splits
    Stats {
        #[arg(short, long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },

    /// Write sample and augmented-sample grids
    Preview {
        #[arg(short, long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,

        #[arg(short, long, default_value = "output/preview")]
        output_dir: PathBuf,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::WideResnet {
            config,
            data_dir,
            epochs,
            batch_size,
            depth,
            widen_factor,
            drop_rate,
            learning_rate,
            seed,
            output_dir,
            save_model,
            quick,
        } => {
            let mut cfg = match &config {
                Some(path) => WideResNetExperimentConfig::load(path)
                    .with_context(|| format!("Failed to read config {:?}", path))?,
                None if quick => WideResNetExperimentConfig::quick(),
                None => WideResNetExperimentConfig::default(),
            };
            override_opt(&mut cfg.data_dir, data_dir);
            override_opt(&mut cfg.epochs, epochs);
            override_opt(&mut cfg.batch_size, batch_size);
            override_opt(&mut cfg.depth, depth);
            override_opt(&mut cfg.widen_factor, widen_factor);
            override_opt(&mut cfg.drop_rate, drop_rate);
            override_opt(&mut cfg.learning_rate, learning_rate);
            override_opt(&mut cfg.seed, seed);
            override_opt(&mut cfg.output_dir, output_dir);
            cfg.save_model |= save_model;

            let summary = run_wide_resnet_experiment(&cfg)?;
            print_summary(&summary);
        }

        Commands::Mobile {
            config,
            data_dir,
            train_split,
            test_split,
            image_size,
            epochs,
            batch_size,
            seed,
            output_dir,
            no_augmentation,
            save_model,
        } => {
            let mut cfg = match &config {
                Some(path) => MobileExperimentConfig::load(path)
                    .with_context(|| format!("Failed to read config {:?}", path))?,
                None => MobileExperimentConfig::default(),
            };
            override_opt(&mut cfg.data_dir, data_dir);
            override_opt(&mut cfg.train_split, train_split);
            override_opt(&mut cfg.test_split, test_split);
            override_opt(&mut cfg.image_size, image_size);
            override_opt(&mut cfg.epochs, epochs);
            override_opt(&mut cfg.batch_size, batch_size);
            override_opt(&mut cfg.seed, seed);
            override_opt(&mut cfg.output_dir, output_dir);
            if no_augmentation {
                cfg.augmentation = false;
            }
            cfg.save_model |= save_model;

            let summary = run_mobile_experiment(&cfg)?;
            print_summary(&summary);
        }

        Commands::Stats { data_dir } => cmd_stats(&data_dir)?,

        Commands::Preview {
            data_dir,
            output_dir,
            seed,
        } => cmd_preview(&data_dir, &output_dir, seed)?,
    }

    Ok(())
}

fn override_opt<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    for split in [Split::Train, Split::Test] {
        let dataset = Cifar10Dataset::load(data_dir, split)
            .with_context(|| format!("Failed to load the {} split", split))?;

        println!();
        println!(
            "{}",
            format!("{} split: {} images", split, dataset.len()).cyan().bold()
        );
        for (name, count) in CLASS_NAMES.iter().zip(dataset.class_distribution()) {
            println!("  {:<12} {:>6}", name, count);
        }
    }
    println!();
    Ok(())
}

fn cmd_preview(data_dir: &Path, output_dir: &Path, seed: u64) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let slice = "train[:9]".parse()?;
    let dataset: CifarBurnDataset = Cifar10Dataset::load_slice(data_dir, &slice)?.into();
    save_sample_grid(dataset.items(), &output_dir.join("samples.png"))?;

    if let Some(first) = dataset.items().first() {
        let augmenter = Augmenter::new(AugmentationConfig::rotate_translate_flip_contrast());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        save_augmented_grid(
            &first.image,
            &augmenter,
            &mut rng,
            &output_dir.join("augmented_samples.png"),
        )?;
    }

    info!("Preview written to {:?}", output_dir);
    Ok(())
}

fn print_summary(summary: &ExperimentSummary) {
    let total_secs: f64 = summary.history.epochs.iter().map(|e| e.duration_secs).sum();

    println!("{}", "Experiment Complete!".green().bold());
    println!("  Test accuracy:   {:.2}%", summary.report.accuracy);
    if let Some(train_acc) = summary.history.final_train_accuracy() {
        println!("  Final train acc: {:.2}%", train_acc);
    }
    println!(
        "  Started:         {}",
        summary.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Training time:   {}", format_duration(total_secs));
    println!("  Outputs:         {:?}", summary.output_dir);
    if let Some(checkpoint) = &summary.checkpoint {
        println!("  Checkpoint:      {:?}", checkpoint);
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔════════════════════════════════════════════════════════╗
 ║   cifar_zoo                                            ║
 ║   CIFAR-10 WideResNet and MobileNetV2 with Burn + Rust ║
 ╚════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}
