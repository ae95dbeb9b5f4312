//! Training module
//!
//! - `trainer`: generic epoch loop, evaluation and checkpointing
//! - `experiments`: the WideResNet and mobile-network pipelines

pub mod experiments;
pub mod trainer;

pub use experiments::{
    run_mobile_experiment, run_wide_resnet_experiment, ExperimentSummary,
};
pub use trainer::{
    evaluate_model, train_model, EvaluationReport, LossKind, TrainingConfig, TrainingHistory,
};
