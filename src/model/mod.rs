//! Model module for the CIFAR-10 architectures
//!
//! - `wide_resnet`: WRN-d-k, pre-activation residual network widened per stage
//! - `mobilenet`: MobileNetV2, inverted residuals with depthwise convolutions
//!
//! Both expose the [`ImageClassifier`] trait so the training loop can stay
//! generic over the architecture.

pub mod mobilenet;
pub mod wide_resnet;

use burn::module::Module;
use burn::nn::Initializer;
use burn::tensor::{backend::Backend, Tensor};
use tracing::info;

pub use mobilenet::{MobileNetV2, MobileNetV2Config};
pub use wide_resnet::{WideResNet, WideResNetConfig};

/// A network mapping `[batch, 3, H, W]` images to `[batch, num_classes]` logits
pub trait ImageClassifier<B: Backend> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    fn num_classes(&self) -> usize;
}

/// Total number of trainable scalars
pub fn num_params<B: Backend, M: Module<B>>(model: &M) -> usize {
    model.num_params()
}

/// He-normal init over the fan-out `k·k·out_channels`, independent of groups
pub(crate) fn fan_out_normal(kernel: usize, out_channels: usize) -> Initializer {
    Initializer::Normal {
        mean: 0.0,
        std: (2.0 / (kernel * kernel * out_channels) as f64).sqrt(),
    }
}

/// Log the layer layout followed by the parameter count
pub fn log_summary<B: Backend, M: Module<B>>(name: &str, layers: &[String], model: &M) {
    info!("Model: {}", name);
    for line in layers {
        info!("  {}", line);
    }
    info!("Parameters: {}", crate::utils::format_number(num_params(model)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_normal_std() {
        match fan_out_normal(3, 32) {
            Initializer::Normal { mean, std } => {
                assert_eq!(mean, 0.0);
                assert!((std - (2.0f64 / 288.0).sqrt()).abs() < 1e-12);
            }
            other => panic!("unexpected initializer {:?}", other),
        }
    }
}
