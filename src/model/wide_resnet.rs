//! Wide Residual Network
//!
//! WRN-d-k for 32x32 inputs. A 3x3 stem convolution is followed by three
//! stages of pre-activation basic blocks at widths 16k, 32k and 64k (strides
//! 1, 2, 2), then BN, ReLU, global average pooling and a linear classifier.
//! Each stage holds n = (d - 4) / 6 blocks.
//!
//! Weight init: convolutions ~ N(0, sqrt(2 / (k·k·out))), batch-norm scale 1
//! and shift 0, classifier bias 0.

use burn::{
    config::Config,
    module::{Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::{fan_out_normal, ImageClassifier};
use crate::utils::error::CifarError;

/// Configuration for a WRN-depth-widen_factor network
#[derive(Config, Debug)]
pub struct WideResNetConfig {
    /// Total depth; must be 6n + 4 with n >= 1
    pub depth: usize,

    pub num_classes: usize,

    #[config(default = "1")]
    pub widen_factor: usize,

    /// Dropout between the two convolutions of each block
    #[config(default = "0.0")]
    pub drop_rate: f64,
}

impl WideResNetConfig {
    /// Blocks per stage
    pub fn blocks_per_stage(&self) -> crate::utils::error::Result<usize> {
        if self.depth < 4 || (self.depth - 4) % 6 != 0 {
            return Err(CifarError::Model(format!(
                "WideResNet depth must satisfy (depth - 4) % 6 == 0, got {}",
                self.depth
            )));
        }
        let n = (self.depth - 4) / 6;
        if n == 0 {
            return Err(CifarError::Model(format!(
                "WideResNet depth {} leaves no blocks per stage",
                self.depth
            )));
        }
        Ok(n)
    }

    /// Output channels of the stem and the three stages
    pub fn channels(&self) -> [usize; 4] {
        let k = self.widen_factor;
        [16, 16 * k, 32 * k, 64 * k]
    }

    pub fn validate(&self) -> crate::utils::error::Result<()> {
        self.blocks_per_stage()?;
        if self.widen_factor == 0 {
            return Err(CifarError::Model("widen_factor must be at least 1".to_string()));
        }
        if self.num_classes == 0 {
            return Err(CifarError::Model("num_classes must be at least 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.drop_rate) {
            return Err(CifarError::Model(format!(
                "drop_rate must be in [0, 1), got {}",
                self.drop_rate
            )));
        }
        Ok(())
    }

    /// One line per layer group, for the model summary
    pub fn layer_summary(&self) -> crate::utils::error::Result<Vec<String>> {
        let n = self.blocks_per_stage()?;
        let [c0, c1, c2, c3] = self.channels();
        let mut lines = vec![format!("stem: conv3x3 3 -> {}", c0)];
        for (stage, (c_in, c_out, stride)) in
            [(c0, c1, 1), (c1, c2, 2), (c2, c3, 2)].into_iter().enumerate()
        {
            lines.push(format!(
                "stage {}: {} x BasicBlock {} -> {}, stride {}",
                stage + 1,
                n,
                c_in,
                c_out,
                stride
            ));
        }
        lines.push(format!(
            "head: BN, ReLU, global avg pool, linear {} -> {}",
            c3, self.num_classes
        ));
        Ok(lines)
    }

    /// Short name such as `WRN-28-10`
    pub fn name(&self) -> String {
        format!("WRN-{}-{}", self.depth, self.widen_factor)
    }

    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> crate::utils::error::Result<WideResNet<B>> {
        self.validate()?;
        let n = self.blocks_per_stage()?;
        let [c0, c1, c2, c3] = self.channels();

        let mut fc = LinearConfig::new(c3, self.num_classes).init(device);
        fc.bias = Some(Param::from_tensor(Tensor::zeros([self.num_classes], device)));

        Ok(WideResNet {
            conv1: conv(3, c0, 3, 1, device),
            block1: NetworkBlock::new(n, c0, c1, 1, self.drop_rate, device),
            block2: NetworkBlock::new(n, c1, c2, 2, self.drop_rate, device),
            block3: NetworkBlock::new(n, c2, c3, 2, self.drop_rate, device),
            bn: BatchNormConfig::new(c3).init(device),
            relu: Relu::new(),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc,
            num_classes: self.num_classes,
        })
    }
}

/// Bias-free convolution with He-style normal init; 3x3 kernels are padded by 1
fn conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let padding = kernel / 2;
    Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .with_initializer(fan_out_normal(kernel, out_channels))
        .init(device)
}

/// Pre-activation residual block
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    bn1: BatchNorm<B>,
    conv1: Conv2d<B>,
    bn2: BatchNorm<B>,
    conv2: Conv2d<B>,
    dropout: Option<Dropout>,
    /// 1x1 projection, present only when the width changes
    shortcut: Option<Conv2d<B>>,
    relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        drop_rate: f64,
        device: &B::Device,
    ) -> Self {
        let shortcut = (in_channels != out_channels)
            .then(|| conv(in_channels, out_channels, 1, stride, device));
        let dropout = (drop_rate > 0.0).then(|| DropoutConfig::new(drop_rate).init());

        Self {
            bn1: BatchNormConfig::new(in_channels).init(device),
            conv1: conv(in_channels, out_channels, 3, stride, device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            conv2: conv(out_channels, out_channels, 3, 1, device),
            dropout,
            shortcut,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let pre = self.relu.forward(self.bn1.forward(x.clone()));

        // A projecting shortcut sees the pre-activated input, the identity sees the raw one
        let shortcut = match &self.shortcut {
            Some(projection) => projection.forward(pre.clone()),
            None => x,
        };

        let out = self.conv1.forward(pre);
        let out = self.relu.forward(self.bn2.forward(out));
        let out = match &self.dropout {
            Some(dropout) => dropout.forward(out),
            None => out,
        };
        let out = self.conv2.forward(out);

        shortcut + out
    }
}

/// A stage of `n` basic blocks; only the first one changes width and stride
#[derive(Module, Debug)]
pub struct NetworkBlock<B: Backend> {
    layers: Vec<BasicBlock<B>>,
}

impl<B: Backend> NetworkBlock<B> {
    pub fn new(
        num_layers: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        drop_rate: f64,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|i| {
                let (block_in, block_stride) = if i == 0 {
                    (in_channels, stride)
                } else {
                    (out_channels, 1)
                };
                BasicBlock::new(block_in, out_channels, block_stride, drop_rate, device)
            })
            .collect();

        Self { layers }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.layers.iter().fold(x, |x, layer| layer.forward(x))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

}

/// Wide Residual Network
#[derive(Module, Debug)]
pub struct WideResNet<B: Backend> {
    conv1: Conv2d<B>,
    block1: NetworkBlock<B>,
    block2: NetworkBlock<B>,
    block3: NetworkBlock<B>,
    bn: BatchNorm<B>,
    relu: Relu,
    pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> WideResNet<B> {
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.block1.forward(x);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);
        let x = self.relu.forward(self.bn.forward(x));

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(x)
    }
}

impl<B: Backend> ImageClassifier<B> for WideResNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        WideResNet::forward(self, images)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = WideResNetConfig::new(10, 10)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 10]);
        assert_eq!(ImageClassifier::num_classes(&model), 10);
    }

    #[test]
    fn test_widened_with_dropout_shape() {
        let device = Default::default();
        let model = WideResNetConfig::new(16, 7)
            .with_widen_factor(2)
            .with_drop_rate(0.3)
            .init::<TestBackend>(&device)
            .unwrap();

        assert_eq!(model.block1.len(), 2);
        assert_eq!(model.block3.len(), 2);

        let input = Tensor::<TestBackend, 4>::ones([3, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [3, 7]);
    }

    #[test]
    fn test_invalid_depth_rejected() {
        let device = Default::default();
        for depth in [4, 9, 27, 29] {
            let result = WideResNetConfig::new(depth, 10).init::<TestBackend>(&device);
            assert!(matches!(result, Err(CifarError::Model(_))), "depth {}", depth);
        }
    }

    #[test]
    fn test_invalid_hyperparameters_rejected() {
        let device = Default::default();
        assert!(WideResNetConfig::new(10, 10)
            .with_widen_factor(0)
            .init::<TestBackend>(&device)
            .is_err());
        assert!(WideResNetConfig::new(10, 10)
            .with_drop_rate(1.0)
            .init::<TestBackend>(&device)
            .is_err());
        assert!(WideResNetConfig::new(10, 0).init::<TestBackend>(&device).is_err());
    }

    #[test]
    fn test_channels_and_name() {
        let config = WideResNetConfig::new(28, 10).with_widen_factor(10);
        assert_eq!(config.channels(), [16, 160, 320, 640]);
        assert_eq!(config.blocks_per_stage().unwrap(), 4);
        assert_eq!(config.name(), "WRN-28-10");
    }

    #[test]
    fn test_layer_summary() {
        let lines = WideResNetConfig::new(28, 10)
            .with_widen_factor(10)
            .layer_summary()
            .unwrap();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "stem: conv3x3 3 -> 16");
        assert_eq!(lines[1], "stage 1: 4 x BasicBlock 16 -> 160, stride 1");
        assert_eq!(lines[3], "stage 3: 4 x BasicBlock 320 -> 640, stride 2");
        assert!(lines[4].ends_with("640 -> 10"));

        assert!(WideResNetConfig::new(12, 10).layer_summary().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = WideResNetConfig::new(16, 10)
            .with_widen_factor(4)
            .with_drop_rate(0.3);
        let json = serde_json::to_string(&config).unwrap();
        let loaded: WideResNetConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded.depth, 16);
        assert_eq!(loaded.widen_factor, 4);
        assert_eq!(loaded.drop_rate, 0.3);
        assert_eq!(loaded.name(), "WRN-16-4");
    }

    #[test]
    fn test_classifier_bias_zeroed() {
        let device = Default::default();
        let model = WideResNetConfig::new(10, 10)
            .init::<TestBackend>(&device)
            .unwrap();
        let bias = model.fc.bias.as_ref().unwrap().val();
        let values = bias.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_shortcut_only_when_width_changes() {
        let device = Default::default();
        let same = BasicBlock::<TestBackend>::new(16, 16, 1, 0.0, &device);
        let wider = BasicBlock::<TestBackend>::new(16, 32, 2, 0.0, &device);
        assert!(same.shortcut.is_none());
        assert!(wider.shortcut.is_some());

        let x = Tensor::<TestBackend, 4>::zeros([1, 16, 8, 8], &device);
        assert_eq!(wider.forward(x).dims(), [1, 32, 4, 4]);
    }

    #[test]
    fn test_param_count_grows_with_width() {
        let device = Default::default();
        let narrow = WideResNetConfig::new(10, 10).init::<TestBackend>(&device).unwrap();
        let wide = WideResNetConfig::new(10, 10)
            .with_widen_factor(2)
            .init::<TestBackend>(&device)
            .unwrap();
        assert!(crate::model::num_params(&wide) > crate::model::num_params(&narrow));
    }
}
