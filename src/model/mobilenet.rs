//! MobileNetV2
//!
//! Mobile-oriented classifier built from inverted residual blocks:
//! a 1x1 expansion, a 3x3 depthwise filter and a linear 1x1 projection, with
//! a skip connection whenever the block keeps its resolution and width.
//! Trained from scratch, so there are no pretrained weights to load.
//!
//! Architecture (input 224x224):
//! - Stem: Conv 3x3 stride 2 -> 32 channels
//! - 17 inverted residual blocks in 7 groups
//! - Conv 1x1 -> 1280 channels, global average pooling
//! - Dropout and linear classifier

use burn::{
    config::Config,
    module::{Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
        PaddingConfig2d,
    },
    tensor::{backend::Backend, Tensor},
};

use super::{fan_out_normal, ImageClassifier};
use crate::utils::error::CifarError;

/// Inverted residual groups as (expansion t, output channels c, repeats n, first stride s)
pub const INVERTED_RESIDUAL_SETTINGS: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

const STEM_CHANNELS: usize = 32;
const CHANNEL_DIVISOR: usize = 8;

/// Configuration for MobileNetV2
#[derive(Config, Debug)]
pub struct MobileNetV2Config {
    pub num_classes: usize,

    /// Scales every layer's width
    #[config(default = "1.0")]
    pub width_multiplier: f64,

    #[config(default = "0.2")]
    pub dropout: f64,

    /// Width of the final 1x1 convolution before pooling
    #[config(default = "1280")]
    pub last_channels: usize,
}

/// Round `value` to the nearest multiple of `divisor`, never dropping more than 10%
pub fn make_divisible(value: f64, divisor: usize) -> usize {
    let d = divisor as f64;
    let rounded = (((value + d / 2.0) / d).floor() * d).max(d);
    let rounded = if rounded < 0.9 * value { rounded + d } else { rounded };
    rounded as usize
}

impl MobileNetV2Config {
    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.num_classes == 0 {
            return Err(CifarError::Model("num_classes must be at least 1".to_string()));
        }
        if !(self.width_multiplier > 0.0) {
            return Err(CifarError::Model(format!(
                "width_multiplier must be positive, got {}",
                self.width_multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(CifarError::Model(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.last_channels == 0 {
            return Err(CifarError::Model("last_channels must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Width of the head convolution after applying the multiplier
    pub fn head_channels(&self) -> usize {
        make_divisible(
            self.last_channels as f64 * self.width_multiplier.max(1.0),
            CHANNEL_DIVISOR,
        )
    }

    /// One line per inverted-residual group plus stem and head
    pub fn layer_summary(&self) -> Vec<String> {
        let mut in_channels =
            make_divisible(STEM_CHANNELS as f64 * self.width_multiplier, CHANNEL_DIVISOR);
        let mut lines = vec![format!("stem: conv3x3 stride 2, 3 -> {}", in_channels)];

        for (group, &(expansion, channels, repeats, stride)) in
            INVERTED_RESIDUAL_SETTINGS.iter().enumerate()
        {
            let out_channels =
                make_divisible(channels as f64 * self.width_multiplier, CHANNEL_DIVISOR);
            lines.push(format!(
                "group {}: {} x InvertedResidual(t={}) {} -> {}, stride {}",
                group + 1,
                repeats,
                expansion,
                in_channels,
                out_channels,
                stride
            ));
            in_channels = out_channels;
        }

        let head_channels = self.head_channels();
        lines.push(format!("head: conv1x1 {} -> {}, global avg pool", in_channels, head_channels));
        lines.push(format!(
            "classifier: dropout {}, linear {} -> {}",
            self.dropout, head_channels, self.num_classes
        ));
        lines
    }

    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> crate::utils::error::Result<MobileNetV2<B>> {
        self.validate()?;

        let mut in_channels =
            make_divisible(STEM_CHANNELS as f64 * self.width_multiplier, CHANNEL_DIVISOR);
        let stem = ConvBnAct::new(3, in_channels, 3, 2, 1, true, device);

        let mut blocks = Vec::new();
        for &(expansion, channels, repeats, stride) in INVERTED_RESIDUAL_SETTINGS.iter() {
            let out_channels =
                make_divisible(channels as f64 * self.width_multiplier, CHANNEL_DIVISOR);
            for i in 0..repeats {
                let block_stride = if i == 0 { stride } else { 1 };
                blocks.push(InvertedResidual::new(
                    in_channels,
                    out_channels,
                    block_stride,
                    expansion,
                    device,
                ));
                in_channels = out_channels;
            }
        }

        let head_channels = self.head_channels();
        let head = ConvBnAct::new(in_channels, head_channels, 1, 1, 1, true, device);

        let mut classifier = LinearConfig::new(head_channels, self.num_classes)
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: 0.01,
            })
            .init(device);
        classifier.bias = Some(Param::from_tensor(Tensor::zeros([self.num_classes], device)));

        Ok(MobileNetV2 {
            stem,
            blocks,
            head,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            classifier,
            num_classes: self.num_classes,
        })
    }
}

fn relu6<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.clamp(0.0, 6.0)
}

/// Conv -> BatchNorm -> optional ReLU6
#[derive(Module, Debug)]
pub struct ConvBnAct<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
    activation: bool,
}

impl<B: Backend> ConvBnAct<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        activation: bool,
        device: &B::Device,
    ) -> Self {
        let padding = (kernel - 1) / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .with_initializer(fan_out_normal(kernel, out_channels))
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            activation,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.bn.forward(self.conv.forward(x));
        if self.activation {
            relu6(x)
        } else {
            x
        }
    }
}

/// Expand -> depthwise -> project, with an identity skip when shapes allow
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    expand: Option<ConvBnAct<B>>,
    depthwise: ConvBnAct<B>,
    project: ConvBnAct<B>,
    use_residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expansion: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expansion;
        let expand =
            (expansion != 1).then(|| ConvBnAct::new(in_channels, hidden, 1, 1, 1, true, device));

        Self {
            expand,
            depthwise: ConvBnAct::new(hidden, hidden, 3, stride, hidden, true, device),
            project: ConvBnAct::new(hidden, out_channels, 1, 1, 1, false, device),
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = match &self.expand {
            Some(expand) => expand.forward(x.clone()),
            None => x.clone(),
        };
        let out = self.project.forward(self.depthwise.forward(out));

        if self.use_residual {
            x + out
        } else {
            out
        }
    }
}

/// MobileNetV2 classifier
#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    stem: ConvBnAct<B>,
    blocks: Vec<InvertedResidual<B>>,
    head: ConvBnAct<B>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    classifier: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> MobileNetV2<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stem.forward(x);
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        let x = self.head.forward(x);

        let x = self.pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.dropout.forward(x);
        self.classifier.forward(x)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

impl<B: Backend> ImageClassifier<B> for MobileNetV2<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        MobileNetV2::forward(self, images)
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
    fn test_make_divisible() {
        assert_eq!(make_divisible(32.0, 8), 32);
        assert_eq!(make_divisible(16.0 * 0.5, 8), 8);
        assert_eq!(make_divisible(24.0 * 0.75, 8), 24);
        assert_eq!(make_divisible(3.0, 8), 8);
        assert_eq!(make_divisible(1280.0, 8), 1280);
    }

    #[test]
    fn test_block_count() {
        let device = Default::default();
        let model = MobileNetV2Config::new(10)
            .with_width_multiplier(0.35)
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(model.num_blocks(), 17);
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = MobileNetV2Config::new(10)
            .with_width_multiplier(0.35)
            .with_last_channels(64)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 10]);
    }

    #[test]
    fn test_layer_summary() {
        let lines = MobileNetV2Config::new(10).layer_summary();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "stem: conv3x3 stride 2, 3 -> 32");
        assert_eq!(lines[2], "group 2: 2 x InvertedResidual(t=6) 16 -> 24, stride 2");
        assert_eq!(lines[8], "head: conv1x1 320 -> 1280, global avg pool");
        assert!(lines[9].ends_with("linear 1280 -> 10"));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = MobileNetV2Config::new(10).with_width_multiplier(0.5);
        let json = serde_json::to_string(&config).unwrap();
        let loaded: MobileNetV2Config = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded.num_classes, 10);
        assert_eq!(loaded.width_multiplier, 0.5);
        assert_eq!(loaded.last_channels, 1280);
    }

    #[test]
    fn test_depthwise_init_uses_full_fan_out() {
        let device = Default::default();
        let depthwise = ConvBnAct::<TestBackend>::new(96, 96, 3, 1, 96, true, &device);
        let weights = depthwise
            .conv
            .weight
            .val()
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        let n = weights.len() as f64;
        let mean = weights.iter().map(|&w| w as f64).sum::<f64>() / n;
        let var = weights.iter().map(|&w| (w as f64 - mean).powi(2)).sum::<f64>() / n;
        let expected = (2.0f64 / (9.0 * 96.0)).sqrt();

        // 864 samples: the empirical std lands well within a factor of 1.5
        assert!(var.sqrt() < 1.5 * expected, "std {} vs {}", var.sqrt(), expected);
        assert!(var.sqrt() > expected / 1.5, "std {} vs {}", var.sqrt(), expected);
    }

    #[test]
    fn test_residual_only_for_matching_shapes() {
        let device = Default::default();
        let keep = InvertedResidual::<TestBackend>::new(16, 16, 1, 6, &device);
        let down = InvertedResidual::<TestBackend>::new(16, 24, 2, 6, &device);
        let no_expand = InvertedResidual::<TestBackend>::new(32, 16, 1, 1, &device);

        assert!(keep.use_residual);
        assert!(!down.use_residual);
        assert!(no_expand.expand.is_none());

        let x = Tensor::<TestBackend, 4>::ones([1, 16, 8, 8], &device);
        assert_eq!(down.forward(x).dims(), [1, 24, 4, 4]);
    }

    #[test]
    fn test_head_channels() {
        assert_eq!(MobileNetV2Config::new(10).head_channels(), 1280);
        // Narrow networks keep the full head
        assert_eq!(
            MobileNetV2Config::new(10).with_width_multiplier(0.5).head_channels(),
            1280
        );
        assert_eq!(
            MobileNetV2Config::new(10).with_width_multiplier(1.4).head_channels(),
            1792
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let device = Default::default();
        assert!(MobileNetV2Config::new(0).init::<TestBackend>(&device).is_err());
        assert!(MobileNetV2Config::new(10)
            .with_width_multiplier(0.0)
            .init::<TestBackend>(&device)
            .is_err());
        assert!(MobileNetV2Config::new(10)
            .with_dropout(1.5)
            .init::<TestBackend>(&device)
            .is_err());
    }
}
