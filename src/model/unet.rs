use burn::{
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};

use crate::error::UNetError;

use super::{
    blocks::{DoubleConv, DoubleConvConfig, Down, DownConfig, Up, UpConfig},
    shapes::{ParamShapes, push_param},
};

/// Operator used by the decoder to double spatial resolution.
#[derive(Config, Debug, PartialEq)]
pub enum UpsampleMode {
    /// Learned 2x2 transposed convolution, stride 2.
    TransposedConv,
    /// Fixed bilinear interpolation.
    Bilinear,
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    inc: DoubleConv<B>,
    down1: Down<B>,
    down2: Down<B>,
    down3: Down<B>,
    down4: Down<B>,
    up1: Up<B>,
    up2: Up<B>,
    up3: Up<B>,
    up4: Up<B>,
    outc: Conv2d<B>,

    input_channels: usize,
    num_classes: usize,
}

#[derive(Config, Debug, PartialEq)]
pub struct UNetConfig {
    pub input_channels: usize,
    pub num_classes: usize,
    #[config(default = "UpsampleMode::TransposedConv")]
    pub upsampling: UpsampleMode,
    #[config(default = "64")]
    pub base_channels: usize,
    /// Whether the final 1x1 projection carries a bias.
    #[config(default = "true")]
    pub output_bias: bool,
}

impl UNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<UNet<B>, UNetError> {
        self.validate()?;

        let base = self.base_channels;
        let bilinear = self.upsampling == UpsampleMode::Bilinear;
        // Interpolation keeps channel counts while upsampling, so the bottleneck
        // is halved to keep the concatenations balanced.
        let deepest = if bilinear { base * 8 } else { base * 16 };
        let up = |deep: usize, skip: usize| UpConfig::new(deep, skip, skip).with_bilinear(bilinear);

        tracing::debug!(
            "Building U-Net: {} -> {} channels, base {}, {:?} upsampling",
            self.input_channels,
            self.num_classes,
            base,
            self.upsampling
        );

        Ok(UNet {
            inc: DoubleConvConfig::new(self.input_channels, base).init(device),
            down1: DownConfig::new(base, base * 2).init(device),
            down2: DownConfig::new(base * 2, base * 4).init(device),
            down3: DownConfig::new(base * 4, base * 8).init(device),
            down4: DownConfig::new(base * 8, deepest).init(device),
            up1: up(deepest, base * 8).init(device),
            up2: up(base * 8, base * 4).init(device),
            up3: up(base * 4, base * 2).init(device),
            up4: up(base * 2, base).init(device),
            outc: Conv2dConfig::new([base, self.num_classes], [1, 1])
                .with_bias(self.output_bias)
                .init(device),
            input_channels: self.input_channels,
            num_classes: self.num_classes,
        })
    }

    pub fn validate(&self) -> Result<(), UNetError> {
        if self.input_channels < 1 {
            return Err(UNetError::InvalidConfiguration(format!(
                "input channels must be at least 1, got {}",
                self.input_channels
            )));
        }
        if self.num_classes < 1 {
            return Err(UNetError::InvalidConfiguration(format!(
                "number of classes must be at least 1, got {}",
                self.num_classes
            )));
        }
        if self.base_channels < 1 {
            return Err(UNetError::InvalidConfiguration(format!(
                "base channels must be at least 1, got {}",
                self.base_channels
            )));
        }
        Ok(())
    }
}

impl<B: Backend> UNet<B> {
    /// Maps `[batch, input_channels, height, width]` images to
    /// `[batch, num_classes, height, width]` per-pixel probabilities.
    ///
    /// A single class goes through a sigmoid; several classes through a softmax
    /// over the channel axis.
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>, UNetError> {
        let [_, channels, _, _] = images.dims();
        if channels != self.input_channels {
            return Err(UNetError::ShapeMismatch {
                context: "input channels".to_string(),
                expected: self.input_channels.to_string(),
                actual: channels.to_string(),
            });
        }

        Ok(self.probabilities(images))
    }

    /// Single image variant of [UNet::forward]: `[channels, height, width]` in,
    /// `[num_classes, height, width]` out.
    pub fn predict(&self, image: Tensor<B, 3>) -> Result<Tensor<B, 3>, UNetError> {
        let output = self.forward(image.unsqueeze::<4>())?;

        Ok(output.squeeze::<3>(0))
    }

    /// Pre-activation class scores. The caller guarantees the channel count.
    pub(crate) fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x1 = self.inc.forward(images);
        let x2 = self.down1.forward(x1.clone());
        let x3 = self.down2.forward(x2.clone());
        let x4 = self.down3.forward(x3.clone());
        let x5 = self.down4.forward(x4.clone());

        let x = self.up1.forward(x5, x4);
        let x = self.up2.forward(x, x3);
        let x = self.up3.forward(x, x2);
        let x = self.up4.forward(x, x1);

        self.outc.forward(x)
    }

    pub(crate) fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let logits = self.logits(images);

        if self.num_classes == 1 {
            sigmoid(logits)
        } else {
            softmax(logits, 1)
        }
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Every learned parameter with its dimensions, keyed by stage path
    /// (`inc`, `down1`..`down4`, `up1`..`up4`, `outc`).
    pub fn param_shapes(&self) -> ParamShapes {
        self.clone().into_record().param_shapes()
    }
}

impl<B: Backend> UNetRecord<B> {
    /// Same listing as [UNet::param_shapes], read from a stored record before it
    /// is loaded into a network.
    pub fn param_shapes(&self) -> ParamShapes {
        let mut shapes = ParamShapes::new();

        self.inc.collect_shapes("inc", &mut shapes);
        self.down1.collect_shapes("down1", &mut shapes);
        self.down2.collect_shapes("down2", &mut shapes);
        self.down3.collect_shapes("down3", &mut shapes);
        self.down4.collect_shapes("down4", &mut shapes);
        self.up1.collect_shapes("up1", &mut shapes);
        self.up2.collect_shapes("up2", &mut shapes);
        self.up3.collect_shapes("up3", &mut shapes);
        self.up4.collect_shapes("up4", &mut shapes);

        push_param(&mut shapes, "outc.weight".to_string(), &self.outc.weight);
        if let Some(bias) = &self.outc.bias {
            push_param(&mut shapes, "outc.bias".to_string(), bias);
        }

        shapes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn small(input_channels: usize, num_classes: usize) -> UNetConfig {
        UNetConfig::new(input_channels, num_classes).with_base_channels(4)
    }

    #[test]
    fn rejects_zero_channels() {
        let device = Default::default();

        let result = UNetConfig::new(0, 1).init::<TestBackend>(&device);
        assert!(matches!(result, Err(UNetError::InvalidConfiguration(_))));

        let result = UNetConfig::new(1, 0).init::<TestBackend>(&device);
        assert!(matches!(result, Err(UNetError::InvalidConfiguration(_))));
    }

    #[test]
    fn channel_schedule_follows_mode() {
        let device = Default::default();
        let shapes = |mode: UpsampleMode| {
            small(1, 1)
                .with_upsampling(mode)
                .init::<TestBackend>(&device)
                .unwrap()
                .param_shapes()
        };
        let dims_of = |shapes: &ParamShapes, name: &str| {
            shapes
                .iter()
                .find(|(param, _)| param == name)
                .map(|(_, dims)| dims.clone())
                .unwrap()
        };

        let deconv = shapes(UpsampleMode::TransposedConv);
        assert_eq!(dims_of(&deconv, "down4.conv.conv2.weight"), vec![64, 64, 3, 3]);
        assert_eq!(dims_of(&deconv, "up1.deconv.weight"), vec![64, 32, 2, 2]);
        assert_eq!(dims_of(&deconv, "up1.conv.conv1.weight"), vec![32, 64, 3, 3]);
        assert_eq!(dims_of(&deconv, "up4.conv.conv2.weight"), vec![4, 4, 3, 3]);

        let bilinear = shapes(UpsampleMode::Bilinear);
        assert_eq!(dims_of(&bilinear, "down4.conv.conv2.weight"), vec![32, 32, 3, 3]);
        assert_eq!(dims_of(&bilinear, "up1.conv.conv1.weight"), vec![32, 64, 3, 3]);
        assert_eq!(dims_of(&bilinear, "up2.conv.conv1.weight"), vec![16, 48, 3, 3]);
        assert_eq!(dims_of(&bilinear, "up4.conv.conv1.weight"), vec![4, 12, 3, 3]);
        assert!(!bilinear.iter().any(|(name, _)| name.contains("deconv")));
    }

    #[test]
    fn output_bias_is_configurable() {
        let device = Default::default();

        let with_bias = small(1, 2).init::<TestBackend>(&device).unwrap();
        let without_bias = small(1, 2)
            .with_output_bias(false)
            .init::<TestBackend>(&device)
            .unwrap();

        assert!(with_bias.param_shapes().iter().any(|(name, _)| name == "outc.bias"));
        assert!(!without_bias.param_shapes().iter().any(|(name, _)| name == "outc.bias"));
    }

    #[test]
    fn predict_keeps_single_image_layout() {
        let device = Default::default();
        let model = small(3, 2).init::<TestBackend>(&device).unwrap();

        let image = Tensor::<TestBackend, 3>::zeros([3, 16, 16], &device);

        assert_eq!(model.predict(image).unwrap().dims(), [2, 16, 16]);
    }
}
