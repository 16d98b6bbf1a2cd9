use burn::{
    nn::{
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        interpolate::{Interpolate2d, Interpolate2dConfig, InterpolateMode},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

use super::shapes::{ParamShapes, push_param};

/// (3x3 conv => batch norm => ReLU) * 2
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> DoubleConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.norm1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.norm2.forward(x);

        self.activation.forward(x)
    }

}

impl<B: Backend> DoubleConvRecord<B> {
    pub(crate) fn collect_shapes(&self, prefix: &str, shapes: &mut ParamShapes) {
        push_param(shapes, format!("{prefix}.conv1.weight"), &self.conv1.weight);
        push_param(shapes, format!("{prefix}.norm1.gamma"), &self.norm1.gamma);
        push_param(shapes, format!("{prefix}.norm1.beta"), &self.norm1.beta);
        push_param(shapes, format!("{prefix}.conv2.weight"), &self.conv2.weight);
        push_param(shapes, format!("{prefix}.norm2.gamma"), &self.norm2.gamma);
        push_param(shapes, format!("{prefix}.norm2.beta"), &self.norm2.beta);
    }
}

#[derive(Config, Debug)]
pub struct DoubleConvConfig {
    in_channels: usize,
    out_channels: usize,
    /// Channels between the two convolutions. Defaults to `out_channels`.
    mid_channels: Option<usize>,
}

impl DoubleConvConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DoubleConv<B> {
        let mid_channels = self.mid_channels.unwrap_or(self.out_channels);

        DoubleConv {
            conv1: Conv2dConfig::new([self.in_channels, mid_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            norm1: BatchNormConfig::new(mid_channels).init(device),
            conv2: Conv2dConfig::new([mid_channels, self.out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            norm2: BatchNormConfig::new(self.out_channels).init(device),
            activation: Relu::new(),
        }
    }
}

/// Downscaling with a 2x2 max pool followed by a [DoubleConv].
#[derive(Module, Debug)]
pub struct Down<B: Backend> {
    max_pool: MaxPool2d,
    conv: DoubleConv<B>,
}

impl<B: Backend> Down<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.max_pool.forward(x);

        self.conv.forward(x)
    }
}

impl<B: Backend> DownRecord<B> {
    pub(crate) fn collect_shapes(&self, prefix: &str, shapes: &mut ParamShapes) {
        self.conv.collect_shapes(&format!("{prefix}.conv"), shapes);
    }
}

#[derive(Config, Debug)]
pub struct DownConfig {
    in_channels: usize,
    out_channels: usize,
}

impl DownConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Down<B> {
        Down {
            max_pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv: DoubleConvConfig::new(self.in_channels, self.out_channels).init(device),
        }
    }
}

/// Upscaling, alignment with the skip connection, then a [DoubleConv].
///
/// With a transposed convolution the deep feature map loses half of its channels
/// while being upsampled; bilinear interpolation keeps them all. Exactly one of
/// `deconv` and `interpolate` is set.
#[derive(Module, Debug)]
pub struct Up<B: Backend> {
    deconv: Option<ConvTranspose2d<B>>,
    interpolate: Option<Interpolate2d>,
    conv: DoubleConv<B>,
}

impl<B: Backend> Up<B> {
    pub fn forward(&self, deep: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match (&self.deconv, &self.interpolate) {
            (Some(deconv), _) => deconv.forward(deep),
            (None, Some(interpolate)) => interpolate.forward(deep),
            (None, None) => deep,
        };

        let [_, _, height, width] = skip.dims();
        let x = align_spatial(x, [height, width]);
        let x = Tensor::cat(vec![skip, x], 1);

        self.conv.forward(x)
    }

    pub fn is_bilinear(&self) -> bool {
        self.deconv.is_none()
    }
}

impl<B: Backend> UpRecord<B> {
    pub(crate) fn collect_shapes(&self, prefix: &str, shapes: &mut ParamShapes) {
        if let Some(deconv) = &self.deconv {
            push_param(shapes, format!("{prefix}.deconv.weight"), &deconv.weight);
            if let Some(bias) = &deconv.bias {
                push_param(shapes, format!("{prefix}.deconv.bias"), bias);
            }
        }
        self.conv.collect_shapes(&format!("{prefix}.conv"), shapes);
    }
}

#[derive(Config, Debug)]
pub struct UpConfig {
    /// Channels of the deeper feature map entering the stage.
    deep_channels: usize,
    /// Channels of the skip connection it is concatenated with.
    skip_channels: usize,
    out_channels: usize,
    #[config(default = false)]
    bilinear: bool,
}

impl UpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Up<B> {
        let (deconv, interpolate, upsampled_channels) = if self.bilinear {
            let interpolate = Interpolate2dConfig::new()
                .with_scale_factor(Some([2.0, 2.0]))
                .with_mode(InterpolateMode::Linear)
                .init();
            (None, Some(interpolate), self.deep_channels)
        } else {
            let half = self.deep_channels / 2;
            let deconv = ConvTranspose2dConfig::new([self.deep_channels, half], [2, 2])
                .with_stride([2, 2])
                .init(device);
            (Some(deconv), None, half)
        };

        Up {
            deconv,
            interpolate,
            conv: DoubleConvConfig::new(upsampled_channels + self.skip_channels, self.out_channels)
                .init(device),
        }
    }
}

/// Pads (or crops) the two spatial dimensions of `x` to exactly `[height, width]`.
///
/// Padding is zero-filled and split as evenly as possible; when the difference
/// is odd the trailing edge receives the extra row/column.
pub fn align_spatial<B: Backend>(x: Tensor<B, 4>, [height, width]: [usize; 2]) -> Tensor<B, 4> {
    let [_, _, current_height, current_width] = x.dims();
    let x = crop_dim(x, 2, current_height, height);
    let x = crop_dim(x, 3, current_width, width);

    let [_, _, current_height, current_width] = x.dims();
    let (top, bottom) = split_padding(height - current_height);
    let (left, right) = split_padding(width - current_width);

    if top + bottom + left + right == 0 {
        return x;
    }

    x.pad((left, right, top, bottom), 0.0)
}

/// Splits `diff` into (leading, trailing) amounts, trailing getting the remainder.
pub fn split_padding(diff: usize) -> (usize, usize) {
    let leading = diff / 2;
    (leading, diff - leading)
}

fn crop_dim<B: Backend>(x: Tensor<B, 4>, dim: usize, current: usize, target: usize) -> Tensor<B, 4> {
    if current <= target {
        return x;
    }
    // Cropping is padding by a negative amount: the leading edge loses the larger half.
    let excess = current - target;
    let (_, start) = split_padding(excess);
    x.narrow(dim, start, target)
}
