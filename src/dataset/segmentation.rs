use burn::{data::dataloader::batcher::Batcher, prelude::*};

use super::cloud::CloudItem;

/// Target value for pixels whose class is outside `0..num_classes`. Losses skip
/// these pixels and metrics never count them as any class.
pub const IGNORE_INDEX: usize = 255;

#[derive(Config, Debug)]
pub enum SegmentationMode {
    /// Cloud / no-cloud. Any non-zero mask value is a cloud pixel.
    Binary,
    Multiclass { num_classes: usize },
}

impl SegmentationMode {
    /// Output channels of a network trained for this mode.
    pub fn num_classes(&self) -> usize {
        match self {
            SegmentationMode::Binary => 1,
            SegmentationMode::Multiclass { num_classes } => *num_classes,
        }
    }
}

#[derive(Config, Debug)]
pub enum InputMode {
    Grayscale,
    RGB,
}

impl InputMode {
    pub fn channels(&self) -> usize {
        match self {
            InputMode::Grayscale => 1,
            InputMode::RGB => 3,
        }
    }

    pub fn from_channels(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(InputMode::Grayscale),
            3 => Some(InputMode::RGB),
            _ => None,
        }
    }
}

#[derive(Config, Debug)]
pub struct SegmentationConfig {
    pub mode: SegmentationMode,
    pub input_mode: InputMode,
    /// `[height, width]` of every batched image.
    pub image_size: [usize; 2],
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            mode: SegmentationMode::Binary,
            input_mode: InputMode::Grayscale,
            image_size: [256, 256],
        }
    }
}

#[derive(Clone)]
pub struct SegmentationBatcher<B: Backend> {
    device: B::Device,
    config: SegmentationConfig,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub fn new(device: B::Device, config: SegmentationConfig) -> Self {
        Self { device, config }
    }

    /// Channel-major image data with the configured channel count.
    fn image_values(&self, item: &CloudItem) -> Vec<f32> {
        let [height, width] = self.config.image_size;
        let plane = height * width;
        let channels = self.config.input_mode.channels();

        if item.is_empty() || item.height * item.width != plane {
            if !item.is_empty() {
                tracing::warn!(
                    "Item is {}x{}, expected {}x{}, using a blank image",
                    item.height,
                    item.width,
                    height,
                    width
                );
            }
            return vec![0.0; channels * plane];
        }

        let source = |channel: usize| &item.image[channel * plane..(channel + 1) * plane];

        match (channels, item.channels) {
            (target, found) if target == found => item.image.clone(),
            (1, 3) => (0..plane)
                .map(|i| 0.299 * source(0)[i] + 0.587 * source(1)[i] + 0.114 * source(2)[i])
                .collect(),
            (target, found) => (0..target)
                .flat_map(|channel| source(channel.min(found - 1)).iter().copied())
                .collect(),
        }
    }

    fn mask_values(&self, item: &CloudItem) -> Vec<i64> {
        let [height, width] = self.config.image_size;

        if item.is_empty() || item.mask.len() != height * width {
            return vec![0; height * width];
        }

        match self.config.mode {
            SegmentationMode::Binary => item.mask.iter().map(|&x| i64::from(x > 0)).collect(),
            SegmentationMode::Multiclass { num_classes } => {
                let mut out_of_range = 0;
                let values = item
                    .mask
                    .iter()
                    .map(|&x| {
                        if (x as usize) < num_classes {
                            x as i64
                        } else {
                            out_of_range += 1;
                            IGNORE_INDEX as i64
                        }
                    })
                    .collect();

                if out_of_range > 0 {
                    tracing::warn!(
                        "{} mask pixels are outside 0..{}, marked as ignored",
                        out_of_range,
                        num_classes
                    );
                }
                values
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SegmentationBatch<B: Backend> {
    /// `[batch, channels, height, width]`
    pub images: Tensor<B, 4, Float>,
    /// `[batch, 1, height, width]` class indices
    pub masks: Tensor<B, 4, Int>,
}

impl<B: Backend> Batcher<CloudItem, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<CloudItem>) -> SegmentationBatch<B> {
        let [height, width] = self.config.image_size;
        let channels = self.config.input_mode.channels();

        let mut images = Vec::with_capacity(items.len());
        let mut masks = Vec::with_capacity(items.len());

        for item in items {
            let image_tensor = Tensor::<B, 3>::from_data(
                TensorData::new(self.image_values(&item), Shape::new([channels, height, width]))
                    .convert::<B::FloatElem>(),
                &self.device,
            );

            let mask_tensor = Tensor::<B, 3, Int>::from_data(
                TensorData::new(self.mask_values(&item), Shape::new([1, height, width]))
                    .convert::<B::IntElem>(),
                &self.device,
            );

            images.push(image_tensor);
            masks.push(mask_tensor);
        }

        let images: Tensor<B, 4> = Tensor::stack::<4>(images, 0);
        let masks: Tensor<B, 4, Int> = Tensor::stack::<4>(masks, 0);

        SegmentationBatch { images, masks }
    }
}
