use std::path::Path;

use burn::prelude::*;
use image::{DynamicImage, GrayImage};

use crate::{
    error::UNetError,
    model::{Checkpoint, UNet, UNetConfig},
    preprocess::{image_to_tensor, mask_to_gray},
};

const THRESHOLD: f64 = 0.5;

pub struct Prediction<B: Backend> {
    /// `[num_classes, height, width]`
    pub probabilities: Tensor<B, 3>,
    /// Cloud pixels at 255 for a binary network, class indices spread over
    /// `0..=255` otherwise.
    pub mask: GrayImage,
}

/// A restored network ready to segment single images.
pub struct Predictor<B: Backend> {
    config: UNetConfig,
    model: UNet<B>,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(config: UNetConfig, model: UNet<B>, device: B::Device) -> Self {
        Self {
            config,
            model,
            device,
        }
    }

    pub fn load<P: AsRef<Path>>(checkpoint_dir: P, device: &B::Device) -> Result<Self, UNetError> {
        let (config, model) = Checkpoint::new(checkpoint_dir).load::<B>(device)?;

        tracing::info!(
            "Loaded {}-channel model with {} output classes",
            config.input_channels,
            config.num_classes
        );
        Ok(Self::new(config, model, device.clone()))
    }

    pub fn config(&self) -> &UNetConfig {
        &self.config
    }

    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction<B>, UNetError> {
        let input = image_to_tensor::<B>(image, self.model.input_channels(), &self.device)?;
        let probabilities = self.model.predict(input)?;
        let mask = rasterize(probabilities.clone())?;

        Ok(Prediction {
            probabilities,
            mask,
        })
    }

    /// Segments the image at `input` and writes the mask to `output`.
    pub fn predict_file<P: AsRef<Path>>(&self, input: P, output: P) -> Result<Prediction<B>, UNetError> {
        let image = image::open(input.as_ref())?;
        let prediction = self.predict_image(&image)?;

        if let Some(parent) = output.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        prediction.mask.save(output.as_ref())?;
        tracing::info!("Mask for {:?} written to {:?}", input.as_ref(), output.as_ref());

        Ok(prediction)
    }
}

fn rasterize<B: Backend>(probabilities: Tensor<B, 3>) -> Result<GrayImage, UNetError> {
    let [num_classes, _, _] = probabilities.dims();

    let mask = if num_classes == 1 {
        probabilities.greater_elem(THRESHOLD).int().mul_scalar(255)
    } else {
        probabilities
            .argmax(0)
            .mul_scalar(255)
            .div_scalar(num_classes as i64 - 1)
    };

    mask_to_gray(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::RgbImage;

    type TestBackend = NdArray<f32>;

    #[test]
    fn binary_probabilities_threshold_to_white() {
        let probabilities =
            Tensor::<TestBackend, 1>::from_floats([0.2, 0.7, 0.5, 0.9], &Default::default())
                .reshape([1, 2, 2]);

        let mask = rasterize(probabilities).unwrap();

        assert_eq!(mask.into_raw(), vec![0, 255, 0, 255]);
    }

    #[test]
    fn class_indices_spread_over_gray_levels() {
        let probabilities = Tensor::<TestBackend, 1>::from_floats(
            [0.8, 0.1, 0.1, 0.1, 0.8, 0.1, 0.1, 0.1, 0.8, 0.1, 0.1, 0.1],
            &Default::default(),
        )
        .reshape([4, 1, 3]);

        let mask = rasterize(probabilities).unwrap();

        assert_eq!(mask.into_raw(), vec![0, 85, 170]);
    }

    #[test]
    fn predicts_any_image_size() {
        let device = Default::default();
        let config = UNetConfig::new(3, 1).with_base_channels(4);
        let model = config.init::<TestBackend>(&device).unwrap();
        let predictor = Predictor::new(config, model, device);

        let image = DynamicImage::ImageRgb8(RgbImage::new(23, 17));
        let prediction = predictor.predict_image(&image).unwrap();

        assert_eq!(prediction.probabilities.dims(), [1, 17, 23]);
        assert_eq!(prediction.mask.dimensions(), (23, 17));
    }
}
