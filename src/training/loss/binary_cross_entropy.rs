use std::marker::PhantomData;

use burn::prelude::*;

const EPSILON: f64 = 1e-7;

/// Configuration to create a [BinarySegmentationLoss].
#[derive(Config, Debug)]
pub struct BinarySegmentationLossConfig {
    /// Weight of cloud pixels relative to clear-sky pixels.
    #[config(default = 1.0)]
    pub pos_weight: f32,
}

impl BinarySegmentationLossConfig {
    pub fn init<B: Backend>(&self, _device: &B::Device) -> BinarySegmentationLoss<B> {
        assert!(
            self.pos_weight > 0.,
            "Positive weight must be positive. Got {}",
            self.pos_weight
        );
        BinarySegmentationLoss {
            pos_weight: self.pos_weight,
            _b: PhantomData,
        }
    }
}

/// Binary cross entropy on sigmoid probabilities.
///
/// - probabilities: `[batch_size, 1, height, width]` in `[0, 1]`
/// - targets: `[batch_size, 1, height, width]` with values 0 or 1
#[derive(Module, Debug)]
pub struct BinarySegmentationLoss<B: Backend> {
    pub pos_weight: f32,
    _b: PhantomData<B>,
}

impl<B: Backend> BinarySegmentationLoss<B> {
    pub fn forward(&self, probabilities: Tensor<B, 4>, targets: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        assert_eq!(
            probabilities.dims(),
            targets.dims(),
            "Shape mismatch: probabilities ({:?}) vs targets ({:?})",
            probabilities.dims(),
            targets.dims()
        );

        let probabilities = probabilities.clamp(EPSILON, 1.0 - EPSILON);
        let targets = targets.float();

        let positive = targets.clone() * probabilities.clone().log() * self.pos_weight;
        let negative = targets.neg().add_scalar(1.0) * probabilities.neg().add_scalar(1.0).log();

        (positive + negative).neg().mean()
    }
}
