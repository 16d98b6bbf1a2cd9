//! Segmentation Cross Entropy Loss
//!
//! Extends burn's CrossEntropyLoss to `[batch, classes, height, width]` predictions
//! with per-pixel class index targets.
//! https://github.com/tracel-ai/burn/blob/v0.16.0/crates/burn-core/src/nn/loss/cross_entropy.rs

use burn::{
    module::{Content, DisplaySettings, ModuleDisplay},
    prelude::*,
    tensor::activation::log_softmax,
};

const EPSILON: f64 = 1e-7;

/// Configuration to create a [SegmentationCrossEntropyLoss] instance.
///
/// # Example
///
/// ```rust,ignore
/// let loss_fn = SegmentationCrossEntropyLossConfig::new()
///     .with_logits(false)
///     .with_smoothing(Some(0.1))
///     .with_ignore_index(Some(255))
///     .init(&device);
/// ```
#[derive(Config, Debug)]
pub struct SegmentationCrossEntropyLossConfig {
    /// Optional label smoothing factor (between 0.0 and 1.0).
    ///
    /// Hard labels {0, 1} will be changed to y_smoothed = y(1 - α) + α / nr_classes.
    pub smoothing: Option<f32>,

    /// Optional class weights for handling class imbalance.
    ///
    /// The loss of a pixel is multiplied by the weight of its target class, and the
    /// average is taken over the summed weights. All weights must be positive.
    pub weights: Option<Vec<f32>>,

    /// Whether predictions are logits (true) or probabilities (false).
    #[config(default = true)]
    pub logits: bool,

    /// Pixels whose target equals this index contribute neither loss nor gradient.
    pub ignore_index: Option<usize>,
}

impl SegmentationCrossEntropyLossConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegmentationCrossEntropyLoss<B> {
        self.assertions();
        SegmentationCrossEntropyLoss {
            weights: self
                .weights
                .as_ref()
                .map(|e| Tensor::<B, 1>::from_floats(e.as_slice(), device)),
            smoothing: self.smoothing,
            logits: self.logits,
            ignore_index: self.ignore_index,
        }
    }

    fn assertions(&self) {
        if let Some(alpha) = self.smoothing {
            assert!(
                (0.0..=1.).contains(&alpha),
                "Alpha of Cross-entropy loss with smoothed labels should be in interval [0, 1]. Got {}",
                alpha
            );
        };
        if let Some(weights) = self.weights.as_ref() {
            assert!(
                weights.iter().all(|e| e > &0.),
                "Weights of cross-entropy have to be positive."
            );
        }
    }
}

/// Pixel-wise cross entropy for multi-class segmentation.
///
/// # Input Tensor Shapes
///
/// - predictions: `[batch_size, num_classes, height, width]`
/// - targets: `[batch_size, 1, height, width]` integer class indices
///
/// Should be created using [SegmentationCrossEntropyLossConfig].
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct SegmentationCrossEntropyLoss<B: Backend> {
    /// Weights for cross-entropy.
    pub weights: Option<Tensor<B, 1>>,
    /// Label smoothing factor.
    pub smoothing: Option<f32>,
    /// Use logits as input.
    pub logits: bool,
    /// Ignore a specific index during loss calculation.
    pub ignore_index: Option<usize>,
}

impl<B: Backend> ModuleDisplay for SegmentationCrossEntropyLoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("weights", &self.weights)
            .add("smoothing", &self.smoothing)
            .add("logits", &self.logits)
            .add("ignore_index", &self.ignore_index)
            .optional()
    }
}

impl<B: Backend> SegmentationCrossEntropyLoss<B> {
    /// Mean loss over the valid (non-ignored) pixels.
    pub fn forward(&self, predictions: Tensor<B, 4>, targets: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        Self::assertions(&predictions, &targets);

        let [batch_size, num_classes, height, width] = predictions.dims();
        let total_elements = batch_size * height * width;
        let device = &predictions.device();

        let predictions = predictions
            .reshape([batch_size, num_classes, height * width])
            .permute([0, 2, 1])
            .reshape([total_elements, num_classes]);
        let targets: Tensor<B, 1, Int> = targets.reshape([total_elements]);

        let valid: Tensor<B, 1, Bool> = match self.ignore_index {
            Some(ignore_index) => targets.clone().not_equal_elem(ignore_index as i64),
            None => Tensor::<B, 1>::ones([total_elements], device).bool(),
        };
        // Ignored pixels may carry indices outside the class range.
        let targets = targets.mask_fill(valid.clone().bool_not(), 0);

        let log_probs = if self.logits {
            log_softmax(predictions, 1)
        } else {
            predictions.clamp(EPSILON, 1.0).log()
        };

        let smoothed_targets = Self::compute_smoothed_targets(
            [total_elements, num_classes],
            targets.clone(),
            self.smoothing.unwrap_or(0.0),
        );
        let pixel_loss = (smoothed_targets * log_probs)
            .sum_dim(1)
            .reshape([total_elements])
            .neg();

        let valid = valid.float();
        let (pixel_loss, denominator) = match &self.weights {
            Some(weights) => {
                let pixel_weights = weights.clone().gather(0, targets) * valid.clone();
                (pixel_loss * pixel_weights.clone(), pixel_weights.sum())
            }
            None => (pixel_loss * valid.clone(), valid.sum()),
        };

        pixel_loss.sum() / denominator.clamp_min(EPSILON)
    }

    fn compute_smoothed_targets(
        shape: [usize; 2],
        targets: Tensor<B, 1, Int>,
        alpha: f32,
    ) -> Tensor<B, 2> {
        let [total_elements, nr_classes] = shape;
        let device = &targets.device();
        let targets_matrix = Tensor::<B, 2>::zeros(shape, device).scatter(
            1,
            targets.reshape([total_elements, 1]),
            Tensor::ones([total_elements, 1], device),
        );
        targets_matrix * (1. - alpha) + alpha / nr_classes as f32
    }

    fn assertions(predictions: &Tensor<B, 4>, targets: &Tensor<B, 4, Int>) {
        let [pred_batch, _pred_classes, pred_height, pred_width] = predictions.dims();
        let [target_batch, target_channels, target_height, target_width] = targets.dims();

        assert_eq!(
            pred_batch, target_batch,
            "Batch size mismatch: predictions ({}) vs targets ({})",
            pred_batch, target_batch
        );

        assert_eq!(
            target_channels, 1,
            "Target should have exactly 1 channel, got {}",
            target_channels
        );

        assert_eq!(
            pred_height, target_height,
            "Height mismatch: predictions ({}) vs targets ({})",
            pred_height, target_height
        );

        assert_eq!(
            pred_width, target_width,
            "Width mismatch: predictions ({}) vs targets ({})",
            pred_width, target_width
        );
    }
}
