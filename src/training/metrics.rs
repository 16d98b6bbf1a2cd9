use std::marker::PhantomData;

use burn::prelude::*;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};
use derive_new::new;

use crate::dataset::IGNORE_INDEX;

const SMOOTHING: f64 = 1e-6;
const THRESHOLD: f64 = 0.5;

#[derive(new)]
pub struct SegmentationMetricInput<B: Backend> {
    /// Probabilities, `[batch, num_classes, height, width]`.
    outputs: Tensor<B, 4>,
    /// Class indices, `[batch, 1, height, width]`.
    targets: Tensor<B, 4, Int>,
}

/// Pixel counts for one class: `(intersection, predicted, target)`.
fn overlap<B: Backend>(
    predictions: &Tensor<B, 4, Int>,
    targets: &Tensor<B, 4, Int>,
    class_idx: usize,
) -> (f64, f64, f64) {
    let pred_mask = predictions.clone().equal_elem(class_idx as i64).float();
    let target_mask = targets.clone().equal_elem(class_idx as i64).float();

    let intersection = (pred_mask.clone() * target_mask.clone())
        .sum()
        .into_scalar()
        .elem::<f64>();
    let predicted = pred_mask.sum().into_scalar().elem::<f64>();
    let target = target_mask.sum().into_scalar().elem::<f64>();

    (intersection, predicted, target)
}

/// Hard class map plus the classes a score is averaged over.
///
/// A single output channel is thresholded and only the cloud class is scored.
fn hard_predictions<B: Backend>(outputs: Tensor<B, 4>) -> (Tensor<B, 4, Int>, Vec<usize>) {
    let [_, n_classes, _, _] = outputs.dims();

    if n_classes == 1 {
        (outputs.greater_elem(THRESHOLD).int(), vec![1])
    } else {
        (outputs.argmax(1), (0..n_classes).collect())
    }
}

/// Class-averaged score of one sample, `None` when no class is present in
/// either map.
fn sample_score<B: Backend>(
    predictions: Tensor<B, 4, Int>,
    targets: Tensor<B, 4, Int>,
    classes: &[usize],
    score: &impl Fn(f64, f64, f64) -> f64,
) -> Option<f64> {
    let mut total = 0.0;
    let mut scored = 0;
    for class_idx in classes.iter().copied() {
        let (intersection, predicted, target) = overlap(&predictions, &targets, class_idx);
        // Classes absent from both maps would score a perfect 1 through smoothing.
        if classes.len() > 1 && predicted + target == 0.0 {
            continue;
        }
        total += score(intersection, predicted, target);
        scored += 1;
    }

    (scored > 0).then(|| total / scored as f64)
}

/// Per-sample class-averaged score, averaged over the samples of the batch.
/// Pixels labelled [IGNORE_INDEX] count for no class.
fn mean_score<B: Backend>(
    input: &SegmentationMetricInput<B>,
    score: impl Fn(f64, f64, f64) -> f64,
) -> f64 {
    let [batch_size, _, _, _] = input.outputs.dims();
    let (mut predictions, classes) = hard_predictions(input.outputs.clone());
    if classes.len() <= IGNORE_INDEX {
        let ignored = input.targets.clone().equal_elem(IGNORE_INDEX as i64);
        predictions = predictions.mask_fill(ignored, IGNORE_INDEX as i64);
    }

    let scores: Vec<f64> = (0..batch_size)
        .filter_map(|b| {
            sample_score(
                predictions.clone().slice([b..b + 1]),
                input.targets.clone().slice([b..b + 1]),
                &classes,
                &score,
            )
        })
        .collect();

    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

pub fn dice_score<B: Backend>(input: &SegmentationMetricInput<B>) -> f64 {
    mean_score(input, |intersection, predicted, target| {
        (2.0 * intersection + SMOOTHING) / (predicted + target + SMOOTHING)
    })
}

pub fn iou_score<B: Backend>(input: &SegmentationMetricInput<B>) -> f64 {
    mean_score(input, |intersection, predicted, target| {
        (intersection + SMOOTHING) / (predicted + target - intersection + SMOOTHING)
    })
}

pub struct DiceMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> DiceMetric<B> {
    pub fn new() -> Self {
        Self {
            state: NumericMetricState::default(),
            _b: PhantomData,
        }
    }
}

impl<B: Backend> Default for DiceMetric<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Metric for DiceMetric<B> {
    type Input = SegmentationMetricInput<B>;
    const NAME: &'static str = "Dice";

    fn update(&mut self, input: &SegmentationMetricInput<B>, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, _, _, _] = input.outputs.dims();

        self.state.update(
            100.0 * dice_score(input),
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for DiceMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

pub struct IoUMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> IoUMetric<B> {
    pub fn new() -> Self {
        Self {
            state: NumericMetricState::default(),
            _b: PhantomData,
        }
    }
}

impl<B: Backend> Default for IoUMetric<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Metric for IoUMetric<B> {
    type Input = SegmentationMetricInput<B>;
    const NAME: &'static str = "IoU";

    fn update(&mut self, input: &SegmentationMetricInput<B>, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, _, _, _] = input.outputs.dims();

        self.state.update(
            100.0 * iou_score(input),
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for IoUMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
