use burn::{
    backend::NdArray,
    prelude::*,
    tensor::{
        Int, Transaction,
        activation::{sigmoid, softmax},
        backend::AutodiffBackend,
    },
    train::{
        TrainOutput, TrainStep, ValidStep,
        metric::{Adaptor, ItemLazy, LossInput},
    },
};
use derive_new::new;

use crate::{
    dataset::{IGNORE_INDEX, SegmentationBatch},
    model::UNet,
};

use super::{
    loss::{BinarySegmentationLossConfig, SegmentationCrossEntropyLossConfig},
    metrics::SegmentationMetricInput,
};

#[derive(new)]
pub struct SegmentationOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    /// Per-pixel probabilities, `[batch, num_classes, height, width]`.
    pub output: Tensor<B, 4>,
    pub targets: Tensor<B, 4, Int>,
}

impl<B: Backend> ItemLazy for SegmentationOutput<B> {
    type ItemSync = SegmentationOutput<NdArray>;

    fn sync(self) -> Self::ItemSync {
        let [output, loss, targets] = Transaction::default()
            .register(self.output)
            .register(self.loss)
            .register(self.targets)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        let device = &Default::default();

        SegmentationOutput {
            output: Tensor::from_data(output, device),
            loss: Tensor::from_data(loss, device),
            targets: Tensor::from_data(targets, device),
        }
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<SegmentationMetricInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> SegmentationMetricInput<B> {
        SegmentationMetricInput::new(self.output.clone(), self.targets.clone())
    }
}

impl<B: Backend> UNet<B> {
    /// Binary cross entropy on sigmoid output for a single class, pixel-wise
    /// cross entropy over the softmax otherwise. Multiclass pixels labelled
    /// [IGNORE_INDEX] do not contribute to the loss.
    pub fn forward_segmentation(&self, item: SegmentationBatch<B>) -> SegmentationOutput<B> {
        let targets = item.masks;
        let logits = self.logits(item.images);
        let device = logits.device();

        let (loss, output) = if self.num_classes() == 1 {
            let output = sigmoid(logits);
            let loss = BinarySegmentationLossConfig::new()
                .init(&device)
                .forward(output.clone(), targets.clone());
            (loss, output)
        } else {
            let ignore_index = (self.num_classes() <= IGNORE_INDEX).then_some(IGNORE_INDEX);
            let loss = SegmentationCrossEntropyLossConfig::new()
                .with_ignore_index(ignore_index)
                .init(&device)
                .forward(logits.clone(), targets.clone());
            (loss, softmax(logits, 1))
        };

        SegmentationOutput {
            loss,
            output,
            targets,
        }
    }
}

impl<B: AutodiffBackend> TrainStep<SegmentationBatch<B>, SegmentationOutput<B>> for UNet<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> TrainOutput<SegmentationOutput<B>> {
        let item = self.forward_segmentation(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<SegmentationBatch<B>, SegmentationOutput<B>> for UNet<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> SegmentationOutput<B> {
        self.forward_segmentation(batch)
    }
}
