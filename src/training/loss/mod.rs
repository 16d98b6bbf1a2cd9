mod binary_cross_entropy;
mod cross_entropy;

pub use binary_cross_entropy::{BinarySegmentationLoss, BinarySegmentationLossConfig};
pub use cross_entropy::{SegmentationCrossEntropyLoss, SegmentationCrossEntropyLossConfig};
