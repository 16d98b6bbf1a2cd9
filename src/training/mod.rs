pub mod learner;
pub mod loss;
pub mod metrics;
mod train;

pub use learner::SegmentationOutput;
pub use metrics::{DiceMetric, IoUMetric, SegmentationMetricInput};
pub use train::{FINAL_CHECKPOINT, TrainingConfig, train};
