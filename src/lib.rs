pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod preprocess;

#[cfg(feature = "dataset")]
pub mod dataset;

#[cfg(feature = "training")]
pub mod training;

pub use config::DataConfig;
pub use error::UNetError;
pub use inference::{Prediction, Predictor};
pub use model::{Checkpoint, UNet, UNetConfig, UpsampleMode};

#[cfg(feature = "dataset")]
pub use dataset::{InputMode, SegmentationConfig, SegmentationMode};

#[cfg(feature = "training")]
pub use training::{DiceMetric, IoUMetric, SegmentationOutput, TrainingConfig, train};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
