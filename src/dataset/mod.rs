mod cloud;
mod pairing;
mod segmentation;

pub use cloud::{CloudDataset, CloudItem, CloudItemRaw, CloudSplit, split};
pub use pairing::{pair_files, pairing_key};
pub use segmentation::{
    IGNORE_INDEX, InputMode, SegmentationBatch, SegmentationBatcher, SegmentationConfig,
    SegmentationMode,
};
