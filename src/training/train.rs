use std::path::PathBuf;

use burn::{
    backend::NdArray,
    data::dataloader::DataLoaderBuilder,
    optim::AdamWConfig,
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::{LearnerBuilder, metric::LossMetric},
};

use crate::{
    config::DataConfig,
    dataset::{
        CloudDataset, InputMode, SegmentationBatcher, SegmentationConfig, SegmentationMode, split,
    },
    error::UNetError,
    model::{Checkpoint, UNet, UNetConfig},
};

use super::metrics::{DiceMetric, IoUMetric};

/// Directory under the model dir holding the final checkpoint.
pub const FINAL_CHECKPOINT: &str = "unet_final";

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub model: UNetConfig,
    #[config(default = 25)]
    pub num_epochs: usize,
    #[config(default = 8)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1e-4)]
    pub learning_rate: f64,
    #[config(default = 1e-5)]
    pub weight_decay: f32,
    /// Share of the samples held out for validation.
    #[config(default = 0.2)]
    pub val_split: f64,
    /// `[height, width]` every sample is resized to.
    #[config(default = "[256, 256]")]
    pub image_size: [usize; 2],
}

impl TrainingConfig {
    fn segmentation_config(&self) -> Result<SegmentationConfig, UNetError> {
        let input_mode = InputMode::from_channels(self.model.input_channels).ok_or_else(|| {
            UNetError::InvalidConfiguration(format!(
                "image files provide 1 or 3 channels, got {}",
                self.model.input_channels
            ))
        })?;

        let mode = match self.model.num_classes {
            1 => SegmentationMode::Binary,
            num_classes => SegmentationMode::Multiclass { num_classes },
        };

        Ok(SegmentationConfig::new(mode, input_mode, self.image_size))
    }

    pub fn artifact_dir(data: &DataConfig) -> PathBuf {
        data.model_dir.join("artifacts")
    }
}

/// Trains a network on the processed image/mask pairs described by `data` and
/// writes the result to `<model_dir>/unet_final`.
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    data: &DataConfig,
    device: B::Device,
) -> Result<UNet<B>, UNetError> {
    let segmentation = config.segmentation_config()?;
    let model = config.model.init::<B>(&device)?;

    data.ensure_dirs()?;
    let artifact_dir = TrainingConfig::artifact_dir(data);
    std::fs::create_dir_all(&artifact_dir)?;
    config.save(artifact_dir.join("config.json"))?;

    B::seed(config.seed);

    tracing::info!(
        "Loading samples from {:?} and {:?}",
        data.images_dir(),
        data.masks_dir()
    );
    let dataset = CloudDataset::from_dirs(data.images_dir(), data.masks_dir(), Some(config.image_size))?;
    let (train_dataset, valid_dataset) = split(dataset, config.val_split, config.seed)?;

    let batcher_train = SegmentationBatcher::<B>::new(device.clone(), segmentation.clone());
    let batcher_valid = SegmentationBatcher::<B::InnerBackend>::new(device.clone(), segmentation);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .shuffle(config.seed)
        .build(train_dataset);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(valid_dataset);

    tracing::info!(
        "Training for {} epochs, batch size {}, learning rate {}",
        config.num_epochs,
        config.batch_size,
        config.learning_rate
    );
    let optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay)
        .init();

    let learner = LearnerBuilder::new(&artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(DiceMetric::<NdArray>::new())
        .metric_valid_numeric(DiceMetric::<NdArray>::new())
        .metric_train_numeric(IoUMetric::<NdArray>::new())
        .metric_valid_numeric(IoUMetric::<NdArray>::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(vec![device])
        .num_epochs(config.num_epochs)
        .summary()
        .build(model, optimizer, config.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    let checkpoint = Checkpoint::new(data.model_dir.join(FINAL_CHECKPOINT));
    checkpoint.save(&config.model, &model_trained)?;
    tracing::info!("Final model saved to {:?}", checkpoint.dir());

    Ok(model_trained)
}
