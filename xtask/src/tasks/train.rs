use std::path::PathBuf;

use anyhow::Result;
use burn::backend::Autodiff;
use clap::Args;
use cloud_unet::{DataConfig, TrainingConfig, UNetConfig, UpsampleMode, train};

use super::Backend;

#[derive(Args)]
pub struct TrainArgs {
    #[arg(long, default_value_t = 1)]
    pub input_channels: usize,

    #[arg(long, default_value_t = 1)]
    pub num_classes: usize,

    #[arg(short, long, default_value_t = 25)]
    pub epochs: usize,

    #[arg(short, long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(short, long, default_value_t = 1e-4)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.2)]
    pub val_split: f64,

    /// Upsample with bilinear interpolation instead of transposed convolutions.
    #[arg(long)]
    pub bilinear: bool,

    #[arg(long, default_value_t = 64)]
    pub base_channels: usize,

    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// JSON data layout; defaults to `data/` and `models/` under the working directory.
    #[arg(long)]
    pub data_config: Option<PathBuf>,
}

impl TrainArgs {
    fn training_config(&self) -> TrainingConfig {
        let upsampling = if self.bilinear {
            UpsampleMode::Bilinear
        } else {
            UpsampleMode::TransposedConv
        };

        let model = UNetConfig::new(self.input_channels, self.num_classes)
            .with_upsampling(upsampling)
            .with_base_channels(self.base_channels);

        TrainingConfig::new(model)
            .with_num_epochs(self.epochs)
            .with_batch_size(self.batch_size)
            .with_learning_rate(self.lr)
            .with_val_split(self.val_split)
            .with_num_workers(self.num_workers)
            .with_seed(self.seed)
    }
}

pub fn run(args: &TrainArgs) -> Result<()> {
    let data = DataConfig::load_or_default(args.data_config.as_ref())?;
    let config = args.training_config();

    tracing::info!("Initializing device...");
    let device = Default::default();

    train::<Autodiff<Backend>>(&config, &data, device)?;

    tracing::info!("Training completed successfully!");
    Ok(())
}
