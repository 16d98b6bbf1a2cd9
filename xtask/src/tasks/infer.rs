use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cloud_unet::Predictor;

use super::Backend;

#[derive(Args)]
pub struct InferArgs {
    /// Directory written by `train` (holds `config.json` and the weights).
    #[arg(short, long, default_value = "models/unet_final")]
    pub checkpoint: PathBuf,

    #[arg(short, long)]
    pub input: PathBuf,

    /// Mask PNG to write.
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn run(args: &InferArgs) -> Result<()> {
    let device = Default::default();
    let predictor = Predictor::<Backend>::load(&args.checkpoint, &device)?;

    predictor.predict_file(&args.input, &args.output)?;

    Ok(())
}
