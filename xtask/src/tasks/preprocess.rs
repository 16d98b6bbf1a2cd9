use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use cloud_unet::{
    DataConfig,
    preprocess::{Normalization, PatchConfig, preprocess_file},
};

use super::Backend;

#[derive(Clone, Copy, ValueEnum)]
pub enum NormalizationArg {
    MinMax,
    ZScore,
}

impl From<NormalizationArg> for Normalization {
    fn from(arg: NormalizationArg) -> Self {
        match arg {
            NormalizationArg::MinMax => Normalization::MinMax,
            NormalizationArg::ZScore => Normalization::ZScore,
        }
    }
}

#[derive(Args)]
pub struct PreprocessArgs {
    /// Decoded scene image.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Cloud mask matching the scene.
    #[arg(short, long)]
    pub mask: Option<PathBuf>,

    #[arg(long, default_value_t = 256)]
    pub patch_size: usize,

    /// Defaults to the patch size.
    #[arg(long)]
    pub stride: Option<usize>,

    #[arg(long, value_enum, default_value_t = NormalizationArg::MinMax)]
    pub normalization: NormalizationArg,

    #[arg(long)]
    pub data_config: Option<PathBuf>,
}

pub fn run(args: &PreprocessArgs) -> Result<()> {
    let data = DataConfig::load_or_default(args.data_config.as_ref())?;
    data.ensure_dirs()?;

    let config = PatchConfig::new()
        .with_patch_size([args.patch_size, args.patch_size])
        .with_stride(args.stride.map(|stride| [stride, stride]));

    let written = preprocess_file::<Backend>(
        &args.input,
        args.mask.as_deref(),
        &args.normalization.into(),
        &config,
        &data.images_dir(),
        &data.masks_dir(),
        &Default::default(),
    )?;

    tracing::info!("Wrote {} patch files", written.len());
    Ok(())
}
