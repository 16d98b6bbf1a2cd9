use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::error::UNetError;

use super::{
    shapes::ensure_same_shapes,
    unet::{UNet, UNetConfig, UNetRecord},
};

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model";

impl<B: Backend> UNet<B> {
    /// Writes the weights with burn's compact recorder. The recorder appends its
    /// own extension to `path`.
    pub fn save_weights<P: Into<PathBuf>>(&self, path: P) -> Result<(), UNetError> {
        self.clone().save_file(path.into(), &CompactRecorder::new())?;
        Ok(())
    }

    /// Loads weights saved by [UNet::save_weights], refusing records whose
    /// parameter set or shapes differ from the ones this network was built with.
    /// Optional parameters (biases, transposed convolutions) count: a record
    /// carrying one the network lacks is rejected, and the other way round.
    pub fn load_weights<P: Into<PathBuf>>(
        self,
        path: P,
        device: &B::Device,
    ) -> Result<Self, UNetError> {
        let record: UNetRecord<B> =
            Recorder::<B>::load(&CompactRecorder::new(), path.into(), device)?;

        ensure_same_shapes(&self.param_shapes(), &record.param_shapes())?;

        Ok(self.load_record(record))
    }
}

/// A directory holding a network configuration and its weights.
///
/// ```text
/// <dir>/config.json
/// <dir>/model.mpk
/// ```
#[derive(Debug, Clone)]
pub struct Checkpoint {
    dir: PathBuf,
}

impl Checkpoint {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.join(CONFIG_FILE).is_file()
    }

    pub fn save<B: Backend>(&self, config: &UNetConfig, model: &UNet<B>) -> Result<(), UNetError> {
        std::fs::create_dir_all(&self.dir)?;
        config.save(self.dir.join(CONFIG_FILE))?;
        model.save_weights(self.dir.join(WEIGHTS_FILE))?;

        tracing::info!("Saved checkpoint to {}", self.dir.display());
        Ok(())
    }

    pub fn config(&self) -> Result<UNetConfig, UNetError> {
        Ok(UNetConfig::load(self.dir.join(CONFIG_FILE))?)
    }

    /// Rebuilds the network described by the stored configuration.
    pub fn load<B: Backend>(&self, device: &B::Device) -> Result<(UNetConfig, UNet<B>), UNetError> {
        let config = self.config()?;
        let model = config
            .init::<B>(device)?
            .load_weights(self.dir.join(WEIGHTS_FILE), device)?;

        tracing::info!("Loaded checkpoint from {}", self.dir.display());
        Ok((config, model))
    }

    /// Restores weights into a network built from `config`. Fails with
    /// [UNetError::ShapeMismatch] when the checkpoint was written for another
    /// architecture.
    pub fn restore<B: Backend>(
        &self,
        config: &UNetConfig,
        device: &B::Device,
    ) -> Result<UNet<B>, UNetError> {
        let stored = self.config()?;
        if &stored != config {
            return Err(UNetError::ShapeMismatch {
                context: format!("checkpoint {}", self.dir.display()),
                expected: format!("{config:?}"),
                actual: format!("{stored:?}"),
            });
        }

        config
            .init::<B>(device)?
            .load_weights(self.dir.join(WEIGHTS_FILE), device)
    }
}
