use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use burn::prelude::*;

use crate::error::UNetError;

/// Storage layout of the workflow: where raw downloads, processed patches and
/// trained models live, plus the known satellite data sources.
#[derive(Config, Debug)]
pub struct DataConfig {
    /// Source name to provider location (path or URL).
    pub sources: BTreeMap<String, String>,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub model_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        let sources = [
            ("isro_insat", "path_or_url_to_INSAT_data"),
            ("nasa_goes", "path_or_url_to_GOES_data"),
            ("nasa_modis", "path_or_url_to_MODIS_data"),
            ("esa_sentinel", "path_or_url_to_Sentinel_data"),
        ]
        .into_iter()
        .map(|(name, location)| (name.to_string(), location.to_string()))
        .collect();

        Self {
            sources,
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            model_dir: PathBuf::from("models"),
        }
    }
}

impl DataConfig {
    /// Reads a JSON config, or falls back to the defaults when `path` is `None`.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self, UNetError> {
        match path {
            Some(path) => Ok(Self::load(path)?),
            None => Ok(Self::default()),
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.processed_dir.join("all_sources_images")
    }

    pub fn masks_dir(&self) -> PathBuf {
        self.processed_dir.join("all_sources_masks")
    }

    /// `(name, raw dir, processed dir)` for every configured source.
    pub fn source_dirs(&self) -> impl Iterator<Item = (&str, PathBuf, PathBuf)> + '_ {
        self.sources.keys().map(|name| {
            (
                name.as_str(),
                self.raw_dir.join(name),
                self.processed_dir.join(name),
            )
        })
    }

    pub fn ensure_dirs(&self) -> Result<(), UNetError> {
        for dir in [
            self.raw_dir.clone(),
            self.processed_dir.clone(),
            self.model_dir.clone(),
            self.images_dir(),
            self.masks_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let config = DataConfig::default();

        assert_eq!(config.sources.len(), 4);
        assert_eq!(
            config.images_dir(),
            PathBuf::from("data/processed/all_sources_images")
        );
        assert_eq!(
            config.masks_dir(),
            PathBuf::from("data/processed/all_sources_masks")
        );

        let names: Vec<&str> = config.source_dirs().map(|(name, _, _)| name).collect();
        assert_eq!(names, vec!["esa_sentinel", "isro_insat", "nasa_goes", "nasa_modis"]);
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let config = DataConfig {
            processed_dir: dir.path().join("processed"),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = DataConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(loaded.processed_dir, config.processed_dir);
        assert_eq!(loaded.sources, config.sources);
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = DataConfig {
            raw_dir: dir.path().join("raw"),
            processed_dir: dir.path().join("processed"),
            model_dir: dir.path().join("models"),
            ..Default::default()
        };

        config.ensure_dirs().unwrap();

        assert!(config.images_dir().is_dir());
        assert!(config.masks_dir().is_dir());
        assert!(config.model_dir.is_dir());
    }
}
