use burn::{config::ConfigError, record::RecorderError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UNetError {
    /// Constructor parameters that cannot describe a network.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input tensor or restored weights incompatible with the configured architecture.
    #[error("Shape mismatch for `{context}`: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Record error: {0:?}")]
    Recorder(RecorderError),

    #[error("Config error: {0:?}")]
    Config(ConfigError),

    #[error("I/O error: `{0}`")]
    Io(#[from] std::io::Error),

    #[error("Image error: `{0}`")]
    Image(#[from] image::ImageError),

    #[error("Dataset error: {0}")]
    Dataset(String),
}

impl From<RecorderError> for UNetError {
    fn from(error: RecorderError) -> Self {
        UNetError::Recorder(error)
    }
}

impl From<ConfigError> for UNetError {
    fn from(error: ConfigError) -> Self {
        UNetError::Config(error)
    }
}
