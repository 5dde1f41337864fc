use thiserror::Error;

pub type Result<T> = std::result::Result<T, CalculatorError>;

#[derive(Error, Debug)]
pub enum CalculatorError {
    #[error("unknown hardware model {vendor}/{model}")]
    UnknownModel { vendor: String, model: String },

    #[error("unknown base model {0:?}")]
    UnknownBaseModel(String),

    #[error("invalid profile {model:?}: {reason}")]
    InvalidProfile { model: String, reason: String },

    #[error("profile {model:?} has no usable compute metric")]
    MissingComputeMetric { model: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
