use thiserror::Error;

pub type Result<T> = std::result::Result<T, MutatorError>;

#[derive(Error, Debug)]
pub enum MutatorError {
    #[error("no runtime profile for vendor {0:?}")]
    ProfileNotFound(String),

    #[error("quota injection: {0}")]
    Quota(#[from] hcs_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
