use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtenderError>;

#[derive(Error, Debug)]
pub enum ExtenderError {
    #[error("server error: {0}")]
    Server(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
