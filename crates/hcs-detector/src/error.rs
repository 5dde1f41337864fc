use thiserror::Error;

pub type Result<T> = std::result::Result<T, DetectorError>;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("probe {probe}: {detail}")]
    Probe { probe: String, detail: String },

    #[error("no detector registered under {0:?}")]
    UnknownDetector(String),

    #[cfg(feature = "nvml")]
    #[error("nvml error: {0}")]
    Nvml(#[from] nvml_wrapper::error::NvmlError),
}
