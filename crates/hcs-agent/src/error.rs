use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("detector error: {0}")]
    Detector(#[from] hcs_detector::DetectorError),

    #[error("store error: {0}")]
    Store(#[from] hcs_core::StoreError),

    #[error("collector {collector}: {detail}")]
    Collector { collector: String, detail: String },

    #[error("agent already stopped")]
    AlreadyStopped,
}
