use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid resource quantity {value:?}: {reason}")]
    InvalidQuantity { value: String, reason: String },

    #[error("invalid PCIe bus address {0:?}")]
    InvalidPciAddress(String),

    #[error("device {id}: VRAM accounting mismatch (total {total}, used {used}, free {free})")]
    VramAccounting {
        id: String,
        total: u64,
        used: u64,
        free: u64,
    },

    #[error("device {id}: health score {score} outside [0, 100]")]
    HealthOutOfRange { id: String, score: f64 },
}
