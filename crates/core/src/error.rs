use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// スキーマが期待する形になっていない。起動時に検出され、回復できない。
    #[error("Invalid partition state: {0}")]
    InvalidPartitionState(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
