use mesa_core::AccessError;
use mesa_storage::StorageError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("access error: {0}")]
    Access(#[from] AccessError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid write batch: {0}")]
    Batch(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// True when the store could not answer; such a failure must never be
    /// reported as a decision.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            ApiError::Access(AccessError::StoreUnavailable(_))
                | ApiError::Storage(StorageError::Unavailable(_) | StorageError::Timeout(_))
        )
    }
}
