use log::error;
use thiserror::Error;

use crate::models::asset::AssetId;

pub type AssetResult<T> = std::result::Result<T, AssetError>;

#[derive(Debug, Error)]
pub enum AssetError {
    /// Input the lifecycle cannot accept: missing input, a processor that
    /// failed or yielded no image, an unregistered kind.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("asset {0} not found")]
    NotFound(AssetId),

    /// Store, queue, filesystem and codec failures. Safe to retry.
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl AssetError {
    pub fn validation(message: impl Into<String>) -> Self {
        AssetError::Validation(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AssetError::Transient(_))
    }
}

/// Log the whole context chain and hand the error back.
pub fn handle_error(error: anyhow::Error) -> anyhow::Error {
    let mut message = format!("{error}");
    for cause in error.chain().skip(1) {
        message.push_str(&format!("\ncaused by: {cause}"));
    }
    error!("{}", message);
    error
}
