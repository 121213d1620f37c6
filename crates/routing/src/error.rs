use std::time::Duration;

/// Why an automatic relay did not produce a delivery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not prepare a local copy: {0}")]
    Holding(#[from] tgdrive_storage::Error),

    #[error("could not download the file: {0}")]
    Fetch(#[from] tgdrive_channels::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Transfer(String),
}

pub type Result<T> = std::result::Result<T, Error>;
