use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Why a browser upload was turned away before reaching storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown, expired, consumed, or currently in-flight token.
    #[error("Invalid or expired token. Start from the Telegram bot.")]
    InvalidToken,

    #[error("No file provided.")]
    NoFile,

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    /// Could not stage the payload locally.
    #[error("Upload failed: {0}")]
    Holding(#[from] tgdrive_storage::Error),

    #[error("Upload failed: {0}")]
    Io(#[from] std::io::Error),

    /// The detached delivery task panicked or was aborted.
    #[error("Upload failed: {0}")]
    Delivery(#[from] tokio::task::JoinError),
}

impl Error {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidToken | Self::NoFile => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::Holding(_) | Self::Io(_) | Self::Delivery(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
