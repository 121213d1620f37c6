use std::error::Error as StdError;

/// Crate-wide result type for chat gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared by every [`ChatGateway`](crate::ChatGateway).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid (e.g. a malformed chat id).
    #[error("invalid chat input: {message}")]
    InvalidInput { message: String },

    /// The platform refuses the operation for this file or user.
    #[error("chat operation unavailable: {message}")]
    Unavailable { message: String },

    /// Wrapped source error from an external dependency.
    #[error("chat operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
