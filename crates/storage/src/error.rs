use std::error::Error as StdError;

/// Crate-wide result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend answered with a non-success status.
    #[error("{context}: backend returned {status}: {body}")]
    Api {
        context: String,
        status: u16,
        body: String,
    },

    /// The backend answered, but not in a shape the protocol allows.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Credentials could not be loaded or exchanged for a token.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapped source error from an external dependency.
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn protocol(message: impl std::fmt::Display) -> Self {
        Self::Protocol(message.to_string())
    }

    #[must_use]
    pub fn auth(message: impl std::fmt::Display) -> Self {
        Self::Auth(message.to_string())
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

    /// Build an [`Error::Api`] from a failed response, consuming its body.
    pub async fn from_response(context: impl Into<String>, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Api {
            context: context.into(),
            status,
            body: truncate_body(&body),
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 512;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_truncated() {
        let body = "e".repeat(2_000);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().count(), 513);
        assert!(truncated.ends_with('…'));
    }
}
