use thiserror::Error;

/// Errors raised while interpreting shared domain values.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("unknown file kind: {0}")]
    UnknownFileKind(String),
}

pub type Result<T> = std::result::Result<T, Error>;
