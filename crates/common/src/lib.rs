//! Shared types, error definitions, and utilities used across all tgdrive crates.

pub mod error;
pub mod names;
pub mod types;

pub use {
    error::{Error, Result},
    names::sanitize_filename,
    types::{DeliveryOutcome, DeliveryStatus, FileAnnouncement, FileKind, FileRef},
};
