//! Metrics collection and export for tgdrive.
//!
//! Every crate records through the `metrics` facade behind its own optional
//! `metrics` feature, using the names in [`definitions`]. With the
//! `prometheus` feature the recorder renders them for `GET /metrics`.
//!
//! ```rust,ignore
//! use tgdrive_metrics::{counter, transfer};
//!
//! counter!(transfer::CHUNK_RETRIES_TOTAL).increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
