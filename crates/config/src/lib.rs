//! Configuration loading, env substitution, env overrides and validation.
//!
//! Config files: `tgdrive.toml`, `tgdrive.yaml`, `tgdrive.yml` or `tgdrive.json`,
//! searched in `./` then `~/.config/tgdrive/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        DriveConfig, MetricsConfig, ServerConfig, TelegramConfig, TgdriveConfig, UploadConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
