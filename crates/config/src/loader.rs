use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    env_subst::substitute_env,
    schema::TgdriveConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "tgdrive.toml",
    "tgdrive.yaml",
    "tgdrive.yml",
    "tgdrive.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<TgdriveConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./tgdrive.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/tgdrive/tgdrive.{toml,yaml,yml,json}` (user-global)
///
/// Returns `TgdriveConfig::default()` if no config file is found; the
/// environment overrides usually carry everything in that case.
pub fn discover_and_load() -> TgdriveConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    TgdriveConfig::default()
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists());
    if local.is_some() {
        return local;
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/tgdrive/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tgdrive").map(|d| d.config_dir().to_path_buf())
}

/// Apply the deployment environment variables on top of a loaded config.
///
/// `BOT_TOKEN`, `GDRIVE_CREDENTIALS`, `GDRIVE_FOLDER_ID`, `BASE_URL` and
/// `PORT` win over file values when set and non-empty.
pub fn apply_env_overrides(config: &mut TgdriveConfig) -> Result<()> {
    apply_env_overrides_with(config, |key| std::env::var(key).ok())
}

fn apply_env_overrides_with(
    config: &mut TgdriveConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(token) = get("BOT_TOKEN") {
        config.telegram.token = Secret::new(token);
    }
    if let Some(credentials) = get("GDRIVE_CREDENTIALS") {
        config.drive.credentials = Secret::new(credentials);
    }
    if let Some(folder) = get("GDRIVE_FOLDER_ID") {
        config.drive.folder_id = folder;
    }
    if let Some(base) = get("BASE_URL") {
        config.server.base_url = base.trim_end_matches('/').to_string();
    }
    if let Some(port) = get("PORT") {
        config.server.port = port
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| Error::InvalidOverride {
                key: "PORT",
                message: e.to_string(),
            })?;
    }
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> Result<TgdriveConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}
