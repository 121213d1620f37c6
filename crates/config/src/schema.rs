//! Config schema types (telegram, drive, upload policy, server, metrics).

use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tgdrive_common::FileKind,
};

const MIB: u64 = 1024 * 1024;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TgdriveConfig {
    pub telegram: TelegramConfig,
    pub drive: DriveConfig,
    pub upload: UploadConfig,
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
}

/// Telegram bot settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Long-polling timeout passed to `getUpdates` (seconds).
    pub poll_timeout_secs: u32,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            poll_timeout_secs: 30,
        }
    }
}

impl TelegramConfig {
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

/// Google Drive backend settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Service-account key, the JSON document itself (not a path).
    #[serde(serialize_with = "serialize_secret")]
    pub credentials: Secret<String>,

    /// Target folder ID; every upload lands in this folder.
    pub folder_id: String,

    /// Drive metadata API base.
    pub api_base: String,

    /// Drive media upload API base.
    pub upload_base: String,

    /// OAuth token endpoint override. The service-account key's own
    /// `token_uri` is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
}

impl std::fmt::Debug for DriveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveConfig")
            .field("credentials", &"[REDACTED]")
            .field("folder_id", &self.folder_id)
            .field("api_base", &self.api_base)
            .field("upload_base", &self.upload_base)
            .finish_non_exhaustive()
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            credentials: Secret::new(String::new()),
            folder_id: String::new(),
            api_base: "https://www.googleapis.com/drive/v3".into(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".into(),
            token_url: None,
        }
    }
}

impl DriveConfig {
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.credentials.expose_secret().trim().is_empty()
    }
}

/// Transfer routing and resumable-upload policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Files up to this size are relayed automatically; larger or unknown
    /// sizes get a browser upload link.
    pub threshold_bytes: u64,

    /// Resumable upload chunk size. Drive requires a multiple of 256 KiB.
    pub chunk_size_bytes: u64,

    /// Attempts per chunk before the whole transfer fails.
    pub chunk_max_attempts: u32,

    /// Base delay between chunk attempts, doubled after every failure.
    pub retry_backoff_ms: u64,

    /// Lifetime of a browser upload link.
    pub session_ttl_secs: u64,

    /// Deadline for the whole automatic relay (download + upload).
    pub auto_relay_timeout_secs: u64,

    /// Largest accepted browser upload request body.
    pub max_body_bytes: u64,

    /// Where temporary copies are held while uploading. Defaults to the OS
    /// temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Attachment kinds the bot accepts.
    pub accepted_kinds: Vec<FileKind>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: 20 * MIB,
            chunk_size_bytes: 10 * MIB,
            chunk_max_attempts: 3,
            retry_backoff_ms: 500,
            session_ttl_secs: 24 * 60 * 60,
            auto_relay_timeout_secs: 600,
            max_body_bytes: 4 * 1024 * MIB,
            temp_dir: None,
            accepted_kinds: FileKind::ALL.to_vec(),
        }
    }
}

impl UploadConfig {
    #[must_use]
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// HTTP server settings for the browser upload page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Public URL the browser reaches this server at, without trailing `/`.
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5000,
            base_url: String::new(),
        }
    }
}

impl ServerConfig {
    /// Base URL used in upload links. Falls back to the listen address when
    /// no public URL is configured.
    #[must_use]
    pub fn public_base_url(&self) -> String {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            let host = match self.bind.as_str() {
                "0.0.0.0" | "::" | "" => "localhost",
                other => other,
            };
            format!("http://{host}:{}", self.port)
        } else {
            trimmed.to_string()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}
