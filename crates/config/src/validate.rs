//! Semantic checks on a fully loaded configuration.

use std::fmt;

use crate::schema::TgdriveConfig;

/// Drive rejects resumable chunks that are not a multiple of this.
pub const DRIVE_CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Largest accepted `upload.chunk_size_bytes`; one chunk is held in memory
/// per transfer.
pub const MAX_CHUNK_SIZE: u64 = 256 * 1024 * 1024;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "upload.chunk_size_bytes"
    pub path: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn error(&mut self, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            path,
            message: message.into(),
        });
    }

    fn warning(&mut self, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            path,
            message: message.into(),
        });
    }
}

/// Validate a loaded config (after env overrides).
#[must_use]
pub fn validate(config: &TgdriveConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !config.telegram.has_token() {
        result.error("telegram.token", "bot token is not set (BOT_TOKEN)");
    }
    if !config.drive.has_credentials() {
        result.error(
            "drive.credentials",
            "service-account credentials are not set (GDRIVE_CREDENTIALS)",
        );
    }
    if config.drive.folder_id.trim().is_empty() {
        result.error("drive.folder_id", "target folder is not set (GDRIVE_FOLDER_ID)");
    }
    for (path, value) in [
        ("drive.api_base", &config.drive.api_base),
        ("drive.upload_base", &config.drive.upload_base),
    ] {
        if url::Url::parse(value).is_err() {
            result.error(path, format!("not a valid URL: {value}"));
        }
    }

    let server = &config.server;
    if server.base_url.trim().is_empty() {
        result.warning(
            "server.base_url",
            format!(
                "public base URL is not set (BASE_URL); upload links will use {}",
                server.public_base_url()
            ),
        );
    } else if url::Url::parse(&server.base_url).is_err() {
        result.error(
            "server.base_url",
            format!("not a valid URL: {}", server.base_url),
        );
    }

    let upload = &config.upload;
    if upload.chunk_size_bytes == 0 || upload.chunk_size_bytes % DRIVE_CHUNK_GRANULARITY != 0 {
        result.error(
            "upload.chunk_size_bytes",
            format!(
                "must be a positive multiple of {DRIVE_CHUNK_GRANULARITY} bytes, got {}",
                upload.chunk_size_bytes
            ),
        );
    } else if upload.chunk_size_bytes > MAX_CHUNK_SIZE {
        result.error(
            "upload.chunk_size_bytes",
            format!(
                "must be at most {MAX_CHUNK_SIZE} bytes, got {}",
                upload.chunk_size_bytes
            ),
        );
    }
    if upload.chunk_max_attempts == 0 {
        result.error("upload.chunk_max_attempts", "must be at least 1");
    }
    if upload.accepted_kinds.is_empty() {
        result.error(
            "upload.accepted_kinds",
            "no attachment kind is accepted; the bot would reject every file",
        );
    }
    if upload.session_ttl_secs == 0 {
        result.error("upload.session_ttl_secs", "upload links would expire immediately");
    }
    if upload.auto_relay_timeout_secs == 0 {
        result.error("upload.auto_relay_timeout_secs", "must be at least 1 second");
    }
    if upload.threshold_bytes > upload.max_body_bytes {
        result.warning(
            "upload.threshold_bytes",
            "threshold exceeds max_body_bytes; handed-off files near the threshold cannot be uploaded",
        );
    }

    result
}
