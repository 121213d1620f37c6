//! Domain types shared between the chat side, the browser side and the
//! storage side of the relay.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Kind of chat attachment a file announcement carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Document,
    Photo,
    Video,
    Audio,
    Voice,
}

impl FileKind {
    pub const ALL: [FileKind; 5] = [
        FileKind::Document,
        FileKind::Photo,
        FileKind::Video,
        FileKind::Audio,
        FileKind::Voice,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Voice => "voice",
        }
    }

    /// File extension used when the chat platform gives no filename.
    #[must_use]
    pub fn fallback_extension(self) -> &'static str {
        match self {
            Self::Document => "bin",
            Self::Photo => "jpg",
            Self::Video => "mp4",
            Self::Audio => "mp3",
            Self::Voice => "ogg",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownFileKind(s.to_string()))
    }
}

/// Opaque platform handle used to fetch an announced file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
}

impl FileRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A file a chat user sent to the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnnouncement {
    /// Chat user that sent the file; every reply goes back to them.
    pub owner: String,
    pub kind: FileKind,
    pub file: FileRef,
    /// Size reported by the chat platform, `None` when it did not say.
    pub size: Option<u64>,
    pub filename_hint: Option<String>,
    pub mime_type: Option<String>,
}

/// Final state of a transfer, reported once to the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered {
        link: String,
    },
    Failed {
        detail: String,
        /// Backend object left behind without a usable public link.
        #[serde(skip_serializing_if = "Option::is_none")]
        orphaned_object: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub recipient: String,
    pub file_name: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    pub fn delivered(
        recipient: impl Into<String>,
        file_name: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            file_name: file_name.into(),
            status: DeliveryStatus::Delivered { link: link.into() },
        }
    }

    pub fn failed(
        recipient: impl Into<String>,
        file_name: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            file_name: file_name.into(),
            status: DeliveryStatus::Failed {
                detail: detail.into(),
                orphaned_object: None,
            },
        }
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered { .. })
    }

    #[must_use]
    pub fn link(&self) -> Option<&str> {
        match &self.status {
            DeliveryStatus::Delivered { link } => Some(link),
            DeliveryStatus::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        match &self.status {
            DeliveryStatus::Delivered { .. } => None,
            DeliveryStatus::Failed { detail, .. } => Some(detail),
        }
    }
}
