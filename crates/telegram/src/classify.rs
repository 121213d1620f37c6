//! Turns a Telegram [`Message`] into something the relay knows how to handle.

use {
    teloxide::types::{MediaKind, Message, MessageKind},
    tgdrive_common::{FileAnnouncement, FileKind, FileRef},
};

/// Bot commands the relay answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
}

#[derive(Debug, Clone)]
pub enum Classified {
    File(FileAnnouncement),
    Command(Command),
    /// Anything else a user sent: text, stickers, locations...
    Unsupported,
    /// Unknown commands and messages from other bots.
    Ignored,
}

/// Classify one incoming message.
pub fn classify(msg: &Message) -> Classified {
    if msg.from.as_ref().is_some_and(|u| u.is_bot) {
        return Classified::Ignored;
    }

    if let Some(text) = msg.text() {
        if let Some(command) = parse_command(text) {
            return match command {
                "start" => Classified::Command(Command::Start),
                "help" => Classified::Command(Command::Help),
                _ => Classified::Ignored,
            };
        }
        return Classified::Unsupported;
    }

    match extract_file(msg) {
        Some(announcement) => Classified::File(announcement),
        None => Classified::Unsupported,
    }
}

/// `"/start@my_bot payload"` -> `"start"`.
fn parse_command(text: &str) -> Option<&str> {
    let word = text.trim_start().strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    (!name.is_empty()).then_some(name)
}

struct Attachment {
    kind: FileKind,
    id: String,
    size: u32,
    name: Option<String>,
    mime: Option<String>,
}

fn extract_file(msg: &Message) -> Option<FileAnnouncement> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    let attachment = match &common.media_kind {
        MediaKind::Document(d) => Attachment {
            kind: FileKind::Document,
            id: d.document.file.id.clone(),
            size: d.document.file.size,
            name: d.document.file_name.clone(),
            mime: d.document.mime_type.as_ref().map(ToString::to_string),
        },
        // Largest size is last.
        MediaKind::Photo(p) => {
            let largest = p.photo.last()?;
            Attachment {
                kind: FileKind::Photo,
                id: largest.file.id.clone(),
                size: largest.file.size,
                name: None,
                mime: Some("image/jpeg".to_string()),
            }
        },
        MediaKind::Video(v) => Attachment {
            kind: FileKind::Video,
            id: v.video.file.id.clone(),
            size: v.video.file.size,
            name: v.video.file_name.clone(),
            mime: v.video.mime_type.as_ref().map(ToString::to_string),
        },
        MediaKind::Audio(a) => Attachment {
            kind: FileKind::Audio,
            id: a.audio.file.id.clone(),
            size: a.audio.file.size,
            name: a.audio.file_name.clone(),
            mime: a.audio.mime_type.as_ref().map(ToString::to_string),
        },
        MediaKind::Voice(v) => Attachment {
            kind: FileKind::Voice,
            id: v.voice.file.id.clone(),
            size: v.voice.file.size,
            name: None,
            mime: v.voice.mime_type.as_ref().map(ToString::to_string),
        },
        _ => return None,
    };

    Some(FileAnnouncement {
        owner: msg.chat.id.0.to_string(),
        kind: attachment.kind,
        file: FileRef::new(attachment.id),
        // Telegram omits file_size when it does not know it.
        size: (attachment.size > 0).then_some(u64::from(attachment.size)),
        filename_hint: attachment.name,
        mime_type: attachment.mime,
    })
}
