use std::path::Path;

use {async_trait::async_trait, tgdrive_common::FileRef};

use crate::Result;

/// What the relay needs from a chat platform.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send a plain-text message to chat user `to`.
    async fn send_message(&self, to: &str, text: &str) -> Result<()>;

    /// Download an announced file into `dest` (an existing, empty file).
    /// Returns the number of bytes written.
    async fn fetch_file(&self, file: &FileRef, dest: &Path) -> Result<u64>;
}
