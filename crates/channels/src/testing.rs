//! In-memory [`ChatGateway`] that records what it sends.

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use {async_trait::async_trait, tgdrive_common::FileRef};

use crate::{ChatGateway, Error, Result};

#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(String, String)>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    sends_fail: AtomicBool,
    fetch_calls: AtomicUsize,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for file id `id`. Unknown ids fail to download.
    #[must_use]
    pub fn with_file(self, id: &str, bytes: impl Into<Vec<u8>>) -> Self {
        lock(&self.files).insert(id.to_string(), bytes.into());
        self
    }

    /// Make every `send_message` fail as if the user blocked the bot.
    #[must_use]
    pub fn fail_sends(self) -> Self {
        self.sends_fail.store(true, Ordering::SeqCst);
        self
    }

    /// Every message sent, as `(recipient, text)`.
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }

    pub fn messages_to(&self, recipient: &str) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter(|(to, _)| to == recipient)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn send_message(&self, to: &str, text: &str) -> Result<()> {
        if self.sends_fail.load(Ordering::SeqCst) {
            return Err(Error::unavailable("bot was blocked by the user"));
        }
        lock(&self.sent).push((to.to_string(), text.to_string()));
        Ok(())
    }

    async fn fetch_file(&self, file: &FileRef, dest: &Path) -> Result<u64> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = lock(&self.files)
            .get(&file.id)
            .cloned()
            .ok_or_else(|| Error::unavailable(format!("file {} is not available", file.id)))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}
