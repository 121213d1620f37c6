//! In-memory [`StorageBackend`] with failure injection, for tests of the
//! transfer engine and of the crates that drive it.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {async_trait::async_trait, bytes::Bytes};

use crate::{
    backend::{
        ChunkStatus, ObjectId, ResumableRequest, ShareableLinks, StorageBackend, UploadHandle,
    },
    error::{Error, Result},
};

struct PendingUpload {
    request: ResumableRequest,
    received: Vec<u8>,
}

#[derive(Default)]
struct Faults {
    /// Chunk submissions to reject before behaving normally.
    failing_chunks: usize,
    every_chunk_fails: bool,
    chunks_stall: bool,
    chunk_delay: Option<Duration>,
    begin_fails: bool,
    grant_fails: bool,
    link_fetch_fails: bool,
    content_link_missing: bool,
    links_missing: bool,
}

#[derive(Default)]
struct State {
    pending: HashMap<String, PendingUpload>,
    objects: HashMap<String, (String, Vec<u8>)>,
    public: HashSet<String>,
    faults: Faults,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    next_id: AtomicUsize,
    begin_calls: AtomicUsize,
    chunk_calls: AtomicUsize,
    grant_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reject the next `n` chunk submissions.
    #[must_use]
    pub fn fail_chunks(self, n: usize) -> Self {
        self.lock().faults.failing_chunks = n;
        self
    }

    #[must_use]
    pub fn fail_every_chunk(self) -> Self {
        self.lock().faults.every_chunk_fails = true;
        self
    }

    /// Answer every chunk with "incomplete" without storing anything.
    #[must_use]
    pub fn stall_chunks(self) -> Self {
        self.lock().faults.chunks_stall = true;
        self
    }

    #[must_use]
    pub fn delay_chunks(self, delay: Duration) -> Self {
        self.lock().faults.chunk_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn fail_begin(self) -> Self {
        self.lock().faults.begin_fails = true;
        self
    }

    #[must_use]
    pub fn fail_grant(self) -> Self {
        self.lock().faults.grant_fails = true;
        self
    }

    #[must_use]
    pub fn fail_link_fetch(self) -> Self {
        self.lock().faults.link_fetch_fails = true;
        self
    }

    #[must_use]
    pub fn omit_content_link(self) -> Self {
        self.lock().faults.content_link_missing = true;
        self
    }

    #[must_use]
    pub fn omit_links(self) -> Self {
        self.lock().faults.links_missing = true;
        self
    }

    pub fn begin_calls(&self) -> usize {
        self.begin_calls.load(Ordering::SeqCst)
    }

    pub fn chunk_calls(&self) -> usize {
        self.chunk_calls.load(Ordering::SeqCst)
    }

    pub fn grant_calls(&self) -> usize {
        self.grant_calls.load(Ordering::SeqCst)
    }

    /// Contents of the stored object with this name, if any.
    pub fn object_named(&self, name: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .values()
            .find(|(stored, _)| stored == name)
            .map(|(_, data)| data.clone())
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_public(&self, object: &ObjectId) -> bool {
        self.lock().public.contains(&object.0)
    }

    /// Link the backend hands out for `object` when nothing is omitted.
    pub fn content_link(object: &ObjectId) -> String {
        format!("memory://objects/{object}?download")
    }

    pub fn view_link(object: &ObjectId) -> String {
        format!("memory://objects/{object}/view")
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn begin_resumable_upload(&self, request: &ResumableRequest) -> Result<UploadHandle> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.faults.begin_fails {
            return Err(Error::protocol("injected begin failure"));
        }
        let handle = format!("session-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        state.pending.insert(handle.clone(), PendingUpload {
            request: request.clone(),
            received: Vec::new(),
        });
        Ok(UploadHandle(handle))
    }

    async fn upload_chunk(
        &self,
        handle: &UploadHandle,
        offset: u64,
        total: u64,
        bytes: Bytes,
    ) -> Result<ChunkStatus> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.lock().faults.chunk_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.faults.every_chunk_fails {
            return Err(Error::protocol("injected chunk failure"));
        }
        if state.faults.failing_chunks > 0 {
            state.faults.failing_chunks -= 1;
            return Err(Error::protocol("injected transient chunk failure"));
        }
        let stall = state.faults.chunks_stall;

        let pending = state
            .pending
            .get_mut(&handle.0)
            .ok_or_else(|| Error::protocol(format!("unknown upload session {}", handle.0)))?;
        if pending.request.size != total {
            return Err(Error::protocol("declared size changed mid-upload"));
        }
        let persisted = pending.received.len() as u64;
        if stall || offset != persisted {
            return Ok(ChunkStatus::Incomplete { persisted });
        }

        pending.received.extend_from_slice(&bytes);
        if (pending.received.len() as u64) < total {
            return Ok(ChunkStatus::Incomplete {
                persisted: pending.received.len() as u64,
            });
        }

        let Some(done) = state.pending.remove(&handle.0) else {
            return Err(Error::protocol("upload session vanished"));
        };
        let id = format!("obj-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        state
            .objects
            .insert(id.clone(), (done.request.name, done.received));
        Ok(ChunkStatus::Complete(ObjectId(id)))
    }

    async fn grant_public_read(&self, object: &ObjectId) -> Result<()> {
        self.grant_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.faults.grant_fails {
            return Err(Error::Api {
                context: "grant public read".into(),
                status: 403,
                body: "injected permission failure".into(),
            });
        }
        if !state.objects.contains_key(&object.0) {
            return Err(Error::protocol(format!("no object {object}")));
        }
        state.public.insert(object.0.clone());
        Ok(())
    }

    async fn fetch_shareable_link(&self, object: &ObjectId) -> Result<ShareableLinks> {
        let state = self.lock();
        if state.faults.link_fetch_fails {
            return Err(Error::protocol("injected metadata failure"));
        }
        if state.faults.links_missing {
            return Ok(ShareableLinks::default());
        }
        Ok(ShareableLinks {
            content_link: (!state.faults.content_link_missing).then(|| Self::content_link(object)),
            view_link: Some(Self::view_link(object)),
        })
    }
}
