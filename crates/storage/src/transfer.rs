//! Resumable transfer of one locally held file into the storage backend.
//!
//! A job moves `Pending → InProgress → Finalizing → Complete`, or ends in
//! `Failed` from any of them. Whatever happens, the job's [`TempHolding`]
//! is gone when [`TransferEngine::upload`] returns (or when its future is
//! dropped).

use std::{fmt, path::Path, sync::Arc, time::Duration};

use {
    bytes::Bytes,
    tgdrive_common::{DeliveryOutcome, DeliveryStatus},
    tokio::io::{AsyncReadExt, AsyncSeekExt},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use {
    std::time::Instant,
    tgdrive_metrics::{counter, histogram, labels, transfer as transfer_metrics},
};

use crate::{
    backend::{ChunkStatus, ObjectId, ResumableRequest, StorageBackend, UploadHandle},
    error::Error,
    temp::TempHolding,
};

const MIB: u64 = 1024 * 1024;
/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Chunking and retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub chunk_size: u64,
    /// Attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, doubled after each further one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            chunk_size: 10 * MIB,
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// One file to deliver.
#[derive(Debug)]
pub struct TransferJob {
    /// Local bytes, owned by the job and deleted with it.
    pub source: TempHolding,
    pub destination_name: String,
    pub destination_container: String,
    pub mime_type: Option<String>,
    /// Chat user the outcome is reported to.
    pub recipient: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    InProgress,
    Finalizing,
    Complete,
    Failed,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        })
    }
}

/// Step of finalization that can fail after every byte is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStage {
    VisibilityGrant,
    LinkFetch,
}

impl fmt::Display for FinalizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::VisibilityGrant => "making the file shareable",
            Self::LinkFetch => "fetching the share link",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("could not read the local copy: {0}")]
    Source(#[source] Error),

    #[error("could not start the upload after {attempts} attempts: {source}")]
    Begin {
        attempts: u32,
        #[source]
        source: Error,
    },

    #[error("upload stopped at byte {offset} after {attempts} attempts: {source}")]
    Chunk {
        offset: u64,
        attempts: u32,
        #[source]
        source: Error,
    },

    /// The object is stored but has no usable public link.
    #[error("file was stored but {stage} failed: {source}")]
    Finalization {
        stage: FinalizeStage,
        object_id: ObjectId,
        #[source]
        source: Error,
    },
}

impl TransferError {
    /// Stored object left behind by a failed finalization.
    #[must_use]
    pub fn orphaned_object(&self) -> Option<&ObjectId> {
        match self {
            Self::Finalization { object_id, .. } => Some(object_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Begin { .. } => "begin",
            Self::Chunk { .. } => "chunk",
            Self::Finalization {
                stage: FinalizeStage::VisibilityGrant,
                ..
            } => "visibility_grant",
            Self::Finalization {
                stage: FinalizeStage::LinkFetch,
                ..
            } => "link_fetch",
        }
    }
}

/// Drives resumable uploads against a [`StorageBackend`].
#[derive(Clone)]
pub struct TransferEngine {
    backend: Arc<dyn StorageBackend>,
    policy: RetryPolicy,
}

impl TransferEngine {
    pub fn new(backend: Arc<dyn StorageBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upload the job's file and finalize it into a shareable link.
    ///
    /// Never fails: every error becomes a failed [`DeliveryOutcome`]. Runs
    /// until the backend completes or the retry budget is spent; callers
    /// that need a deadline wrap this in `tokio::time::timeout`.
    pub async fn upload(&self, job: TransferJob) -> DeliveryOutcome {
        let TransferJob {
            source,
            destination_name,
            destination_container,
            mime_type,
            recipient,
        } = job;

        #[cfg(feature = "metrics")]
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        counter!(transfer_metrics::STARTED_TOTAL).increment(1);

        let mut state = TransferState::Pending;
        let result = self
            .run(
                &source,
                &destination_name,
                &destination_container,
                mime_type,
                &mut state,
            )
            .await;

        if let Err(e) = source.release() {
            warn!(file = %destination_name, error = %e, "temp holding cleanup failed");
        }

        #[cfg(feature = "metrics")]
        histogram!(transfer_metrics::DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match result {
            Ok(link) => {
                #[cfg(feature = "metrics")]
                counter!(transfer_metrics::COMPLETED_TOTAL).increment(1);

                info!(file = %destination_name, %recipient, "transfer complete");
                DeliveryOutcome::delivered(recipient, destination_name, link)
            },
            Err(err) => {
                #[cfg(feature = "metrics")]
                counter!(transfer_metrics::FAILED_TOTAL, labels::STAGE => err.stage())
                    .increment(1);

                let failed_in = state;
                advance(&mut state, TransferState::Failed, &destination_name);
                warn!(
                    file = %destination_name,
                    %recipient,
                    failed_in = %failed_in,
                    stage = err.stage(),
                    error = %err,
                    "transfer failed"
                );
                DeliveryOutcome {
                    recipient,
                    file_name: destination_name,
                    status: DeliveryStatus::Failed {
                        detail: err.to_string(),
                        orphaned_object: err.orphaned_object().map(ToString::to_string),
                    },
                }
            },
        }
    }

    async fn run(
        &self,
        source: &TempHolding,
        name: &str,
        container: &str,
        mime_type: Option<String>,
        state: &mut TransferState,
    ) -> Result<String, TransferError> {
        let total = source.size().await.map_err(TransferError::Source)?;
        advance(state, TransferState::InProgress, name);

        let request = ResumableRequest {
            name: name.to_string(),
            container: container.to_string(),
            size: total,
            mime_type,
        };
        let handle = self.begin(&request).await?;
        let object = self.send_chunks(&handle, source.path(), total).await?;

        advance(state, TransferState::Finalizing, name);
        self.backend
            .grant_public_read(&object)
            .await
            .map_err(|source| TransferError::Finalization {
                stage: FinalizeStage::VisibilityGrant,
                object_id: object.clone(),
                source,
            })?;
        let links = self
            .backend
            .fetch_shareable_link(&object)
            .await
            .map_err(|source| TransferError::Finalization {
                stage: FinalizeStage::LinkFetch,
                object_id: object.clone(),
                source,
            })?;
        let link = links
            .preferred()
            .map(str::to_string)
            .ok_or_else(|| TransferError::Finalization {
                stage: FinalizeStage::LinkFetch,
                object_id: object.clone(),
                source: Error::protocol("backend returned neither a content nor a view link"),
            })?;

        advance(state, TransferState::Complete, name);
        Ok(link)
    }

    async fn begin(&self, request: &ResumableRequest) -> Result<UploadHandle, TransferError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.backend.begin_resumable_upload(request).await {
                Ok(handle) => return Ok(handle),
                Err(source) if attempt >= self.policy.max_attempts => {
                    return Err(TransferError::Begin {
                        attempts: attempt,
                        source,
                    });
                },
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        file = %request.name,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "could not open upload session, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Submit the file chunk by chunk until the backend reports an object.
    ///
    /// Each chunk gets at most `max_attempts` submissions. A response that
    /// persists nothing new counts as a failed attempt, so a backend stuck
    /// on "incomplete" cannot keep the loop alive.
    async fn send_chunks(
        &self,
        handle: &UploadHandle,
        path: &Path,
        total: u64,
    ) -> Result<ObjectId, TransferError> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| TransferError::Source(e.into()))?;
        let chunk_size = self.policy.chunk_size.max(1);
        let mut offset = 0u64;

        loop {
            let len = chunk_size.min(total - offset);
            let bytes = read_range(&mut file, offset, len)
                .await
                .map_err(TransferError::Source)?;

            let mut attempt = 0;
            let persisted = loop {
                attempt += 1;
                let failure = match self
                    .backend
                    .upload_chunk(handle, offset, total, bytes.clone())
                    .await
                {
                    Ok(ChunkStatus::Complete(object)) => {
                        record_uploaded(total - offset);
                        debug!(object = %object, total, "all chunks stored");
                        return Ok(object);
                    },
                    Ok(ChunkStatus::Incomplete { persisted })
                        if persisted > offset && persisted <= total =>
                    {
                        break persisted;
                    },
                    Ok(ChunkStatus::Incomplete { persisted }) => Error::protocol(format!(
                        "no progress: backend holds {persisted} of {total} bytes after a chunk at {offset}"
                    )),
                    Err(e) => e,
                };

                if attempt >= self.policy.max_attempts {
                    return Err(TransferError::Chunk {
                        offset,
                        attempts: attempt,
                        source: failure,
                    });
                }

                #[cfg(feature = "metrics")]
                counter!(transfer_metrics::CHUNK_RETRIES_TOTAL).increment(1);

                let delay = self.policy.delay_after(attempt);
                warn!(
                    offset,
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "chunk upload failed, retrying"
                );
                tokio::time::sleep(delay).await;
            };

            record_uploaded(persisted - offset);
            debug!(offset, persisted, total, "chunk stored");
            offset = persisted;
        }
    }
}

fn advance(state: &mut TransferState, next: TransferState, name: &str) {
    debug!(file = %name, from = %state, to = %next, "transfer state");
    *state = next;
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_uploaded(bytes: u64) {
    #[cfg(feature = "metrics")]
    counter!(transfer_metrics::BYTES_UPLOADED_TOTAL).increment(bytes);
}

async fn read_range(file: &mut tokio::fs::File, offset: u64, len: u64) -> crate::Result<Bytes> {
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}
