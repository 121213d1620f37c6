use {async_trait::async_trait, bytes::Bytes};

use crate::Result;

/// Parameters for opening a resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumableRequest {
    pub name: String,
    /// Folder (or bucket) the object is created in.
    pub container: String,
    pub size: u64,
    pub mime_type: Option<String>,
}

/// Backend handle for one resumable upload, e.g. a Drive session URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(pub String);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend answer to a chunk submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    /// More bytes are expected; `persisted` bytes from the start are stored.
    Incomplete { persisted: u64 },
    /// The object is fully stored.
    Complete(ObjectId),
}

/// Links the backend reports for a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareableLinks {
    /// Direct download link.
    pub content_link: Option<String>,
    /// Browser preview link.
    pub view_link: Option<String>,
}

impl ShareableLinks {
    /// Direct-content link first, view link as fallback.
    #[must_use]
    pub fn preferred(&self) -> Option<&str> {
        self.content_link
            .as_deref()
            .or(self.view_link.as_deref())
            .filter(|link| !link.is_empty())
    }
}

/// Object storage capability the transfer engine drives.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn begin_resumable_upload(&self, request: &ResumableRequest) -> Result<UploadHandle>;

    /// Submit `bytes` starting at `offset` of an object of `total` bytes.
    async fn upload_chunk(
        &self,
        handle: &UploadHandle,
        offset: u64,
        total: u64,
        bytes: Bytes,
    ) -> Result<ChunkStatus>;

    /// Make the object readable by anyone holding its link.
    async fn grant_public_read(&self, object: &ObjectId) -> Result<()>;

    async fn fetch_shareable_link(&self, object: &ObjectId) -> Result<ShareableLinks>;
}
