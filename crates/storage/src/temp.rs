use std::path::{Path, PathBuf};

use {tempfile::TempPath, tgdrive_common::sanitize_filename, tracing::warn, uuid::Uuid};

use crate::{Error, Result};

/// A local file that exists only while a transfer needs it.
///
/// The file is removed when the holding is dropped, whichever path the
/// owning job takes (success, failure, or the future being cancelled).
#[derive(Debug)]
pub struct TempHolding {
    path: TempPath,
    name: String,
}

impl TempHolding {
    /// Create an empty file named `<uuid>_<name>` in `dir`, with `name`
    /// sanitized for the local filesystem.
    pub async fn create(dir: &Path, name: &str) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::external(format!("create temp dir {}", dir.display()), e))?;
        let local = sanitize_filename(name).unwrap_or_else(|| "upload".to_string());
        let path = dir.join(format!("{}_{local}", Uuid::new_v4().simple()));
        tokio::fs::File::create(&path)
            .await
            .map_err(|e| Error::external(format!("create temp file {}", path.display()), e))?;

        Ok(Self {
            path: TempPath::from_path(path),
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the file was created for (without the uniqueness prefix).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open the holding for writing from the start.
    pub async fn writer(&self) -> Result<tokio::fs::File> {
        tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&*self.path)
            .await
            .map_err(Error::from)
    }

    pub async fn size(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&*self.path).await?.len())
    }

    /// Delete the file now and report whether that worked.
    pub fn release(self) -> Result<()> {
        let path: PathBuf = self.path.to_path_buf();
        self.path.close().map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to remove temp holding");
            Error::external(format!("remove temp file {}", path.display()), e)
        })
    }
}
