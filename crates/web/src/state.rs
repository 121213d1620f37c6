use std::{path::PathBuf, sync::Arc};

use {
    tgdrive_channels::NotificationDispatcher, tgdrive_sessions::UploadSessionStore,
    tgdrive_storage::TransferEngine, tokio_util::task::TaskTracker,
};

#[cfg(feature = "prometheus")]
use tgdrive_metrics::MetricsHandle;

/// Shared state behind every browser route.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<UploadSessionStore>,
    pub engine: TransferEngine,
    pub notifier: NotificationDispatcher,
    /// Storage folder uploads land in.
    pub container: String,
    pub temp_dir: PathBuf,
    /// Request body cap for `POST /upload`.
    pub max_body_bytes: usize,
    /// Browser deliveries that outlive their request; drained on shutdown.
    pub deliveries: TaskTracker,
    #[cfg(feature = "prometheus")]
    pub metrics_handle: Option<MetricsHandle>,
}
