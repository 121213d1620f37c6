use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    tgdrive_channels::{ChatGateway, NotificationDispatcher},
    tgdrive_common::{DeliveryOutcome, DeliveryStatus, FileAnnouncement, FileKind, sanitize_filename},
    tgdrive_sessions::{UploadSessionStore, token_prefix},
    tgdrive_storage::{TempHolding, TransferEngine, TransferJob},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use tgdrive_metrics::{counter, labels, routing as routing_metrics};

use crate::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Reply to attachments the relay does not take.
pub const UNSUPPORTED_TEXT: &str = "Please send a valid file (document/photo/video/audio/voice).";

const PROGRESS_TEXT: &str = "Small file detected, downloading and uploading to Drive...";

/// Reply to `/start` and `/help`.
#[must_use]
pub fn usage_text(threshold_bytes: u64) -> String {
    format!(
        "Hi! Send me a file. Small files (<={}) will be uploaded automatically. Larger files \
         will require using a browser upload link I'll provide.",
        human_size(threshold_bytes)
    )
}

fn human_size(bytes: u64) -> String {
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Browser link for a session token.
#[must_use]
pub fn upload_url(base_url: &str, token: &str) -> String {
    format!("{}/upload?token={token}", base_url.trim_end_matches('/'))
}

/// Routing knobs.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    /// Largest size relayed automatically.
    pub threshold_bytes: u64,
    pub accepted_kinds: Vec<FileKind>,
    /// Deadline for download plus transfer on the automatic path.
    pub auto_relay_timeout: Duration,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            threshold_bytes: 20 * MIB,
            accepted_kinds: FileKind::ALL.to_vec(),
            auto_relay_timeout: Duration::from_secs(600),
        }
    }
}

/// Why a user got a browser link instead of an automatic relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffReason {
    TooLarge { size: u64 },
    UnknownSize,
    AutoRelayFailed { detail: String },
}

/// Size-only routing choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    AutoRelay,
    Handoff(HandoffReason),
}

/// Known sizes up to `threshold` are relayed; everything else is handed off.
#[must_use]
pub fn decide(size: Option<u64>, threshold: u64) -> Route {
    match size {
        Some(size) if size <= threshold => Route::AutoRelay,
        Some(size) => Route::Handoff(HandoffReason::TooLarge { size }),
        None => Route::Handoff(HandoffReason::UnknownSize),
    }
}

/// What happened to one announcement. Exactly one of these is reported to
/// the user.
#[derive(Debug, Clone)]
pub enum RouteDecision {
    /// Relayed without the browser; the outcome was delivered to the user.
    AutoRelay(DeliveryOutcome),
    /// The user was sent `url` to upload the file themselves.
    Handoff { url: String, reason: HandoffReason },
    /// The attachment kind is not accepted.
    Rejected(FileKind),
}

fn handoff_text(url: &str, reason: &HandoffReason) -> String {
    let headline = match reason {
        HandoffReason::TooLarge { size } => format!(
            "❗ This file is too large for automatic upload ({}).",
            human_size(*size)
        ),
        HandoffReason::UnknownSize => {
            "❗ This file couldn't be auto-downloaded because its size is unknown.".to_string()
        },
        HandoffReason::AutoRelayFailed { detail } => {
            format!("❗ Automatic upload failed: {detail}")
        },
    };
    format!(
        "{headline}\n\nPlease open the following link in your device browser and upload the \
         file directly (this supports very large files):\n\n{url}\n\nAfter upload completes, \
         I'll send you the Drive download link here."
    )
}

/// Everything a [`Router`] is built from.
pub struct RouterParts {
    pub gateway: Arc<dyn ChatGateway>,
    pub sessions: Arc<UploadSessionStore>,
    pub engine: TransferEngine,
    pub notifier: NotificationDispatcher,
    pub policy: RoutePolicy,
    /// Public base URL of the browser upload server.
    pub base_url: String,
    /// Storage folder every file lands in.
    pub container: String,
    pub temp_dir: PathBuf,
}

#[derive(Clone)]
pub struct Router {
    gateway: Arc<dyn ChatGateway>,
    sessions: Arc<UploadSessionStore>,
    engine: TransferEngine,
    notifier: NotificationDispatcher,
    policy: RoutePolicy,
    base_url: String,
    container: String,
    temp_dir: PathBuf,
}

impl Router {
    pub fn new(parts: RouterParts) -> Self {
        let RouterParts {
            gateway,
            sessions,
            engine,
            notifier,
            policy,
            base_url,
            container,
            temp_dir,
        } = parts;
        Self {
            gateway,
            sessions,
            engine,
            notifier,
            policy,
            base_url: base_url.trim_end_matches('/').to_string(),
            container,
            temp_dir,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    #[must_use]
    pub fn accepts(&self, kind: FileKind) -> bool {
        self.policy.accepted_kinds.contains(&kind)
    }

    /// Route one announcement and tell its owner the result.
    pub async fn route(&self, announcement: FileAnnouncement) -> RouteDecision {
        if !self.accepts(announcement.kind) {
            record_decision("rejected");
            debug!(owner = %announcement.owner, kind = %announcement.kind, "attachment kind not accepted");
            self.notifier
                .send_text(&announcement.owner, UNSUPPORTED_TEXT)
                .await;
            return RouteDecision::Rejected(announcement.kind);
        }

        match decide(announcement.size, self.policy.threshold_bytes) {
            Route::AutoRelay => {
                record_decision("auto_relay");
                self.notifier
                    .send_text(&announcement.owner, PROGRESS_TEXT)
                    .await;

                let timeout = self.policy.auto_relay_timeout;
                let attempt = tokio::time::timeout(timeout, self.auto_relay(&announcement))
                    .await
                    .unwrap_or_else(|_| Err(Error::Timeout(timeout)));

                match attempt {
                    Ok(outcome) => {
                        self.notifier.notify(&outcome).await;
                        RouteDecision::AutoRelay(outcome)
                    },
                    Err(e) => {
                        #[cfg(feature = "metrics")]
                        counter!(routing_metrics::AUTO_RELAY_FALLBACKS_TOTAL).increment(1);

                        warn!(
                            owner = %announcement.owner,
                            file = %announcement.file.id,
                            error = %e,
                            "automatic relay failed, handing off to browser upload"
                        );
                        self.handoff(&announcement, HandoffReason::AutoRelayFailed {
                            detail: e.to_string(),
                        })
                        .await
                    },
                }
            },
            Route::Handoff(reason) => {
                record_decision("handoff");
                self.handoff(&announcement, reason).await
            },
        }
    }

    /// Download into a temp holding and transfer it. The holding never
    /// outlives this future.
    async fn auto_relay(&self, announcement: &FileAnnouncement) -> Result<DeliveryOutcome> {
        let name = destination_name(announcement);
        let holding = TempHolding::create(&self.temp_dir, &name).await?;
        let written = self
            .gateway
            .fetch_file(&announcement.file, holding.path())
            .await?;
        debug!(file = %name, bytes = written, "downloaded announced file");

        let outcome = self
            .engine
            .upload(TransferJob {
                source: holding,
                destination_name: name,
                destination_container: self.container.clone(),
                mime_type: announcement.mime_type.clone(),
                recipient: announcement.owner.clone(),
            })
            .await;

        match outcome.status {
            DeliveryStatus::Delivered { .. } => Ok(outcome),
            DeliveryStatus::Failed {
                detail,
                orphaned_object,
            } => {
                if let Some(object) = orphaned_object {
                    warn!(%object, "stored object left without a public link");
                }
                Err(Error::Transfer(detail))
            },
        }
    }

    async fn handoff(&self, announcement: &FileAnnouncement, reason: HandoffReason) -> RouteDecision {
        let token = self
            .sessions
            .mint(&announcement.owner, announcement.filename_hint.clone());
        let url = upload_url(&self.base_url, &token);
        info!(
            owner = %announcement.owner,
            token = token_prefix(&token),
            ?reason,
            "issued browser upload link"
        );

        self.notifier
            .send_text(&announcement.owner, &handoff_text(&url, &reason))
            .await;
        RouteDecision::Handoff { url, reason }
    }
}

/// Storage name for an automatically relayed file.
fn destination_name(announcement: &FileAnnouncement) -> String {
    if let Some(hint) = announcement
        .filename_hint
        .as_deref()
        .map(str::trim)
        .filter(|hint| !hint.is_empty())
    {
        return hint.to_string();
    }
    let id = sanitize_filename(&announcement.file.id).unwrap_or_default();
    let tail = &id[id.len().saturating_sub(16)..];
    format!(
        "{}_{tail}.{}",
        announcement.kind,
        announcement.kind.fallback_extension()
    )
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_decision(route: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(routing_metrics::DECISIONS_TOTAL, labels::ROUTE => route).increment(1);
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        rstest::rstest,
        tgdrive_channels::testing::RecordingGateway,
        tgdrive_common::FileRef,
        tgdrive_storage::{RetryPolicy, testing::MemoryBackend},
    };

    const THRESHOLD: u64 = 20 * MIB;

    struct Harness {
        router: Router,
        gateway: Arc<RecordingGateway>,
        backend: Arc<MemoryBackend>,
        sessions: Arc<UploadSessionStore>,
        temp: tempfile::TempDir,
    }

    fn harness(gateway: RecordingGateway, backend: MemoryBackend, policy: RoutePolicy) -> Harness {
        let gateway = Arc::new(gateway);
        let backend = Arc::new(backend);
        let sessions = Arc::new(UploadSessionStore::default());
        let temp = tempfile::tempdir().unwrap();
        let engine = TransferEngine::new(backend.clone(), RetryPolicy {
            chunk_size: 4,
            max_attempts: 2,
            backoff: Duration::ZERO,
        });
        let router = Router::new(RouterParts {
            gateway: gateway.clone(),
            sessions: Arc::clone(&sessions),
            engine,
            notifier: NotificationDispatcher::new(gateway.clone()),
            policy,
            base_url: "https://relay.example.com/".into(),
            container: "folder-1".into(),
            temp_dir: temp.path().to_path_buf(),
        });
        Harness {
            router,
            gateway,
            backend,
            sessions,
            temp,
        }
    }

    fn announcement(kind: FileKind, size: Option<u64>, hint: Option<&str>) -> FileAnnouncement {
        FileAnnouncement {
            owner: "1001".into(),
            kind,
            file: FileRef::new("BQACAgIAAxkBAAIBZ2abc"),
            size,
            filename_hint: hint.map(str::to_string),
            mime_type: None,
        }
    }

    fn token_of(url: &str) -> &str {
        url.split_once("token=").map(|(_, t)| t).unwrap()
    }

    fn temp_is_empty(h: &Harness) -> bool {
        std::fs::read_dir(h.temp.path()).unwrap().next().is_none()
    }

    #[rstest]
    #[case(Some(0), Route::AutoRelay)]
    #[case(Some(5 * MIB), Route::AutoRelay)]
    #[case(Some(THRESHOLD), Route::AutoRelay)]
    #[case(Some(THRESHOLD + 1), Route::Handoff(HandoffReason::TooLarge { size: THRESHOLD + 1 }))]
    #[case(Some(50 * MIB), Route::Handoff(HandoffReason::TooLarge { size: 50 * MIB }))]
    #[case(None, Route::Handoff(HandoffReason::UnknownSize))]
    fn size_decides_route(#[case] size: Option<u64>, #[case] expected: Route) {
        assert_eq!(decide(size, THRESHOLD), expected);
    }

    #[test]
    fn upload_url_format() {
        assert_eq!(
            upload_url("https://relay.example.com/", "abc"),
            "https://relay.example.com/upload?token=abc"
        );
    }

    #[test]
    fn usage_mentions_threshold() {
        assert!(usage_text(THRESHOLD).contains("(<=20MB)"));
    }

    #[test]
    fn destination_name_prefers_hint() {
        let named = announcement(FileKind::Document, Some(1), Some("report.pdf"));
        assert_eq!(destination_name(&named), "report.pdf");

        let photo = announcement(FileKind::Photo, Some(1), None);
        let name = destination_name(&photo);
        assert!(name.starts_with("photo_"), "{name}");
        assert!(name.ends_with(".jpg"), "{name}");
    }

    #[tokio::test]
    async fn small_file_is_relayed_with_one_success_message() {
        let h = harness(
            RecordingGateway::new().with_file("BQACAgIAAxkBAAIBZ2abc", b"hello world".to_vec()),
            MemoryBackend::new(),
            RoutePolicy::default(),
        );

        let decision = h
            .router
            .route(announcement(FileKind::Document, Some(5 * MIB), Some("hello.txt")))
            .await;

        let RouteDecision::AutoRelay(outcome) = decision else {
            panic!("expected auto relay, got {decision:?}");
        };
        assert!(outcome.ok());
        let link = outcome.link().unwrap();

        let messages = h.gateway.messages_to("1001");
        assert_eq!(messages[0], PROGRESS_TEXT);
        let successes: Vec<_> = messages.iter().filter(|m| m.starts_with("✅")).collect();
        assert_eq!(successes.len(), 1);
        assert!(successes[0].contains(link));
        assert_eq!(h.backend.object_named("hello.txt").unwrap(), b"hello world");
        assert!(h.sessions.is_empty());
        assert!(temp_is_empty(&h));
    }

    #[tokio::test]
    async fn large_file_gets_a_browser_link() {
        let h = harness(
            RecordingGateway::new(),
            MemoryBackend::new(),
            RoutePolicy::default(),
        );

        let decision = h
            .router
            .route(announcement(FileKind::Video, Some(50 * MIB), Some("movie.mp4")))
            .await;

        let RouteDecision::Handoff { url, reason } = decision else {
            panic!("expected handoff, got {decision:?}");
        };
        assert!(url.starts_with("https://relay.example.com/upload?token="));
        assert_eq!(reason, HandoffReason::TooLarge { size: 50 * MIB });

        let session = h.sessions.resolve(token_of(&url)).unwrap();
        assert_eq!(session.owner, "1001");
        assert_eq!(session.filename_hint.as_deref(), Some("movie.mp4"));

        let messages = h.gateway.messages_to("1001");
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains(&url));
        assert_eq!(h.gateway.fetch_calls(), 0);
        assert_eq!(h.backend.begin_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_size_is_handed_off() {
        let h = harness(
            RecordingGateway::new(),
            MemoryBackend::new(),
            RoutePolicy::default(),
        );

        let decision = h
            .router
            .route(announcement(FileKind::Voice, None, None))
            .await;

        assert!(matches!(decision, RouteDecision::Handoff {
            reason: HandoffReason::UnknownSize,
            ..
        }));
        assert_eq!(h.gateway.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn failed_download_falls_back_to_handoff() {
        // the gateway knows no files, so the download fails
        let h = harness(
            RecordingGateway::new(),
            MemoryBackend::new(),
            RoutePolicy::default(),
        );

        let decision = h
            .router
            .route(announcement(FileKind::Audio, Some(MIB), None))
            .await;

        let RouteDecision::Handoff { url, reason } = decision else {
            panic!("expected handoff, got {decision:?}");
        };
        assert!(matches!(reason, HandoffReason::AutoRelayFailed { .. }));
        assert!(h.sessions.resolve(token_of(&url)).is_some());

        let messages = h.gateway.messages_to("1001");
        assert_eq!(messages.len(), 2);
        assert!(messages[1].contains("Automatic upload failed"));
        assert!(messages[1].contains(&url));
        assert!(!messages.iter().any(|m| m.starts_with("✅") || m.starts_with("❌")));
        assert!(temp_is_empty(&h));
    }

    #[tokio::test]
    async fn failed_transfer_falls_back_without_leaking_temp_files() {
        let h = harness(
            RecordingGateway::new().with_file("BQACAgIAAxkBAAIBZ2abc", b"0123456789".to_vec()),
            MemoryBackend::new().fail_every_chunk(),
            RoutePolicy::default(),
        );

        let decision = h
            .router
            .route(announcement(FileKind::Document, Some(10), Some("a.bin")))
            .await;

        assert!(matches!(decision, RouteDecision::Handoff {
            reason: HandoffReason::AutoRelayFailed { .. },
            ..
        }));
        assert_eq!(h.backend.object_count(), 0);
        assert!(temp_is_empty(&h));
    }

    #[tokio::test]
    async fn slow_relay_hits_the_deadline() {
        let h = harness(
            RecordingGateway::new().with_file("BQACAgIAAxkBAAIBZ2abc", b"0123456789".to_vec()),
            MemoryBackend::new().delay_chunks(Duration::from_secs(10)),
            RoutePolicy {
                auto_relay_timeout: Duration::from_millis(50),
                ..RoutePolicy::default()
            },
        );

        let decision = h
            .router
            .route(announcement(FileKind::Document, Some(10), Some("a.bin")))
            .await;

        let RouteDecision::Handoff {
            reason: HandoffReason::AutoRelayFailed { detail },
            ..
        } = decision
        else {
            panic!("expected a timed-out relay, got {decision:?}");
        };
        assert!(detail.contains("timed out"));
        assert!(temp_is_empty(&h));
    }

    #[tokio::test]
    async fn unaccepted_kind_is_rejected_before_size_logic() {
        let h = harness(
            RecordingGateway::new(),
            MemoryBackend::new(),
            RoutePolicy {
                accepted_kinds: vec![FileKind::Document, FileKind::Photo],
                ..RoutePolicy::default()
            },
        );

        let decision = h
            .router
            .route(announcement(FileKind::Voice, Some(10), None))
            .await;

        assert!(matches!(decision, RouteDecision::Rejected(FileKind::Voice)));
        assert_eq!(h.gateway.messages_to("1001"), vec![UNSUPPORTED_TEXT.to_string()]);
        assert!(h.sessions.is_empty());
        assert_eq!(h.gateway.fetch_calls(), 0);
    }
}
