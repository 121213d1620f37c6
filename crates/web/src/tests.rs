use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    reqwest::{
        StatusCode,
        multipart::{Form, Part},
    },
    tgdrive_channels::{NotificationDispatcher, testing::RecordingGateway},
    tgdrive_sessions::UploadSessionStore,
    tgdrive_storage::{RetryPolicy, TransferEngine, testing::MemoryBackend},
    tokio_util::{sync::CancellationToken, task::TaskTracker},
};

use super::*;

const OWNER: &str = "1001";

struct Harness {
    base: String,
    http: reqwest::Client,
    sessions: Arc<UploadSessionStore>,
    gateway: Arc<RecordingGateway>,
    backend: Arc<MemoryBackend>,
    temp: tempfile::TempDir,
    deliveries: TaskTracker,
    cancel: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn temp_is_empty(&self) -> bool {
        std::fs::read_dir(self.temp.path()).unwrap().next().is_none()
    }

    async fn post(&self, query_token: Option<&str>, form: Form) -> (StatusCode, String) {
        let url = match query_token {
            Some(token) => self.url(&format!("/upload?token={token}")),
            None => self.url("/upload"),
        };
        let response = self.http.post(url).multipart(form).send().await.unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }
}

async fn start(gateway: RecordingGateway, backend: MemoryBackend, max_body_bytes: usize) -> Harness {
    let gateway = Arc::new(gateway);
    let backend = Arc::new(backend);
    let sessions = Arc::new(UploadSessionStore::default());
    let temp = tempfile::tempdir().unwrap();
    let deliveries = TaskTracker::new();
    let state = AppState {
        sessions: Arc::clone(&sessions),
        engine: TransferEngine::new(backend.clone(), RetryPolicy {
            chunk_size: 8,
            max_attempts: 2,
            backoff: Duration::ZERO,
        }),
        notifier: NotificationDispatcher::new(gateway.clone()),
        container: "folder-1".into(),
        temp_dir: temp.path().to_path_buf(),
        max_body_bytes,
        deliveries: deliveries.clone(),
        #[cfg(feature = "prometheus")]
        metrics_handle: None,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(serve(listener, web_routes(state), cancel.clone()));

    Harness {
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
        sessions,
        gateway,
        backend,
        temp,
        deliveries,
        cancel,
    }
}

async fn harness() -> Harness {
    start(RecordingGateway::new(), MemoryBackend::new(), 1024 * 1024).await
}

fn file_form(name: &str, bytes: &'static [u8]) -> Form {
    Form::new().part(
        "file",
        Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("text/plain")
            .unwrap(),
    )
}

#[tokio::test]
async fn index_and_health() {
    let h = harness().await;

    let index = h.http.get(h.url("/")).send().await.unwrap();
    assert_eq!(index.status(), StatusCode::OK);
    assert_eq!(index.text().await.unwrap(), INDEX_TEXT);

    let health = h.http.get(h.url("/health")).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn form_requires_live_token() {
    let h = harness().await;

    for path in ["/upload", "/upload?token=nope"] {
        let response = h.http.get(h.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.text().await.unwrap(),
            "Invalid or expired token. Start from the Telegram bot."
        );
    }
}

#[tokio::test]
async fn form_embeds_token_and_owner() {
    let h = harness().await;
    let token = h.sessions.mint(OWNER, Some("movie.mkv".into()));

    let response = h
        .http
        .get(h.url(&format!("/upload?token={token}")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await.unwrap();
    assert!(html.contains(&format!("value=\"{token}\"")));
    assert!(html.contains("User: 1001"));
    assert!(html.contains("movie.mkv"));
    // viewing the form does not use the token up
    assert!(h.sessions.resolve(&token).is_some());
}

#[tokio::test]
async fn successful_upload_notifies_and_retires_token() {
    let h = harness().await;
    let token = h.sessions.mint(OWNER, None);

    let (status, body) = h
        .post(Some(&token), file_form("my report.txt", b"twenty bytes of text"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Upload successful! Link sent to your Telegram.");
    assert_eq!(
        h.backend.object_named("my_report.txt").unwrap(),
        b"twenty bytes of text"
    );
    let messages = h.gateway.messages_to(OWNER);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("✅ Upload complete!\n\nFile: my_report.txt"));
    assert!(h.sessions.resolve(&token).is_none());
    assert!(h.temp_is_empty());

    let (status, body) = h.post(Some(&token), file_form("again.txt", b"x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid or expired token. Start from the Telegram bot.");
    assert_eq!(h.backend.begin_calls(), 1);
}

#[tokio::test]
async fn token_in_form_field_is_accepted() {
    let h = harness().await;
    let token = h.sessions.mint(OWNER, None);

    let form = Form::new().text("token", token.clone()).part(
        "file",
        Part::bytes(&b"hello"[..]).file_name("hello.txt"),
    );
    let (status, _) = h.post(None, form).await;

    assert_eq!(status, StatusCode::OK);
    assert!(h.backend.object_named("hello.txt").is_some());
}

#[tokio::test]
async fn missing_file_keeps_token_usable() {
    let h = harness().await;
    let token = h.sessions.mint(OWNER, None);

    let (status, body) = h
        .post(Some(&token), Form::new().text("comment", "no file here"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "No file provided.");
    assert!(h.sessions.resolve(&token).is_some());
    assert!(h.gateway.sent().is_empty());

    let (status, _) = h.post(Some(&token), file_form("late.txt", b"ok")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unusable_filename_falls_back_to_hint() {
    let h = harness().await;
    let token = h.sessions.mint(OWNER, Some("holiday.mp4".into()));

    let (status, _) = h.post(Some(&token), file_form("...", b"frames")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.backend.object_named("holiday.mp4").unwrap(), b"frames");
}

#[tokio::test]
async fn backend_failure_reports_and_cleans_up() {
    let h = start(
        RecordingGateway::new(),
        MemoryBackend::new().fail_every_chunk(),
        1024 * 1024,
    )
    .await;
    let token = h.sessions.mint(OWNER, None);

    let (status, body) = h.post(Some(&token), file_form("a.bin", b"payload")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Upload failed: "));
    let messages = h.gateway.messages_to(OWNER);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("❌ Upload failed: "));
    // the attempt was made, so the token is spent
    assert!(h.sessions.resolve(&token).is_none());
    assert!(h.temp_is_empty());
}

#[tokio::test]
async fn notification_failure_returns_link_to_browser() {
    let h = start(
        RecordingGateway::new().fail_sends(),
        MemoryBackend::new(),
        1024 * 1024,
    )
    .await;
    let token = h.sessions.mint(OWNER, None);

    let (status, body) = h.post(Some(&token), file_form("a.bin", b"payload")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        body.starts_with("Upload OK but couldn't notify via Telegram. Link: memory://objects/"),
        "{body}"
    );
    assert!(h.sessions.resolve(&token).is_none());
}

#[tokio::test]
async fn concurrent_submissions_have_one_winner() {
    let h = start(
        RecordingGateway::new(),
        MemoryBackend::new().delay_chunks(Duration::from_millis(150)),
        1024 * 1024,
    )
    .await;
    let token = h.sessions.mint(OWNER, None);

    let (first, second) = tokio::join!(
        h.post(Some(&token), file_form("one.txt", b"first")),
        h.post(Some(&token), file_form("two.txt", b"second")),
    );

    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::BAD_REQUEST]);
    assert_eq!(h.backend.object_count(), 1);
    assert_eq!(h.backend.begin_calls(), 1);
    assert_eq!(h.gateway.messages_to(OWNER).len(), 1);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let h = start(RecordingGateway::new(), MemoryBackend::new(), 64).await;
    let token = h.sessions.mint(OWNER, None);

    let (status, _) = h
        .post(Some(&token), file_form("big.bin", &[b'x'; 4096]))
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(h.backend.object_count(), 0);
    assert!(h.sessions.resolve(&token).is_some());
    assert!(h.temp_is_empty());
}

#[tokio::test]
async fn unknown_token_never_reaches_storage() {
    let h = harness().await;
    h.sessions.mint(OWNER, None);

    let (status, body) = h
        .post(Some("never-minted"), file_form("a.txt", b"payload"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid or expired token. Start from the Telegram bot.");
    assert_eq!(h.backend.begin_calls(), 0);
    assert!(h.gateway.sent().is_empty());
    assert!(h.temp_is_empty());
}

#[tokio::test]
async fn delivery_finishes_after_browser_disconnects() {
    let h = start(
        RecordingGateway::new(),
        MemoryBackend::new().delay_chunks(Duration::from_millis(300)),
        1024 * 1024,
    )
    .await;
    let token = h.sessions.mint(OWNER, None);
    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(150))
        .build()
        .unwrap();

    let result = impatient
        .post(h.url(&format!("/upload?token={token}")))
        .multipart(file_form("slow.txt", b"three chunks of data...."))
        .send()
        .await;
    assert!(result.is_err());

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.backend.begin_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    h.deliveries.close();
    tokio::time::timeout(Duration::from_secs(10), h.deliveries.wait())
        .await
        .unwrap();

    assert_eq!(
        h.backend.object_named("slow.txt").unwrap(),
        b"three chunks of data...."
    );
    let messages = h.gateway.messages_to(OWNER);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("✅ Upload complete!"));
    assert!(h.sessions.resolve(&token).is_none());
    assert!(h.temp_is_empty());
}
