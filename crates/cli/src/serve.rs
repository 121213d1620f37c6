//! Wiring for the default command: one process running the Telegram polling
//! loop and the browser upload server side by side.

use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, bail},
    secrecy::ExposeSecret,
    tgdrive_channels::NotificationDispatcher,
    tgdrive_config::{Severity, TgdriveConfig, validate},
    tgdrive_metrics::{MetricsRecorderConfig, init_metrics},
    tgdrive_routing::{RoutePolicy, Router, RouterParts},
    tgdrive_sessions::UploadSessionStore,
    tgdrive_storage::{
        DriveClient, DriveEndpoints, RetryPolicy, ServiceAccountAuth, TransferEngine,
    },
    tgdrive_telegram::{InboundHandler, TelegramGateway},
    tgdrive_web::AppState,
    tokio::net::TcpListener,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{error, info, warn},
};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub async fn run(config: TgdriveConfig) -> anyhow::Result<()> {
    let report = validate(&config);
    for d in &report.diagnostics {
        match d.severity {
            Severity::Error => error!(path = d.path, "{}", d.message),
            Severity::Warning => warn!(path = d.path, "{}", d.message),
        }
    }
    if report.has_errors() {
        bail!(
            "configuration has {} error(s); run `tgdrive config check`",
            report.count(Severity::Error)
        );
    }

    #[cfg_attr(not(feature = "prometheus"), allow(unused_variables))]
    let metrics_handle = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: Vec::new(),
    })?;

    let upload = &config.upload;
    let temp_dir = upload.resolved_temp_dir();
    tokio::fs::create_dir_all(&temp_dir)
        .await
        .with_context(|| format!("creating temp dir {}", temp_dir.display()))?;

    let auth = ServiceAccountAuth::from_json(
        config.drive.credentials.expose_secret(),
        config.drive.token_url.clone(),
        reqwest::Client::new(),
    )?;
    info!(service_account = auth.client_email(), "drive credentials loaded");
    let drive = DriveClient::new(Arc::new(auth), DriveEndpoints {
        api_base: config.drive.api_base.clone(),
        upload_base: config.drive.upload_base.clone(),
    })?;
    let engine = TransferEngine::new(Arc::new(drive), RetryPolicy {
        chunk_size: upload.chunk_size_bytes,
        max_attempts: upload.chunk_max_attempts,
        backoff: Duration::from_millis(upload.retry_backoff_ms),
    });

    let sessions = Arc::new(UploadSessionStore::new(Duration::from_secs(
        upload.session_ttl_secs,
    )));

    let poll_timeout = config.telegram.poll_timeout_secs;
    let bot = tgdrive_telegram::connect(&config.telegram.token, poll_timeout).await?;
    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let notifier = NotificationDispatcher::new(gateway.clone());

    let base_url = config.server.public_base_url();
    if config.server.base_url.trim().is_empty() {
        warn!(%base_url, "BASE_URL not set, upload links use the listen address");
    }

    let router = Router::new(RouterParts {
        gateway,
        sessions: Arc::clone(&sessions),
        engine: engine.clone(),
        notifier: notifier.clone(),
        policy: RoutePolicy {
            threshold_bytes: upload.threshold_bytes,
            accepted_kinds: upload.accepted_kinds.clone(),
            auto_relay_timeout: Duration::from_secs(upload.auto_relay_timeout_secs),
        },
        base_url,
        container: config.drive.folder_id.clone(),
        temp_dir: temp_dir.clone(),
    });

    let cancel = CancellationToken::new();
    let sweeper = sessions.spawn_sweeper(SESSION_SWEEP_INTERVAL, cancel.clone());
    let inbound = InboundHandler::new(router, notifier.clone());
    let poller =
        tgdrive_telegram::spawn_polling(bot, inbound.clone(), poll_timeout, cancel.clone());

    let deliveries = TaskTracker::new();
    let app = tgdrive_web::web_routes(AppState {
        sessions,
        engine,
        notifier,
        container: config.drive.folder_id.clone(),
        temp_dir,
        max_body_bytes: usize::try_from(upload.max_body_bytes).unwrap_or(usize::MAX),
        deliveries: deliveries.clone(),
        #[cfg(feature = "prometheus")]
        metrics_handle: Some(metrics_handle),
    });

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding upload server to {addr}"))?;

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                on_signal.cancel();
            },
            Err(e) => warn!(error = %e, "could not listen for ctrl-c"),
        }
    });

    let served = tgdrive_web::serve(listener, app, cancel.clone()).await;
    cancel.cancel();
    let _ = poller.await;
    inbound.drain().await;
    deliveries.close();
    deliveries.wait().await;
    let _ = sweeper.await;
    served.context("upload server failed")?;

    info!("tgdrive stopped");
    Ok(())
}
