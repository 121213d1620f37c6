//! Metric name and label definitions.

/// Upload session (browser link) metrics
pub mod sessions {
    /// Upload links minted
    pub const MINTED_TOTAL: &str = "tgdrive_sessions_minted_total";
    /// Upload links retired after a browser upload
    pub const CONSUMED_TOTAL: &str = "tgdrive_sessions_consumed_total";
    /// Token lookups that found nothing usable
    pub const REJECTED_TOTAL: &str = "tgdrive_sessions_rejected_total";
    /// Sessions dropped by the expiry sweep
    pub const EXPIRED_TOTAL: &str = "tgdrive_sessions_expired_total";
    /// Sessions currently held in memory
    pub const ACTIVE: &str = "tgdrive_sessions_active";
}

/// Resumable transfer metrics
pub mod transfer {
    /// Transfers started
    pub const STARTED_TOTAL: &str = "tgdrive_transfer_started_total";
    /// Transfers that produced a shareable link
    pub const COMPLETED_TOTAL: &str = "tgdrive_transfer_completed_total";
    /// Transfers that failed, labelled by `stage`
    pub const FAILED_TOTAL: &str = "tgdrive_transfer_failed_total";
    /// Chunk attempts beyond the first
    pub const CHUNK_RETRIES_TOTAL: &str = "tgdrive_transfer_chunk_retries_total";
    /// Bytes acknowledged by the storage backend
    pub const BYTES_UPLOADED_TOTAL: &str = "tgdrive_transfer_bytes_uploaded_total";
    /// Wall time of a whole transfer
    pub const DURATION_SECONDS: &str = "tgdrive_transfer_duration_seconds";
}

/// Routing decisions for inbound announcements
pub mod routing {
    /// Decisions, labelled by `route` (`auto_relay` / `handoff`)
    pub const DECISIONS_TOTAL: &str = "tgdrive_routing_decisions_total";
    /// Automatic relays that fell back to a browser link
    pub const AUTO_RELAY_FALLBACKS_TOTAL: &str = "tgdrive_routing_auto_relay_fallbacks_total";
}

/// Chat notification metrics
pub mod notify {
    /// Messages delivered to chat users
    pub const SENT_TOTAL: &str = "tgdrive_notify_sent_total";
    /// Messages that could not be delivered
    pub const FAILED_TOTAL: &str = "tgdrive_notify_failed_total";
}

/// Telegram metrics
pub mod telegram {
    /// Messages received from Telegram
    pub const MESSAGES_RECEIVED_TOTAL: &str = "tgdrive_telegram_messages_received_total";
    /// Attachments rejected as unsupported
    pub const UNSUPPORTED_TOTAL: &str = "tgdrive_telegram_unsupported_total";
    /// Rate-limit waits honoured before resending
    pub const RETRY_AFTER_TOTAL: &str = "tgdrive_telegram_retry_after_total";
    /// `getUpdates` failures
    pub const POLL_ERRORS_TOTAL: &str = "tgdrive_telegram_poll_errors_total";
}

/// Browser upload endpoint metrics
pub mod web {
    /// Upload page requests, labelled by `method` and `outcome`
    pub const UPLOAD_REQUESTS_TOTAL: &str = "tgdrive_web_upload_requests_total";
    /// Bytes received from browsers
    pub const UPLOAD_BYTES_TOTAL: &str = "tgdrive_web_upload_bytes_total";
}

/// Common label keys
pub mod labels {
    pub const STAGE: &str = "stage";
    pub const ROUTE: &str = "route";
    pub const METHOD: &str = "method";
    pub const OUTCOME: &str = "outcome";
}

/// Histogram bucket definitions
pub mod buckets {
    /// Transfer durations: 100ms to 1 hour
    pub const TRANSFER_DURATION: &[f64] = &[
        0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
    ];
}
