use {
    teloxide::types::Message,
    tgdrive_channels::NotificationDispatcher,
    tgdrive_routing::{RouteDecision, Router, UNSUPPORTED_TEXT, usage_text},
    tokio::task::JoinHandle,
    tokio_util::task::TaskTracker,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use tgdrive_metrics::{counter, telegram as tg_metrics};

use crate::classify::{Classified, Command, classify};

/// Reacts to messages coming out of the polling loop.
#[derive(Clone)]
pub struct InboundHandler {
    router: Router,
    notifier: NotificationDispatcher,
    routes: TaskTracker,
}

impl InboundHandler {
    pub fn new(router: Router, notifier: NotificationDispatcher) -> Self {
        Self {
            router,
            notifier,
            routes: TaskTracker::new(),
        }
    }

    /// Wait for every spawned route task to finish. Call after the polling
    /// loop has stopped.
    pub async fn drain(&self) {
        self.routes.close();
        if !self.routes.is_empty() {
            info!(in_flight = self.routes.len(), "waiting for file relays to finish");
        }
        self.routes.wait().await;
    }

    /// Handle one message.
    ///
    /// Commands and unsupported content are answered inline. File
    /// announcements are routed on a spawned task so a slow relay never
    /// holds up the polling loop; the task handle is returned.
    pub async fn handle_message(&self, msg: &Message) -> Option<JoinHandle<RouteDecision>> {
        #[cfg(feature = "metrics")]
        counter!(tg_metrics::MESSAGES_RECEIVED_TOTAL).increment(1);

        let chat_id = msg.chat.id.0.to_string();
        match classify(msg) {
            Classified::File(announcement) => {
                debug!(
                    chat_id = %chat_id,
                    kind = %announcement.kind,
                    size = ?announcement.size,
                    "file announcement received"
                );
                let router = self.router.clone();
                Some(
                    self.routes
                        .spawn(async move { router.route(announcement).await }),
                )
            },
            Classified::Command(Command::Start | Command::Help) => {
                let text = usage_text(self.router.policy().threshold_bytes);
                self.notifier.send_text(&chat_id, &text).await;
                None
            },
            Classified::Unsupported => {
                #[cfg(feature = "metrics")]
                counter!(tg_metrics::UNSUPPORTED_TOTAL).increment(1);

                self.notifier.send_text(&chat_id, UNSUPPORTED_TEXT).await;
                None
            },
            Classified::Ignored => {
                debug!(chat_id = %chat_id, "ignoring telegram message");
                None
            },
        }
    }
}
