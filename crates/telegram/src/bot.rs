use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use tgdrive_metrics::{counter, telegram as tg_metrics};

use crate::{Result, handlers::InboundHandler};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Build a bot for `token`, verify it and switch it to long polling.
///
/// The HTTP client timeout is kept above the long-poll timeout so the
/// client never aborts a `getUpdates` Telegram is still holding open.
pub async fn connect(token: &Secret<String>, poll_timeout_secs: u32) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(poll_timeout_secs) + 15))
        .build()?;
    let bot = Bot::with_client(token.expose_secret(), client);

    let me = bot.get_me().await?;
    bot.delete_webhook().send().await?;

    let commands = vec![
        BotCommand::new("start", "How to send files"),
        BotCommand::new("help", "How to send files"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(
        username = ?me.username,
        "telegram bot connected (webhook cleared)"
    );
    Ok(bot)
}

/// Run the manual `getUpdates` loop until `cancel` fires.
pub fn spawn_polling(
    bot: Bot,
    handler: InboundHandler,
    poll_timeout_secs: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            let request = bot
                .get_updates()
                .offset(offset)
                .timeout(poll_timeout_secs)
                .allowed_updates(vec![AllowedUpdate::Message]);

            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = request.send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                debug!(chat_id = msg.chat.id.0, "received telegram message");
                                handler.handle_message(&msg).await;
                            },
                            other => {
                                debug!("ignoring non-message update: {other:?}");
                            },
                        }
                    }
                },
                Err(e) => {
                    #[cfg(feature = "metrics")]
                    counter!(tg_metrics::POLL_ERRORS_TOTAL).increment(1);

                    if is_conflict(&e) {
                        error!(
                            "telegram polling disabled: another instance is already running with this token"
                        );
                        cancel.cancel();
                        break;
                    }

                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                    }
                },
            }
        }

        info!("telegram polling stopped");
    })
}

fn is_conflict(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::TerminatedByOtherGetUpdates))
}
