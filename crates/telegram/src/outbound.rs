use std::{future::Future, path::Path, time::Duration};

use {
    async_trait::async_trait,
    teloxide::{RequestError, net::Download, prelude::*},
    tgdrive_channels::{ChatGateway, Error as ChannelError, Result as ChannelResult},
    tgdrive_common::FileRef,
    tokio::io::AsyncWriteExt,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use tgdrive_metrics::{counter, telegram as tg_metrics};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// [`ChatGateway`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

async fn run_telegram_request_with_retry<T, F, Fut>(
    to: &str,
    operation: &'static str,
    mut request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id = to,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                #[cfg(feature = "metrics")]
                counter!(tg_metrics::RETRY_AFTER_TOTAL).increment(1);

                warn!(
                    chat_id = to,
                    operation,
                    retries,
                    max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                    retry_after_secs = wait.as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn parse_chat_id(to: &str) -> ChannelResult<ChatId> {
    let id = to
        .trim()
        .parse::<i64>()
        .map_err(|e| ChannelError::invalid_input(format!("chat id {to:?}: {e}")))?;
    Ok(ChatId(id))
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn send_message(&self, to: &str, text: &str) -> ChannelResult<()> {
        let chat_id = parse_chat_id(to)?;
        let bot = &self.bot;

        run_telegram_request_with_retry(to, "send message", || {
            let req = bot.send_message(chat_id, text);
            async move { req.await }
        })
        .await
        .map_err(|e| ChannelError::external("telegram send message", e))?;

        debug!(chat_id = to, "telegram message sent");
        Ok(())
    }

    async fn fetch_file(&self, file: &FileRef, dest: &Path) -> ChannelResult<u64> {
        let bot = &self.bot;
        let meta = run_telegram_request_with_retry(&file.id, "get file", || {
            let req = bot.get_file(&file.id);
            async move { req.await }
        })
        .await
        .map_err(|e| ChannelError::external("telegram get file", e))?;

        let mut out = tokio::fs::File::create(dest).await?;
        bot.download_file(&meta.path, &mut out)
            .await
            .map_err(|e| ChannelError::external("telegram download", e))?;
        out.flush().await?;

        let written = out.metadata().await?.len();
        debug!(
            file_id = %file.id,
            path = %meta.path,
            bytes = written,
            "telegram file downloaded"
        );
        Ok(written)
    }
}
