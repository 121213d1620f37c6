//! Telegram side of tgdrive.
//!
//! Implements [`ChatGateway`](tgdrive_channels::ChatGateway) with teloxide,
//! classifies incoming messages and drives a manual `getUpdates` loop that
//! hands file announcements to the router.

pub mod bot;
pub mod classify;
pub mod error;
pub mod handlers;
pub mod outbound;

pub use {
    bot::{connect, spawn_polling},
    classify::{Classified, Command, classify},
    error::{Error, Result},
    handlers::InboundHandler,
    outbound::TelegramGateway,
};
