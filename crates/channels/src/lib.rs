//! Chat side of the relay.
//!
//! A chat platform (Telegram in production) implements [`ChatGateway`]:
//! send a text to a user, download an announced file. The
//! [`NotificationDispatcher`] turns transfer outcomes into user-facing
//! messages and never lets a delivery failure escape.

pub mod error;
pub mod gateway;
pub mod notify;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use {
    error::{Error, Result},
    gateway::ChatGateway,
    notify::{NotificationDispatcher, NotifyReport},
};
