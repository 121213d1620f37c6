//! Decide, per announced file, between relaying it automatically and
//! handing the user a browser upload link.
//!
//! Files of known size up to the threshold are downloaded from the chat
//! platform and pushed through the transfer engine under a deadline. Larger
//! files, files of unknown size and failed automatic attempts all end in a
//! handoff: a fresh upload session and its URL sent to the user.

pub mod error;
pub mod resolve;

pub use {
    error::{Error, Result},
    resolve::{
        HandoffReason, Route, RouteDecision, RoutePolicy, Router, RouterParts, UNSUPPORTED_TEXT,
        decide, upload_url, usage_text,
    },
};
