//! In-memory registry of browser upload authorizations.
//!
//! A chat user whose file cannot be relayed automatically gets a link
//! carrying a single-use token. The token is the only credential the browser
//! upload needs, so it is unguessable, expires, and can be retired exactly
//! once.

pub mod store;
mod token;

pub use {
    store::{DEFAULT_SESSION_TTL, SessionClaim, UploadSession, UploadSessionStore},
    token::{generate_token, token_prefix},
};
