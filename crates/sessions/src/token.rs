use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    rand::RngCore,
};

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Generate an unguessable, URL-safe upload token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Leading characters of a token, safe to put in logs.
#[must_use]
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(6)
        .map_or(token.len(), |(idx, _)| idx);
    &token[..end]
}
