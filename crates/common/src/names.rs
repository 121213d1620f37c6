/// Reduce a user-supplied file name to `[A-Za-z0-9._-]`, with whitespace
/// turned into `_` and leading dots stripped.
///
/// Returns `None` when nothing usable is left.
#[must_use]
pub fn sanitize_filename(name: &str) -> Option<String> {
    // Only the last path component counts.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let sanitized: String = base
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    (!sanitized.is_empty()).then(|| sanitized.to_string())
}
