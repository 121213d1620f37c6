/// Expand `${VAR}` and `${VAR:-fallback}` placeholders in raw config text.
///
/// A placeholder whose variable is unset and has no fallback is kept verbatim,
/// so validation can point at it.
pub fn substitute_env(input: &str) -> String {
    expand(input, |name| std::env::var(name).ok())
}

fn expand(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: copy the remainder untouched.
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match lookup(name).or_else(|| fallback.map(str::to_string)) {
            Some(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "TGDRIVE_TEST_FOLDER" => Some("folder-123".into()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            expand("folder_id = \"${TGDRIVE_TEST_FOLDER}\"", lookup),
            "folder_id = \"folder-123\""
        );
    }

    #[test]
    fn uses_fallback_for_unset_var() {
        assert_eq!(expand("port = ${TGDRIVE_PORT:-5000}", lookup), "port = 5000");
        assert_eq!(
            expand("${TGDRIVE_TEST_FOLDER:-other}", lookup),
            "folder-123"
        );
    }

    #[test]
    fn keeps_unknown_and_malformed_placeholders() {
        assert_eq!(expand("${TGDRIVE_MISSING}", lookup), "${TGDRIVE_MISSING}");
        assert_eq!(expand("${}", lookup), "${}");
        assert_eq!(expand("a ${UNTERMINATED", lookup), "a ${UNTERMINATED");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text $HOME"), "plain text $HOME");
    }
}
