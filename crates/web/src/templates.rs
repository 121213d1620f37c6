use {askama::Template, tgdrive_sessions::UploadSession, tracing::warn};

#[derive(Template)]
#[template(path = "upload.html", escape = "html")]
struct UploadFormTemplate<'a> {
    token: &'a str,
    owner: &'a str,
    filename_hint: Option<&'a str>,
}

/// HTML form for a live session. `None` if rendering failed.
pub(crate) fn render_upload_form(session: &UploadSession) -> Option<String> {
    let template = UploadFormTemplate {
        token: &session.token,
        owner: &session.owner,
        filename_hint: session.filename_hint.as_deref(),
    };
    match template.render() {
        Ok(html) => Some(html),
        Err(e) => {
            warn!(error = %e, "failed to render upload form");
            None
        },
    }
}
