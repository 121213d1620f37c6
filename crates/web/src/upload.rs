//! `GET /upload` (form) and `POST /upload` (multipart submission).
//!
//! A submission claims its session before any byte is staged, so a second
//! concurrent POST with the same token is turned away as invalid. The token
//! is retired only after the transfer was attempted and the owner notified.
//!
//! Once the payload is staged, delivery runs on its own task. A browser that
//! disconnects mid-transfer only loses the response; the upload and the chat
//! notification still complete.

use {
    axum::{
        extract::{Multipart, Query, State, multipart::Field},
        http::StatusCode,
        response::{Html, IntoResponse, Response},
    },
    serde::Deserialize,
    tgdrive_common::{DeliveryOutcome, DeliveryStatus, sanitize_filename},
    tgdrive_sessions::{SessionClaim, token_prefix},
    tgdrive_storage::{TempHolding, TransferJob},
    tokio::io::AsyncWriteExt,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use tgdrive_metrics::{counter, labels, web as web_metrics};

use crate::{
    error::{Error, Result},
    state::AppState,
    templates::render_upload_form,
};

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// A payload staged on local disk, not yet transferred.
struct Staged {
    holding: TempHolding,
    file_name: String,
    mime_type: Option<String>,
    size: u64,
}

pub async fn upload_form_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let response = match query
        .token
        .as_deref()
        .and_then(|token| state.sessions.resolve(token))
    {
        Some(session) => match render_upload_form(&session) {
            Some(html) => Html(html).into_response(),
            None => {
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to render upload form").into_response()
            },
        },
        None => Error::InvalidToken.into_response(),
    };
    record_request("GET", &response);
    response
}

pub async fn upload_submit_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    multipart: Multipart,
) -> Response {
    let response = match receive(&state, query.token, multipart).await {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "browser upload rejected");
            e.into_response()
        },
    };

    record_request("POST", &response);
    response
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_request(method: &'static str, response: &Response) {
    #[cfg(feature = "metrics")]
    counter!(
        web_metrics::UPLOAD_REQUESTS_TOTAL,
        labels::METHOD => method,
        labels::OUTCOME => response.status().as_str().to_string()
    )
    .increment(1);
}

async fn receive(
    state: &AppState,
    query_token: Option<String>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut claim = match query_token.as_deref() {
        Some(token) => Some(state.sessions.claim(token).ok_or(Error::InvalidToken)?),
        None => None,
    };
    let mut staged: Option<Staged> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("token") if claim.is_none() => {
                let token = field.text().await?;
                claim = Some(state.sessions.claim(token.trim()).ok_or(Error::InvalidToken)?);
            },
            Some("file") if staged.is_none() => {
                // The token has to arrive before the payload does.
                let claim = claim.as_ref().ok_or(Error::InvalidToken)?;
                staged = Some(stage(state, claim, field).await?);
            },
            _ => {},
        }
    }

    let claim = claim.ok_or(Error::InvalidToken)?;
    let staged = staged.ok_or(Error::NoFile)?;
    let delivery = state.deliveries.spawn(deliver(state.clone(), claim, staged));
    Ok(delivery.await?)
}

async fn stage(state: &AppState, claim: &SessionClaim, mut field: Field<'_>) -> Result<Staged> {
    let session = claim.session();
    let file_name = field
        .file_name()
        .and_then(sanitize_filename)
        .or_else(|| session.filename_hint.as_deref().and_then(sanitize_filename))
        .unwrap_or_else(|| format!("upload_{}", uuid::Uuid::new_v4().simple()));
    let mime_type = field
        .content_type()
        .filter(|ct| !ct.is_empty())
        .map(str::to_string);

    let holding = TempHolding::create(&state.temp_dir, &file_name).await?;
    let mut out = holding.writer().await?;
    let mut size = 0u64;
    while let Some(chunk) = field.chunk().await? {
        out.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    out.flush().await?;

    #[cfg(feature = "metrics")]
    counter!(web_metrics::UPLOAD_BYTES_TOTAL).increment(size);

    debug!(
        owner = %session.owner,
        token = token_prefix(&session.token),
        file = %file_name,
        bytes = size,
        "browser upload staged"
    );
    Ok(Staged {
        holding,
        file_name,
        mime_type,
        size,
    })
}

async fn deliver(state: AppState, claim: SessionClaim, staged: Staged) -> Response {
    let owner = claim.session().owner.clone();
    info!(owner = %owner, file = %staged.file_name, bytes = staged.size, "relaying browser upload");

    let outcome = state
        .engine
        .upload(TransferJob {
            source: staged.holding,
            destination_name: staged.file_name,
            destination_container: state.container.clone(),
            mime_type: staged.mime_type,
            recipient: owner,
        })
        .await;

    let report = state.notifier.notify(&outcome).await;

    let token = claim.session().token.clone();
    if !claim.consume() {
        warn!(token = token_prefix(&token), "upload session expired during transfer");
    }

    outcome_response(&outcome, report.is_delivered())
}

fn outcome_response(outcome: &DeliveryOutcome, notified: bool) -> Response {
    match &outcome.status {
        DeliveryStatus::Failed { detail, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Upload failed: {detail}")).into_response()
        },
        DeliveryStatus::Delivered { .. } if notified => (
            StatusCode::OK,
            "Upload successful! Link sent to your Telegram.".to_string(),
        )
            .into_response(),
        DeliveryStatus::Delivered { link } => (
            StatusCode::OK,
            format!("Upload OK but couldn't notify via Telegram. Link: {link}"),
        )
            .into_response(),
    }
}
