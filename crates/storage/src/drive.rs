//! Google Drive v3 backend.
//!
//! Resumable protocol: `POST …/files?uploadType=resumable` returns the
//! session URI in `Location`; chunks are `PUT` to it with a `Content-Range`.
//! `308` means more bytes are expected (`Range` reports what is stored),
//! `200`/`201` carries the created file.

use std::sync::Arc;

use {
    async_trait::async_trait,
    bytes::Bytes,
    reqwest::{
        StatusCode,
        header::{CONTENT_RANGE, LOCATION, RANGE},
        redirect::Policy,
    },
    secrecy::ExposeSecret,
    serde::Deserialize,
    tracing::{debug, trace},
};

use crate::{
    auth::TokenSource,
    backend::{
        ChunkStatus, ObjectId, ResumableRequest, ShareableLinks, StorageBackend, UploadHandle,
    },
    error::{Error, Result},
};

/// API base URLs, overridable for tests and proxies.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    /// Metadata API, e.g. `https://www.googleapis.com/drive/v3`.
    pub api_base: String,
    /// Media upload API, e.g. `https://www.googleapis.com/upload/drive/v3`.
    pub upload_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".into(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".into(),
        }
    }
}

impl DriveEndpoints {
    fn trimmed(self) -> Self {
        Self {
            api_base: self.api_base.trim_end_matches('/').to_string(),
            upload_base: self.upload_base.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileLinks {
    #[serde(default)]
    web_content_link: Option<String>,
    #[serde(default)]
    web_view_link: Option<String>,
}

pub struct DriveClient {
    http: reqwest::Client,
    auth: Arc<dyn TokenSource>,
    endpoints: DriveEndpoints,
}

impl DriveClient {
    pub fn new(auth: Arc<dyn TokenSource>, endpoints: DriveEndpoints) -> Result<Self> {
        // A 308 from the session URI is "resume incomplete", never a redirect.
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| Error::external("build drive http client", e))?;
        Ok(Self {
            http,
            auth,
            endpoints: endpoints.trimmed(),
        })
    }

    async fn bearer(&self) -> Result<String> {
        Ok(self.auth.bearer_token().await?.expose_secret().clone())
    }
}

fn content_range(offset: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {offset}-{}/{total}", offset + len - 1)
    }
}

/// Parse the `Range: bytes=0-N` header of a 308 into the persisted length.
fn persisted_from_range(value: Option<&str>) -> Result<u64> {
    let Some(value) = value else {
        return Ok(0);
    };
    let last = value
        .trim()
        .strip_prefix("bytes=")
        .and_then(|range| range.split_once('-'))
        .and_then(|(_, end)| end.parse::<u64>().ok())
        .ok_or_else(|| Error::protocol(format!("unparseable Range header: {value}")))?;
    Ok(last + 1)
}

#[async_trait]
impl StorageBackend for DriveClient {
    async fn begin_resumable_upload(&self, request: &ResumableRequest) -> Result<UploadHandle> {
        let url = format!(
            "{}/files?uploadType=resumable&supportsAllDrives=true",
            self.endpoints.upload_base
        );
        let mut metadata = serde_json::json!({
            "name": request.name,
            "parents": [request.container],
        });
        if let Some(mime) = &request.mime_type {
            metadata["mimeType"] = mime.clone().into();
        }

        let mut builder = self
            .http
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .header("X-Upload-Content-Length", request.size)
            .json(&metadata);
        if let Some(mime) = &request.mime_type {
            builder = builder.header("X-Upload-Content-Type", mime);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::external("begin resumable upload", e))?;
        if !response.status().is_success() {
            return Err(Error::from_response("begin resumable upload", response).await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::protocol("resumable session response has no Location header"))?;

        debug!(name = %request.name, size = request.size, "opened drive upload session");
        Ok(UploadHandle(location.to_string()))
    }

    async fn upload_chunk(
        &self,
        handle: &UploadHandle,
        offset: u64,
        total: u64,
        bytes: Bytes,
    ) -> Result<ChunkStatus> {
        let len = bytes.len() as u64;
        let response = self
            .http
            .put(&handle.0)
            .bearer_auth(self.bearer().await?)
            .header(CONTENT_RANGE, content_range(offset, len, total))
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::external("upload chunk", e))?;

        match response.status() {
            StatusCode::PERMANENT_REDIRECT => {
                let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
                let persisted = persisted_from_range(range)?;
                trace!(offset, len, persisted, total, "drive chunk accepted");
                Ok(ChunkStatus::Incomplete { persisted })
            },
            StatusCode::OK | StatusCode::CREATED => {
                let created: CreatedFile = response
                    .json()
                    .await
                    .map_err(|e| Error::external("upload chunk response", e))?;
                Ok(ChunkStatus::Complete(ObjectId(created.id)))
            },
            _ => Err(Error::from_response("upload chunk", response).await),
        }
    }

    async fn grant_public_read(&self, object: &ObjectId) -> Result<()> {
        let url = format!(
            "{}/files/{object}/permissions?supportsAllDrives=true",
            self.endpoints.api_base
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .json(&serde_json::json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await
            .map_err(|e| Error::external("grant public read", e))?;
        if !response.status().is_success() {
            return Err(Error::from_response("grant public read", response).await);
        }
        Ok(())
    }

    async fn fetch_shareable_link(&self, object: &ObjectId) -> Result<ShareableLinks> {
        let url = format!(
            "{}/files/{object}?fields=id,name,webViewLink,webContentLink&supportsAllDrives=true",
            self.endpoints.api_base
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| Error::external("fetch file links", e))?;
        if !response.status().is_success() {
            return Err(Error::from_response("fetch file links", response).await);
        }

        let links: FileLinks = response
            .json()
            .await
            .map_err(|e| Error::external("fetch file links response", e))?;
        Ok(ShareableLinks {
            content_link: links.web_content_link,
            view_link: links.web_view_link,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::auth::StaticToken, mockito::Matcher};

    fn client_for(server: &mockito::Server) -> DriveClient {
        DriveClient::new(Arc::new(StaticToken::new("test-token")), DriveEndpoints {
            api_base: server.url(),
            upload_base: format!("{}/upload/", server.url()),
        })
        .unwrap()
    }

    #[test]
    fn content_range_formats() {
        assert_eq!(content_range(0, 10, 25), "bytes 0-9/25");
        assert_eq!(content_range(20, 5, 25), "bytes 20-24/25");
        assert_eq!(content_range(0, 0, 0), "bytes */0");
    }

    #[test]
    fn range_header_parsing() {
        assert_eq!(persisted_from_range(None).unwrap(), 0);
        assert_eq!(persisted_from_range(Some("bytes=0-262143")).unwrap(), 262_144);
        assert!(matches!(
            persisted_from_range(Some("garbage")),
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn begin_returns_session_uri() {
        let mut server = mockito::Server::new_async().await;
        let session_uri = format!("{}/upload/session/abc", server.url());
        let mock = server
            .mock("POST", "/upload/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("uploadType".into(), "resumable".into()),
                Matcher::UrlEncoded("supportsAllDrives".into(), "true".into()),
            ]))
            .match_header("authorization", "Bearer test-token")
            .match_header("x-upload-content-length", "42")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "name": "report.pdf",
                "parents": ["folder-1"],
                "mimeType": "application/pdf",
            })))
            .with_status(200)
            .with_header("location", &session_uri)
            .create_async()
            .await;

        let handle = client_for(&server)
            .begin_resumable_upload(&ResumableRequest {
                name: "report.pdf".into(),
                container: "folder-1".into(),
                size: 42,
                mime_type: Some("application/pdf".into()),
            })
            .await
            .unwrap();

        assert_eq!(handle, UploadHandle(session_uri));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn begin_without_location_is_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/upload/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let err = client_for(&server)
            .begin_resumable_upload(&ResumableRequest {
                name: "a".into(),
                container: "f".into(),
                size: 1,
                mime_type: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn chunk_incomplete_then_complete() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("PUT", "/upload/session/abc")
            .match_header("content-range", "bytes 0-3/6")
            .with_status(308)
            .with_header("range", "bytes=0-3")
            .create_async()
            .await;
        let last = server
            .mock("PUT", "/upload/session/abc")
            .match_header("content-range", "bytes 4-5/6")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"file-123","name":"a.bin"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let handle = UploadHandle(format!("{}/upload/session/abc", server.url()));

        let status = client
            .upload_chunk(&handle, 0, 6, Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        assert_eq!(status, ChunkStatus::Incomplete { persisted: 4 });

        let status = client
            .upload_chunk(&handle, 4, 6, Bytes::from_static(b"ef"))
            .await
            .unwrap();
        assert_eq!(status, ChunkStatus::Complete(ObjectId("file-123".into())));

        first.assert_async().await;
        last.assert_async().await;
    }

    #[tokio::test]
    async fn chunk_server_error_surfaces_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/upload/session/abc")
            .with_status(503)
            .with_body("backend unavailable")
            .create_async()
            .await;

        let handle = UploadHandle(format!("{}/upload/session/abc", server.url()));
        let err = client_for(&server)
            .upload_chunk(&handle, 0, 1, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn grant_and_fetch_links() {
        let mut server = mockito::Server::new_async().await;
        let grant = server
            .mock("POST", "/files/file-123/permissions")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(
                serde_json::json!({ "role": "reader", "type": "anyone" }),
            ))
            .with_status(200)
            .with_body(r#"{"id":"anyoneWithLink"}"#)
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/files/file-123")
            .match_query(Matcher::UrlEncoded(
                "fields".into(),
                "id,name,webViewLink,webContentLink".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "file-123",
                    "name": "a.bin",
                    "webViewLink": "https://drive.google.com/file/d/file-123/view",
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let id = ObjectId("file-123".into());
        client.grant_public_read(&id).await.unwrap();
        let links = client.fetch_shareable_link(&id).await.unwrap();

        assert_eq!(links.content_link, None);
        assert_eq!(
            links.preferred(),
            Some("https://drive.google.com/file/d/file-123/view")
        );
        grant.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_grant_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/files/file-123/permissions")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error":{"message":"insufficientFilePermissions"}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .grant_public_read(&ObjectId("file-123".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 403, .. }));
    }
}
