//! Bearer tokens for the Drive API.
//!
//! Production uses a Google service account: an RS256-signed JWT assertion
//! is exchanged at the OAuth token endpoint and the resulting access token
//! is cached until shortly before it expires.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use {
    async_trait::async_trait,
    jsonwebtoken::{Algorithm, EncodingKey, Header},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tokio::sync::Mutex,
    tracing::debug,
};

use crate::{Error, Result};

const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<Secret<String>>;
}

/// A fixed token, for tests and for tokens minted outside the process.
pub struct StaticToken(Secret<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Secret::new(token.into()))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Result<Secret<String>> {
        Ok(Secret::new(self.0.expose_secret().clone()))
    }
}

/// The fields of a service-account key file this client needs.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: Secret<String>,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    token: Secret<String>,
    refresh_at: Instant,
}

pub struct ServiceAccountAuth {
    client_email: String,
    key_id: Option<String>,
    signing_key: EncodingKey,
    token_url: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.client_email)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountAuth {
    /// Parse a service-account key JSON document.
    ///
    /// `token_url` overrides the key's own `token_uri`.
    pub fn from_json(
        json: &str,
        token_url: Option<String>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| Error::auth(format!("invalid service-account key: {e}")))?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())
            .map_err(|e| Error::auth(format!("invalid service-account private key: {e}")))?;
        let token_url = token_url
            .or(key.token_uri)
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        Ok(Self {
            client_email: key.client_email,
            key_id: key.private_key_id,
            signing_key,
            token_url,
            http,
            cached: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    fn assertion(&self) -> Result<String> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::auth(format!("system clock before epoch: {e}")))?
            .as_secs();
        let claims = Claims {
            iss: &self.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.token_url,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|e| Error::auth(format!("failed to sign assertion: {e}")))
    }

    async fn exchange(&self) -> Result<CachedToken> {
        let assertion = self.assertion()?;
        let response = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::external("token exchange", e))?;

        if !response.status().is_success() {
            return Err(Error::from_response("token exchange", response).await);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::external("token exchange response", e))?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);

        debug!(
            client_email = %self.client_email,
            expires_in = body.expires_in,
            "obtained drive access token"
        );
        Ok(CachedToken {
            token: Secret::new(body.access_token),
            refresh_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountAuth {
    async fn bearer_token(&self) -> Result<Secret<String>> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref()
            && Instant::now() < entry.refresh_at
        {
            return Ok(Secret::new(entry.token.expose_secret().clone()));
        }

        let fresh = self.exchange().await?;
        let token = Secret::new(fresh.token.expose_secret().clone());
        *cached = Some(fresh);
        Ok(token)
    }
}
