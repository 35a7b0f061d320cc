//! Service principal authentication (OAuth2 client-credentials grant)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use url::Url;
use url::form_urlencoded;

use crate::client::{AccessToken, AuthError, CredentialProvider};

/// Token scope for the ARM control plane
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);
/// Upper bound on a reported token lifetime
const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client-secret credential with an in-memory token cache
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    cache: Mutex<Option<AccessToken>>,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, AuthError> {
        let raw = format!(
            "{}/{}/oauth2/v2.0/token",
            authority.trim_end_matches('/'),
            tenant_id
        );
        let token_url = Url::parse(&raw)
            .map_err(|e| AuthError::Configuration(format!("invalid authority '{}': {}", authority, e)))?;

        Ok(Self {
            http,
            token_url,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cache: Mutex::new(None),
        })
    }

    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("scope", ARM_SCOPE)
            .finish();

        debug!("Requesting token from {}", self.token_url);
        let response = self
            .http
            .post(self.token_url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<TokenError>(&text)
                .map(|e| e.error_description.unwrap_or(e.error))
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(if status.is_client_error() {
                AuthError::Rejected(reason)
            } else {
                AuthError::Transport(reason)
            });
        }

        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| AuthError::Transport(format!("malformed token response: {}", e)))?;
        trace!("Token valid for {}s", token.expires_in);

        Ok(AccessToken {
            token: token.access_token,
            expires_at: Instant::now()
                + Duration::from_secs(token.expires_in.min(MAX_TOKEN_LIFETIME_SECS)),
        })
    }
}

#[async_trait]
impl CredentialProvider for ClientSecretCredential {
    async fn authenticate(&self) -> Result<AccessToken, AuthError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref().filter(|t| !t.expires_within(REFRESH_MARGIN)) {
            return Ok(token.clone());
        }
        let token = self.request_token().await?;
        *cache = Some(token.clone());
        Ok(token)
    }
}
