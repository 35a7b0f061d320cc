//! Azure Resource Manager implementation of the client seams
//!
//! [`ArmClientFactory`] authenticates a service principal with the OAuth2
//! client-credentials grant and hands out [`ArmResourceClient`]s that speak
//! the ARM REST API. Long-running operations are tracked by
//! [`ArmOperation`].
//!
//! The ARM endpoint and the identity authority can both be redirected
//! (`AZBUILDER_ARM_ENDPOINT`, `AZURE_AUTHORITY_HOST`), which is how the
//! integration tests point the client at a mock server.

pub mod client;
pub mod credential;
pub mod operation;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::client::{AuthError, ClientFactory, CredentialProvider, ResourceClient, ResourceKind, check_scope};
use crate::config::AzureCredentials;
use crate::config::credentials::ENV_TENANT_ID;
use crate::error::{CoreError, Result};

pub use client::ArmResourceClient;
pub use credential::ClientSecretCredential;
pub use operation::ArmOperation;

/// Public Azure Resource Manager endpoint
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Public Microsoft identity platform authority
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

pub const ENV_ARM_ENDPOINT: &str = "AZBUILDER_ARM_ENDPOINT";
pub const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";

/// User agent sent on every request
pub const USER_AGENT: &str = concat!("azbuilder/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type CredentialKey = (String, String, String);

/// Builds ARM clients, caching one credential per service principal
pub struct ArmClientFactory {
    http: reqwest::Client,
    endpoint: Url,
    authority: String,
    credentials: Mutex<HashMap<CredentialKey, Arc<ClientSecretCredential>>>,
}

impl ArmClientFactory {
    pub fn new(endpoint: &str, authority: &str) -> Result<Self> {
        // Url::join drops the last path segment unless it ends with '/'
        let normalized = format!("{}/", endpoint.trim_end_matches('/'));
        let endpoint = Url::parse(&normalized)
            .map_err(|e| CoreError::Transport(format!("invalid ARM endpoint '{}': {}", endpoint, e)))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            authority: authority.trim_end_matches('/').to_string(),
            credentials: Mutex::new(HashMap::new()),
        })
    }

    /// Factory for public Azure, honouring the endpoint overrides
    pub fn from_env() -> Result<Self> {
        let endpoint = env::var(ENV_ARM_ENDPOINT).unwrap_or_else(|_| DEFAULT_ARM_ENDPOINT.to_string());
        let authority =
            env::var(ENV_AUTHORITY_HOST).unwrap_or_else(|_| DEFAULT_AUTHORITY_HOST.to_string());
        debug!("ARM endpoint {}, authority {}", endpoint, authority);
        Self::new(&endpoint, &authority)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> std::result::Result<Arc<ClientSecretCredential>, AuthError> {
        let key = (
            tenant_id.to_string(),
            client_id.to_string(),
            client_secret.to_string(),
        );
        let mut cache = self.credentials.lock().await;
        if let Some(existing) = cache.get(&key) {
            return Ok(existing.clone());
        }
        let credential = Arc::new(ClientSecretCredential::new(
            self.http.clone(),
            &self.authority,
            tenant_id,
            client_id,
            client_secret,
        )?);
        cache.insert(key, credential.clone());
        Ok(credential)
    }
}

#[async_trait]
impl ClientFactory for ArmClientFactory {
    async fn client_for(
        &self,
        kind: ResourceKind,
        credentials: &AzureCredentials,
        scope: Option<&str>,
    ) -> Result<Arc<dyn ResourceClient>> {
        let principal = credentials.validated()?;
        let construction = |source| CoreError::ClientConstruction { kind, source };

        check_scope(kind, scope).map_err(construction)?;

        let tenant_id = principal
            .tenant_id
            .map(str::to_string)
            .or_else(|| env::var(ENV_TENANT_ID).ok().filter(|t| !t.trim().is_empty()))
            .ok_or_else(|| {
                construction(AuthError::Configuration(format!(
                    "no tenant id: set tenantId in the credentials file or {}",
                    ENV_TENANT_ID
                )))
            })?;

        let credential = self
            .credential(&tenant_id, principal.client_id, principal.client_secret)
            .await
            .map_err(construction)?;

        // Authenticate now so a rejected secret fails here, not mid-stack
        credential.authenticate().await.map_err(construction)?;
        info!("Authenticated {} client for {}", kind, principal.client_id);

        Ok(Arc::new(ArmResourceClient::new(
            kind,
            self.http.clone(),
            self.endpoint.clone(),
            principal.subscription_id,
            scope,
            credential,
        )))
    }
}
