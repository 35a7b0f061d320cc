//! ARM REST client for a single resource kind

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use super::operation::ArmOperation;
use crate::client::{AuthError, CredentialProvider, ResourceClient, ResourceKind};
use crate::error::{CoreError, Result};
use crate::operation::{OperationHandle, ProviderError};

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

/// Authenticated request sender shared by a client and its operations
#[derive(Clone)]
pub(crate) struct ArmTransport {
    pub(crate) kind: ResourceKind,
    http: reqwest::Client,
    credential: Arc<dyn CredentialProvider>,
}

impl ArmTransport {
    pub(crate) fn new(
        kind: ResourceKind,
        http: reqwest::Client,
        credential: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            kind,
            http,
            credential,
        }
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Response> {
        let token = self
            .credential
            .authenticate()
            .await
            .map_err(|source| CoreError::ClientConstruction {
                kind: self.kind,
                source,
            })?;

        trace!("{} {}", method, url);
        let mut request = self.http.request(method, url).bearer_auth(token.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))
    }

    /// Map a non-success response to an error. `resource` names the target
    /// for not-found errors; `operation` describes the call for the rest.
    pub(crate) async fn check(
        &self,
        response: Response,
        resource: &str,
        operation: &str,
    ) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        debug!("{} returned {}: {}", operation, status, text);
        let source = provider_error(status, &text);

        Err(match status {
            StatusCode::NOT_FOUND => CoreError::NotFound {
                resource: resource.to_string(),
            },
            StatusCode::UNAUTHORIZED => CoreError::ClientConstruction {
                kind: self.kind,
                source: AuthError::Rejected(source.to_string()),
            },
            StatusCode::FORBIDDEN => CoreError::ClientConstruction {
                kind: self.kind,
                source: AuthError::Forbidden(source),
            },
            _ => CoreError::ProviderOperation {
                operation: operation.to_string(),
                source,
            },
        })
    }
}

/// Decode an ARM error body, falling back to the status line
fn provider_error(status: StatusCode, body: &str) -> ProviderError {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .unwrap_or_else(|_| {
            let message = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("no response body")
                    .to_string()
            } else {
                body.trim().to_string()
            };
            ProviderError::new(format!("Http{}", status.as_u16()), message)
        })
}

/// Client for one resource kind within one subscription (and group)
pub struct ArmResourceClient {
    transport: ArmTransport,
    endpoint: Url,
    subscription_id: String,
    scope: Option<String>,
}

impl ArmResourceClient {
    pub fn new(
        kind: ResourceKind,
        http: reqwest::Client,
        endpoint: Url,
        subscription_id: &str,
        scope: Option<&str>,
        credential: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            transport: ArmTransport::new(kind, http, credential),
            endpoint,
            subscription_id: subscription_id.to_string(),
            scope: scope.map(str::to_string),
        }
    }

    /// Full resource URL with `api-version`, optionally with an action suffix
    pub fn resource_url(&self, name: &str, action: Option<&str>) -> Result<Url> {
        let kind = self.transport.kind;
        let mut path = match (kind.provider_path(), &self.scope) {
            (Some(provider), Some(group)) => format!(
                "subscriptions/{}/resourceGroups/{}/providers/{}/{}",
                self.subscription_id, group, provider, name
            ),
            _ => format!("subscriptions/{}/resourcegroups/{}", self.subscription_id, name),
        };
        if let Some(action) = action {
            path.push('/');
            path.push_str(action);
        }

        let mut url = self
            .endpoint
            .join(&path)
            .map_err(|e| CoreError::Transport(format!("invalid resource path '{}': {}", path, e)))?;
        url.query_pairs_mut()
            .append_pair("api-version", kind.api_version());
        Ok(url)
    }

    fn label(&self, name: &str) -> String {
        format!("{} '{}'", self.transport.kind, name)
    }
}

#[async_trait]
impl ResourceClient for ArmResourceClient {
    fn kind(&self) -> ResourceKind {
        self.transport.kind
    }

    async fn create_or_update(
        &self,
        name: &str,
        properties: Value,
    ) -> Result<Box<dyn OperationHandle>> {
        let url = self.resource_url(name, None)?;
        let operation = format!("create {}", self.label(name));

        let response = self
            .transport
            .send(Method::PUT, url.clone(), Some(&properties))
            .await?;
        let response = self
            .transport
            .check(response, &self.label(name), &operation)
            .await?;

        let handle = ArmOperation::from_response(
            operation,
            self.label(name),
            self.transport.clone(),
            response,
            Some(url),
        )
        .await?;
        Ok(Box::new(handle))
    }

    async fn get(&self, name: &str) -> Result<Value> {
        let url = self.resource_url(name, None)?;
        let response = self.transport.send(Method::GET, url, None).await?;
        let response = self
            .transport
            .check(response, &self.label(name), &format!("get {}", self.label(name)))
            .await?;
        response
            .json()
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<Box<dyn OperationHandle>> {
        let url = self.resource_url(name, None)?;
        let operation = format!("delete {}", self.label(name));

        let response = self.transport.send(Method::DELETE, url, None).await?;
        let response = self
            .transport
            .check(response, &self.label(name), &operation)
            .await?;

        let handle =
            ArmOperation::from_response(operation, self.label(name), self.transport.clone(), response, None)
                .await?;
        Ok(Box::new(handle))
    }

    async fn action(&self, name: &str, action: &str) -> Result<Value> {
        let url = self.resource_url(name, Some(action))?;
        let operation = format!("{} on {}", action, self.label(name));

        let response = self.transport.send(Method::POST, url, None).await?;
        let response = self
            .transport
            .check(response, &self.label(name), &operation)
            .await?;
        response
            .json()
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))
    }
}
