//! Tracking of ARM long-running operations
//!
//! ARM signals an asynchronous operation in one of three ways:
//!
//! - an `Azure-AsyncOperation` header pointing at a status resource,
//! - a `202 Accepted` with a `Location` header that answers 202 until done,
//! - a resource body whose `properties.provisioningState` is not terminal.
//!
//! Anything else is already finished when the initial response arrives.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::client::ArmTransport;
use crate::error::{CoreError, Result};
use crate::operation::{OperationHandle, OperationStatus, ProviderError};

const ASYNC_OPERATION: &str = "azure-asyncoperation";

#[derive(Deserialize)]
struct AsyncOperationBody {
    status: String,
    #[serde(default)]
    error: Option<ProviderError>,
}

enum Tracking {
    Done(Option<OperationStatus>),
    AsyncOperation(Url),
    Location(Url),
    ProvisioningState(Url),
}

/// [`OperationHandle`] over an ARM response
pub struct ArmOperation {
    description: String,
    /// Names the target in not-found errors
    resource: String,
    transport: ArmTransport,
    tracking: Tracking,
    /// Re-read on success to return the final resource; `None` for deletes
    resource_url: Option<Url>,
    retry_after: Option<Duration>,
}

impl ArmOperation {
    pub(crate) async fn from_response(
        description: String,
        resource: String,
        transport: ArmTransport,
        response: Response,
        resource_url: Option<Url>,
    ) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let retry_after = retry_after(&headers);
        let body = read_body(response).await?;

        let tracking = if let Some(url) = header_url(&headers, ASYNC_OPERATION) {
            Tracking::AsyncOperation(url)
        } else if let (StatusCode::ACCEPTED, Some(url)) = (status, header_url(&headers, LOCATION.as_str())) {
            Tracking::Location(url)
        } else {
            let state = provisioning_state(body.as_ref()).map(str::to_string);
            match (state.as_deref(), &resource_url) {
                (Some(state), Some(url)) if !is_terminal_state(state) => {
                    Tracking::ProvisioningState(url.clone())
                }
                (Some(state), _) if is_failed_state(state) => {
                    Tracking::Done(Some(OperationStatus::Failed(state_failure(state))))
                }
                _ if resource_url.is_none() => Tracking::Done(Some(OperationStatus::Succeeded(None))),
                _ => Tracking::Done(Some(OperationStatus::Succeeded(body))),
            }
        };

        Ok(Self {
            description,
            resource,
            transport,
            tracking,
            resource_url,
            retry_after,
        })
    }

    /// GET a status or resource URL. Throttling and server errors yield
    /// `None` so the caller keeps polling; other failures are mapped by
    /// [`ArmTransport::check`].
    async fn fetch(&mut self, url: Url) -> Result<Option<Response>> {
        let response = self.transport.send(Method::GET, url, None).await?;
        self.retry_after = retry_after(response.headers());

        let status = response.status();
        if is_transient(status) {
            debug!("{}: poll returned {}, will retry", self.description, status);
            return Ok(None);
        }
        self.transport
            .check(response, &self.resource, &self.description)
            .await
            .map(Some)
    }

    /// Status after the tracked operation reported success
    async fn succeeded(&mut self) -> Result<OperationStatus> {
        let Some(url) = self.resource_url.clone() else {
            return Ok(OperationStatus::Succeeded(None));
        };
        match self.fetch(url).await? {
            Some(response) => Ok(OperationStatus::Succeeded(read_body(response).await?)),
            None => Ok(OperationStatus::in_progress()),
        }
    }

    async fn poll_async_operation(&mut self, url: Url) -> Result<OperationStatus> {
        let Some(response) = self.fetch(url).await? else {
            return Ok(OperationStatus::in_progress());
        };
        let body: AsyncOperationBody = response
            .json()
            .await
            .map_err(|e| CoreError::Transport(format!("malformed operation status: {}", e)))?;

        match body.status.as_str() {
            "Succeeded" => self.succeeded().await,
            "Failed" | "Canceled" => Ok(OperationStatus::Failed(
                body.error.unwrap_or_else(|| state_failure(&body.status)),
            )),
            _ => Ok(OperationStatus::InProgress(Some(body.status))),
        }
    }

    async fn poll_location(&mut self, url: Url) -> Result<OperationStatus> {
        let Some(response) = self.fetch(url).await? else {
            return Ok(OperationStatus::in_progress());
        };
        if response.status() == StatusCode::ACCEPTED {
            return Ok(OperationStatus::in_progress());
        }
        self.succeeded().await
    }

    async fn poll_provisioning_state(&mut self, url: Url) -> Result<OperationStatus> {
        let Some(response) = self.fetch(url).await? else {
            return Ok(OperationStatus::in_progress());
        };
        let body = read_body(response).await?;
        let state = provisioning_state(body.as_ref()).map(str::to_string);

        Ok(match state.as_deref() {
            Some(state) if is_failed_state(state) => OperationStatus::Failed(state_failure(state)),
            Some(state) if !is_terminal_state(state) => {
                OperationStatus::InProgress(Some(state.to_string()))
            }
            _ => OperationStatus::Succeeded(body),
        })
    }
}

#[async_trait]
impl OperationHandle for ArmOperation {
    fn describe(&self) -> &str {
        &self.description
    }

    async fn poll(&mut self) -> Result<OperationStatus> {
        let status = match &mut self.tracking {
            Tracking::Done(status) => status.take().unwrap_or(OperationStatus::Succeeded(None)),
            Tracking::AsyncOperation(url) => {
                let url = url.clone();
                self.poll_async_operation(url).await?
            }
            Tracking::Location(url) => {
                let url = url.clone();
                self.poll_location(url).await?
            }
            Tracking::ProvisioningState(url) => {
                let url = url.clone();
                self.poll_provisioning_state(url).await?
            }
        };
        debug!("{}: {}", self.description, status.label());
        Ok(status)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

async fn read_body(response: Response) -> Result<Option<Value>> {
    let text = response
        .text()
        .await
        .map_err(|e| CoreError::Transport(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| CoreError::Transport(format!("malformed response body: {}", e)))
}

fn header_url(headers: &HeaderMap, name: &str) -> Option<Url> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Url::parse(value).ok())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Throttling and server-side errors worth polling through
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn provisioning_state(body: Option<&Value>) -> Option<&str> {
    body?.pointer("/properties/provisioningState")?.as_str()
}

fn is_terminal_state(state: &str) -> bool {
    matches!(state, "Succeeded" | "Failed" | "Canceled")
}

fn is_failed_state(state: &str) -> bool {
    matches!(state, "Failed" | "Canceled")
}

fn state_failure(state: &str) -> ProviderError {
    ProviderError::new(
        format!("Provisioning{}", state),
        format!("provisioning ended in state '{}'", state),
    )
}
