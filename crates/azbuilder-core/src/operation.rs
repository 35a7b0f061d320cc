//! Long-running operation handles
//!
//! Create, update and delete calls against the control plane return
//! immediately with an [`OperationHandle`]. The handle is driven to a
//! terminal state by [`poll_operation`](crate::progress::poll_operation);
//! nothing else in the crate waits on remote work.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::Result;

/// Diagnostic reported by the control plane for a failed operation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            target: None,
        }
    }
}

/// Observed state of an in-flight operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    /// Still running; carries the provider's status text when it gave one
    InProgress(Option<String>),
    /// Finished; carries the resulting resource, if the operation produces one
    Succeeded(Option<Value>),
    /// Finished with a provider-side failure
    Failed(ProviderError),
}

impl OperationStatus {
    pub fn in_progress() -> Self {
        OperationStatus::InProgress(None)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::InProgress(_))
    }

    /// Status text for progress reporting
    pub fn label(&self) -> &str {
        match self {
            OperationStatus::InProgress(Some(status)) => status,
            OperationStatus::InProgress(None) => "InProgress",
            OperationStatus::Succeeded(_) => "Succeeded",
            OperationStatus::Failed(_) => "Failed",
        }
    }
}

/// Pollable handle for an asynchronous provider operation
#[async_trait]
pub trait OperationHandle: Send {
    /// Human-readable description, e.g. "create managed cluster 'demo'"
    fn describe(&self) -> &str;

    /// Query the provider once for the operation's current state
    async fn poll(&mut self) -> Result<OperationStatus>;

    /// Provider-suggested delay before the next poll
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Handle for an operation that finished synchronously
pub struct CompletedOperation {
    description: String,
    result: Option<OperationStatus>,
}

impl CompletedOperation {
    pub fn new(description: impl Into<String>, status: OperationStatus) -> Self {
        Self {
            description: description.into(),
            result: Some(status),
        }
    }
}

#[async_trait]
impl OperationHandle for CompletedOperation {
    fn describe(&self) -> &str {
        &self.description
    }

    async fn poll(&mut self) -> Result<OperationStatus> {
        Ok(self
            .result
            .take()
            .unwrap_or(OperationStatus::Succeeded(None)))
    }
}
