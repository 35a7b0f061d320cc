//! Control-plane client seams
//!
//! The core talks to the provider only through the traits in this module.
//! [`crate::arm`] implements them against Azure Resource Manager; the
//! `testing` module implements them in memory.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{AzureCredentials, ValidationError};
use crate::error::Result;
use crate::operation::{OperationHandle, ProviderError};

/// Kinds of resource the core provisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    ResourceGroup,
    ManagedCluster,
    StorageAccount,
    SqlServer,
    SqlDatabase,
}

impl ResourceKind {
    /// Whether clients of this kind are bound to a resource group
    pub fn requires_scope(&self) -> bool {
        !matches!(self, ResourceKind::ResourceGroup)
    }

    /// ARM provider namespace and resource type path
    pub fn provider_path(&self) -> Option<&'static str> {
        match self {
            ResourceKind::ResourceGroup => None,
            ResourceKind::ManagedCluster => Some("Microsoft.ContainerService/managedClusters"),
            ResourceKind::StorageAccount => Some("Microsoft.Storage/storageAccounts"),
            // Databases are addressed as `{server}/databases/{db}`
            ResourceKind::SqlServer | ResourceKind::SqlDatabase => Some("Microsoft.Sql/servers"),
        }
    }

    /// ARM `api-version` for this kind
    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "2021-04-01",
            ResourceKind::ManagedCluster => "2024-02-01",
            ResourceKind::StorageAccount => "2023-01-01",
            ResourceKind::SqlServer | ResourceKind::SqlDatabase => "2021-11-01",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::ResourceGroup => "resource group",
            ResourceKind::ManagedCluster => "managed cluster",
            ResourceKind::StorageAccount => "storage account",
            ResourceKind::SqlServer => "sql server",
            ResourceKind::SqlDatabase => "sql database",
        };
        f.write_str(name)
    }
}

/// Bearer token and its expiry
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Instant,
}

impl AccessToken {
    /// True when the token expires within `margin`
    pub fn expires_within(&self, margin: std::time::Duration) -> bool {
        self.expires_at
            .checked_duration_since(Instant::now())
            .is_none_or(|left| left <= margin)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Failures while acquiring credentials or building a client
#[derive(Error, Debug)]
pub enum AuthError {
    /// The identity provider refused the credentials
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The control plane accepted the token but refused the call
    #[error("not authorized: {0}")]
    Forbidden(ProviderError),

    /// The identity provider could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The client was asked for something it cannot be built for
    #[error("{0}")]
    Configuration(String),
}

/// Source of bearer tokens for the control plane
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn authenticate(&self) -> std::result::Result<AccessToken, AuthError>;
}

/// Client for one resource kind, bound to its scope at construction
#[async_trait]
pub trait ResourceClient: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Start an idempotent create-or-update
    async fn create_or_update(
        &self,
        name: &str,
        properties: Value,
    ) -> Result<Box<dyn OperationHandle>>;

    /// Read a resource; `NotFound` when it does not exist
    async fn get(&self, name: &str) -> Result<Value>;

    /// Start a delete
    async fn delete(&self, name: &str) -> Result<Box<dyn OperationHandle>>;

    /// Invoke a POST action on a resource, e.g. `listClusterAdminCredential`
    async fn action(&self, name: &str, action: &str) -> Result<Value>;
}

/// Produces kind-scoped clients from credentials
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Build a client for `kind`. `scope` is the resource group for every
    /// kind except [`ResourceKind::ResourceGroup`], which takes `None`.
    ///
    /// Credentials are re-validated here; a missing field is a
    /// `Validation` error and nothing is sent.
    async fn client_for(
        &self,
        kind: ResourceKind,
        credentials: &AzureCredentials,
        scope: Option<&str>,
    ) -> Result<Arc<dyn ResourceClient>>;
}

/// Check that `scope` matches what `kind` needs
pub fn check_scope(kind: ResourceKind, scope: Option<&str>) -> std::result::Result<(), AuthError> {
    match (kind.requires_scope(), scope) {
        (true, Some(group)) if !group.trim().is_empty() => Ok(()),
        (true, _) => Err(AuthError::Configuration(format!(
            "a {} client needs a resource group scope",
            kind
        ))),
        (false, None) => Ok(()),
        (false, Some(_)) => Err(AuthError::Configuration(format!(
            "a {} client takes no scope",
            kind
        ))),
    }
}
