//! Stack provisioning
//!
//! A stack is one primary resource (managed cluster, storage account or SQL
//! database) plus the resource group that scopes it. All three kinds share
//! one [`StackProvisioner`]; what differs lives behind [`StackKind`]:
//!
//! - which properties block the config must carry,
//! - the ordered create-or-update calls ([`CreateStep`]) to issue,
//! - how `get` reads the stack back.

mod blob;
mod cluster;
mod database;
mod provisioner;
pub mod state;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::client::{ClientFactory, ResourceKind};
use crate::config::{AzureCredentials, ServicePrincipal, StackConfig, ValidationError};
use crate::error::Result;
use crate::resource_group::missing_id;

pub use blob::BlobStack;
pub use cluster::{ClusterStack, Kubeconfig};
pub use database::DatabaseStack;
pub use provisioner::StackProvisioner;
pub use state::{StackEvent, StackState};

/// The stack kinds offered on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StackType {
    /// Managed Kubernetes cluster
    #[value(name = "aks", alias = "cluster")]
    Cluster,
    /// Blob storage account
    Blob,
    /// SQL server and database
    #[value(alias = "sql")]
    Database,
}

impl fmt::Display for StackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StackType::Cluster => "aks",
            StackType::Blob => "blob",
            StackType::Database => "database",
        };
        f.write_str(name)
    }
}

/// One create-or-update call, issued in order
#[derive(Debug, Clone, PartialEq)]
pub struct CreateStep {
    pub kind: ResourceKind,
    pub name: String,
    pub properties: Value,
}

impl CreateStep {
    pub fn new(kind: ResourceKind, name: impl Into<String>, properties: Value) -> Self {
        Self {
            kind,
            name: name.into(),
            properties,
        }
    }
}

/// A resource that exists at the provider
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub resource_group: String,
    /// Provider-assigned id, never empty
    pub id: String,
    pub properties: Value,
    /// Resources created alongside this one (the SQL server of a database)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<ManagedResource>,
}

impl ManagedResource {
    /// Build from an operation or GET payload. `operation` names the call
    /// in the error when the payload carries no id.
    pub fn from_payload(
        kind: ResourceKind,
        name: &str,
        resource_group: &str,
        payload: Option<Value>,
        operation: &str,
    ) -> Result<Self> {
        let properties = payload.unwrap_or(Value::Null);
        let id = properties
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing_id(operation.to_string()))?
            .to_string();

        Ok(Self {
            kind,
            name: name.to_string(),
            resource_group: resource_group.to_string(),
            id,
            properties,
            related: Vec::new(),
        })
    }
}

/// What `get` returns for a stack
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StackArtifact {
    Resource(ManagedResource),
    Kubeconfig(Kubeconfig),
}

/// Per-kind behaviour plugged into [`StackProvisioner`]
#[async_trait]
pub trait StackKind: Send + Sync {
    const STACK: StackType;

    /// Kind of the resource `get` reads
    const PRIMARY: ResourceKind;

    /// Kind-specific config checks on top of [`StackConfig`] validation
    fn validate(&self, config: &StackConfig) -> std::result::Result<(), ValidationError>;

    /// Ordered create-or-update calls for this stack
    fn create_steps(
        &self,
        config: &StackConfig,
        principal: &ServicePrincipal<'_>,
    ) -> std::result::Result<Vec<CreateStep>, ValidationError>;

    /// Name of the primary resource within the group
    fn primary_name(&self, config: &StackConfig) -> std::result::Result<String, ValidationError>;

    /// Read the stack back. Defaults to a GET of the primary resource.
    async fn get(
        &self,
        factory: &dyn ClientFactory,
        config: &StackConfig,
        group: &str,
        credentials: &AzureCredentials,
    ) -> Result<StackArtifact> {
        let name = self.primary_name(config)?;
        let client = factory
            .client_for(Self::PRIMARY, credentials, Some(group))
            .await?;
        let payload = client.get(&name).await?;
        let operation = format!("get {} '{}'", Self::PRIMARY, name);
        ManagedResource::from_payload(Self::PRIMARY, &name, group, Some(payload), &operation)
            .map(StackArtifact::Resource)
    }
}
