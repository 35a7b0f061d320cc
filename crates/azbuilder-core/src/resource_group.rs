//! Resource group lifecycle
//!
//! The group is the unit of creation and teardown: it is ensured before any
//! dependent resource and deleting it removes every dependent with it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::client::{ClientFactory, ResourceKind};
use crate::config::AzureCredentials;
use crate::error::{CoreError, Result};
use crate::operation::ProviderError;
use crate::progress::OperationWaiter;

/// A provisioned resource group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceGroup {
    pub name: String,
    pub location: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

impl ResourceGroup {
    fn from_payload(name: &str, region: &str, payload: Option<Value>) -> Result<Self> {
        let payload = payload.unwrap_or(Value::Null);
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing_id(format!("create {} '{}'", ResourceKind::ResourceGroup, name)))?;

        Ok(Self {
            name: name.to_string(),
            location: payload
                .get("location")
                .and_then(Value::as_str)
                .unwrap_or(region)
                .to_string(),
            id: id.to_string(),
            provisioning_state: payload
                .pointer("/properties/provisioningState")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Error for an operation that succeeded without returning a resource id
pub(crate) fn missing_id(operation: String) -> CoreError {
    CoreError::ProviderOperation {
        operation,
        source: ProviderError::new(
            "MissingResourceId",
            "the operation succeeded but returned no resource id",
        ),
    }
}

/// Creates and deletes resource groups
#[derive(Clone)]
pub struct ResourceGroupManager {
    factory: Arc<dyn ClientFactory>,
    waiter: OperationWaiter,
}

impl ResourceGroupManager {
    pub fn new(factory: Arc<dyn ClientFactory>, waiter: OperationWaiter) -> Self {
        Self { factory, waiter }
    }

    /// Create or update the group in `region`. Safe to repeat.
    pub async fn ensure(
        &self,
        name: &str,
        region: &str,
        credentials: &AzureCredentials,
    ) -> Result<ResourceGroup> {
        let client = self
            .factory
            .client_for(ResourceKind::ResourceGroup, credentials, None)
            .await?;

        info!("Ensuring resource group '{}' in {}", name, region);
        let handle = client
            .create_or_update(name, json!({ "location": region }))
            .await?;
        let payload = self.waiter.wait(handle).await?;

        ResourceGroup::from_payload(name, region, payload)
    }

    /// Delete the group and everything in it, waiting for completion.
    /// A group that no longer exists counts as torn down.
    pub async fn teardown(&self, name: &str, credentials: &AzureCredentials) -> Result<()> {
        let client = self
            .factory
            .client_for(ResourceKind::ResourceGroup, credentials, None)
            .await?;

        info!("Deleting resource group '{}'", name);
        match client.delete(name).await {
            Ok(handle) => {
                self.waiter.wait(handle).await?;
                info!("Resource group '{}' deleted", name);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("Resource group '{}' does not exist, nothing to delete", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
