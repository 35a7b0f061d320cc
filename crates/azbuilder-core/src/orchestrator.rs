//! Per-command entry point
//!
//! Maps a [`StackType`] to its provisioner. Holds no state between calls;
//! everything a command needs is passed in explicitly.

use std::sync::Arc;

use crate::client::ClientFactory;
use crate::config::{AzureCredentials, GroupNaming, StackConfig, derive_resource_group_name};
use crate::error::Result;
use crate::progress::OperationWaiter;
use crate::stack::{
    BlobStack, ClusterStack, DatabaseStack, ManagedResource, StackArtifact, StackKind,
    StackProvisioner, StackType,
};

/// Dispatches create, get, delete and validate to the right stack kind
pub struct Orchestrator {
    factory: Arc<dyn ClientFactory>,
    waiter: OperationWaiter,
    naming: GroupNaming,
}

impl Orchestrator {
    pub fn new(factory: Arc<dyn ClientFactory>, waiter: OperationWaiter) -> Self {
        Self {
            factory,
            waiter,
            naming: derive_resource_group_name,
        }
    }

    #[must_use]
    pub fn with_naming(mut self, naming: GroupNaming) -> Self {
        self.naming = naming;
        self
    }

    fn provisioner<K: StackKind>(&self, kind: K) -> StackProvisioner<K> {
        StackProvisioner::new(kind, self.factory.clone(), self.waiter.clone())
            .with_naming(self.naming)
    }

    /// Check credentials and config without touching the network
    pub fn validate(
        &self,
        stack: StackType,
        config: &StackConfig,
        credentials: &AzureCredentials,
    ) -> Result<()> {
        match stack {
            StackType::Cluster => self.provisioner(ClusterStack).validate(config, credentials),
            StackType::Blob => self.provisioner(BlobStack).validate(config, credentials),
            StackType::Database => self.provisioner(DatabaseStack).validate(config, credentials),
        }
    }

    pub async fn create(
        &self,
        stack: StackType,
        config: &StackConfig,
        credentials: &AzureCredentials,
    ) -> Result<ManagedResource> {
        match stack {
            StackType::Cluster => self.provisioner(ClusterStack).create(config, credentials).await,
            StackType::Blob => self.provisioner(BlobStack).create(config, credentials).await,
            StackType::Database => {
                self.provisioner(DatabaseStack)
                    .create(config, credentials)
                    .await
            }
        }
    }

    pub async fn get(
        &self,
        stack: StackType,
        config: &StackConfig,
        credentials: &AzureCredentials,
    ) -> Result<StackArtifact> {
        match stack {
            StackType::Cluster => self.provisioner(ClusterStack).get(config, credentials).await,
            StackType::Blob => self.provisioner(BlobStack).get(config, credentials).await,
            StackType::Database => self.provisioner(DatabaseStack).get(config, credentials).await,
        }
    }

    pub async fn delete(
        &self,
        stack: StackType,
        config: &StackConfig,
        credentials: &AzureCredentials,
    ) -> Result<()> {
        match stack {
            StackType::Cluster => self.provisioner(ClusterStack).delete(config, credentials).await,
            StackType::Blob => self.provisioner(BlobStack).delete(config, credentials).await,
            StackType::Database => {
                self.provisioner(DatabaseStack)
                    .delete(config, credentials)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResourceKind;
    use crate::config::DatabaseProperties;
    use crate::error::Phase;
    use crate::progress::PollOptions;
    use crate::testing::{Call, FakeCloud, fake_credentials};
    use std::time::Duration;

    fn orchestrator(cloud: &FakeCloud) -> Orchestrator {
        Orchestrator::new(
            Arc::new(cloud.clone()),
            OperationWaiter::new(PollOptions::default().with_interval(Duration::from_millis(1))),
        )
    }

    #[tokio::test]
    async fn test_cluster_create_without_client_secret() {
        let cloud = FakeCloud::new();
        let mut credentials = fake_credentials();
        credentials.client_secret = None;

        let err = orchestrator(&cloud)
            .create(
                StackType::Cluster,
                &StackConfig::new("demo", "eastus"),
                &credentials,
            )
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(err.missing_field(), Some("clientSecret"));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blob_create_happy_path() {
        let cloud = FakeCloud::new();
        let resource = orchestrator(&cloud)
            .create(
                StackType::Blob,
                &StackConfig::new("demo", "eastus"),
                &fake_credentials(),
            )
            .await
            .unwrap();

        assert_eq!(resource.kind, ResourceKind::StorageAccount);
        assert!(!resource.id.is_empty());
        let creates: Vec<ResourceKind> = cloud
            .remote_calls()
            .iter()
            .map(Call::kind)
            .collect();
        assert_eq!(
            creates,
            vec![ResourceKind::ResourceGroup, ResourceKind::StorageAccount]
        );
    }

    #[tokio::test]
    async fn test_database_delete_is_a_single_group_delete() {
        let cloud = FakeCloud::new();
        let orchestrator = orchestrator(&cloud);
        let config = StackConfig::new("orders", "eastus")
            .with_database(DatabaseProperties::new("sqladmin", "pw"));

        orchestrator
            .create(StackType::Database, &config, &fake_credentials())
            .await
            .unwrap();
        let before = cloud.remote_calls().len();

        orchestrator
            .delete(StackType::Database, &config, &fake_credentials())
            .await
            .unwrap();

        let after: Vec<Call> = cloud.remote_calls().into_iter().skip(before).collect();
        assert_eq!(
            after,
            vec![Call::Delete {
                kind: ResourceKind::ResourceGroup,
                name: "orders-resource-group".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_validate_is_offline() {
        let cloud = FakeCloud::new();
        let err = orchestrator(&cloud)
            .validate(
                StackType::Database,
                &StackConfig::new("orders", "eastus"),
                &fake_credentials(),
            )
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Validate));
        assert_eq!(err.missing_field(), Some("database"));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_naming_strategy_reaches_provisioners() {
        fn shared(_: &str) -> String {
            "platform-shared".to_string()
        }
        let cloud = FakeCloud::new();
        orchestrator(&cloud)
            .with_naming(shared)
            .delete(
                StackType::Blob,
                &StackConfig::new("demo", "eastus"),
                &fake_credentials(),
            )
            .await
            .unwrap();

        assert!(cloud.calls().contains(&Call::Delete {
            kind: ResourceKind::ResourceGroup,
            name: "platform-shared".to_string(),
        }));
    }
}
