//! The one provisioner shared by every stack kind

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{ManagedResource, StackArtifact, StackEvent, StackKind, StackState};
use crate::client::{ClientFactory, ResourceKind};
use crate::config::{
    AzureCredentials, GroupNaming, StackConfig, Validate, derive_resource_group_name,
};
use crate::error::{CoreError, Phase, PhaseContext, Result};
use crate::progress::OperationWaiter;
use crate::resource_group::ResourceGroupManager;

/// Creates, reads and deletes one kind of stack
pub struct StackProvisioner<K: StackKind> {
    kind: K,
    factory: Arc<dyn ClientFactory>,
    groups: ResourceGroupManager,
    waiter: OperationWaiter,
    naming: GroupNaming,
}

impl<K: StackKind> StackProvisioner<K> {
    pub fn new(kind: K, factory: Arc<dyn ClientFactory>, waiter: OperationWaiter) -> Self {
        Self {
            kind,
            groups: ResourceGroupManager::new(factory.clone(), waiter.clone()),
            factory,
            waiter,
            naming: derive_resource_group_name,
        }
    }

    /// Replace the `<name>-resource-group` naming strategy
    #[must_use]
    pub fn with_naming(mut self, naming: GroupNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Offline checks run before `create`: credentials, config, kind block
    pub fn validate(&self, config: &StackConfig, credentials: &AzureCredentials) -> Result<()> {
        credentials.validate().in_phase(Phase::Validate)?;
        config.validate().in_phase(Phase::Validate)?;
        self.kind.validate(config).in_phase(Phase::Validate)?;
        Ok(())
    }

    /// Ensure the group, then issue every create step in order, waiting for
    /// each before the next. The first failure stops the run; the group and
    /// anything already created are left in place.
    pub async fn create(
        &self,
        config: &StackConfig,
        credentials: &AzureCredentials,
    ) -> Result<ManagedResource> {
        self.validate(config, credentials)?;
        let principal = credentials.validated().in_phase(Phase::Validate)?;
        let steps = self
            .kind
            .create_steps(config, &principal)
            .in_phase(Phase::Validate)?;
        let region = config.region().in_phase(Phase::Validate)?;
        let group = config
            .resource_group_name(self.naming)
            .in_phase(Phase::Validate)?;

        let mut state = self.advance(StackState::Unprovisioned, StackEvent::CreateRequested);
        info!("Creating {} stack in resource group '{}'", K::STACK, group);

        let result: Result<ManagedResource> = async {
            self.groups
                .ensure(&group, region, credentials)
                .await
                .in_phase(Phase::EnsureResourceGroup)?;

            let mut created: Vec<ManagedResource> = Vec::with_capacity(steps.len());
            for step in steps {
                let phase = Phase::Create(step.kind);
                let resource = self
                    .create_one(&group, step.kind, &step.name, step.properties, credentials)
                    .await
                    .in_phase(phase)?;
                created.push(resource);
            }

            // The last step is the stack's primary resource
            let mut primary = created.pop().ok_or_else(|| CoreError::NotFound {
                resource: format!("{} stack resources", K::STACK),
            })?;
            primary.related = created;
            Ok(primary)
        }
        .await;

        state = match &result {
            Ok(_) => self.advance(state, StackEvent::CreateSucceeded),
            Err(_) => self.advance(state, StackEvent::CreateFailed),
        };
        debug!("{} stack finished create in state {}", K::STACK, state);
        result
    }

    async fn create_one(
        &self,
        group: &str,
        kind: ResourceKind,
        name: &str,
        properties: serde_json::Value,
        credentials: &AzureCredentials,
    ) -> Result<ManagedResource> {
        let client = self
            .factory
            .client_for(kind, credentials, Some(group))
            .await?;

        info!("Creating {} '{}'", kind, name);
        let handle = client.create_or_update(name, properties).await?;
        let operation = handle.describe().to_string();
        let payload = self.waiter.wait(handle).await?;

        ManagedResource::from_payload(kind, name, group, payload, &operation)
    }

    /// Read the stack back from the provider
    pub async fn get(
        &self,
        config: &StackConfig,
        credentials: &AzureCredentials,
    ) -> Result<StackArtifact> {
        credentials.validate().in_phase(Phase::Validate)?;
        let group = config
            .resource_group_name(self.naming)
            .in_phase(Phase::Validate)?;

        self.kind
            .get(self.factory.as_ref(), config, &group, credentials)
            .await
            .in_phase(Phase::Get(K::PRIMARY))
    }

    /// Delete the stack's resource group and everything in it.
    /// Dependent resources are never deleted one by one.
    pub async fn delete(&self, config: &StackConfig, credentials: &AzureCredentials) -> Result<()> {
        credentials.validate().in_phase(Phase::Validate)?;
        let group = config
            .resource_group_name(self.naming)
            .in_phase(Phase::Validate)?;

        let state = self.advance(StackState::Provisioned, StackEvent::DeleteRequested);
        info!("Deleting {} stack (resource group '{}')", K::STACK, group);

        let result = self
            .groups
            .teardown(&group, credentials)
            .await
            .in_phase(Phase::Teardown);

        let event = if result.is_ok() {
            StackEvent::DeleteSucceeded
        } else {
            StackEvent::DeleteFailed
        };
        let state = self.advance(state, event);
        debug!("{} stack finished delete in state {}", K::STACK, state);
        result
    }

    fn advance(&self, from: StackState, event: StackEvent) -> StackState {
        match from.transition(event) {
            Some(to) => {
                debug!("{} stack: {} -> {}", K::STACK, from, to);
                to
            }
            None => {
                warn!("{} stack: ignoring {:?} in state {}", K::STACK, event, from);
                from
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseProperties;
    use crate::operation::ProviderError;
    use crate::progress::{Cancellation, PollOptions};
    use crate::stack::{BlobStack, ClusterStack, DatabaseStack};
    use crate::testing::{Call, FakeCloud, fake_credentials};
    use std::time::Duration;

    fn waiter() -> OperationWaiter {
        OperationWaiter::new(PollOptions::default().with_interval(Duration::from_millis(1)))
    }

    fn provisioner<K: StackKind>(kind: K, cloud: &FakeCloud) -> StackProvisioner<K> {
        StackProvisioner::new(kind, Arc::new(cloud.clone()), waiter())
    }

    fn position(calls: &[Call], wanted: &Call) -> usize {
        calls
            .iter()
            .position(|c| c == wanted)
            .unwrap_or_else(|| panic!("{wanted:?} not in {calls:?}"))
    }

    #[tokio::test]
    async fn test_group_completes_before_dependent_create() {
        let cloud = FakeCloud::new().with_pending_polls(2);
        let resource = provisioner(ClusterStack, &cloud)
            .create(&StackConfig::new("demo", "eastus"), &fake_credentials())
            .await
            .unwrap();

        assert_eq!(resource.kind, ResourceKind::ManagedCluster);
        assert_eq!(resource.resource_group, "demo-resource-group");
        assert!(resource.id.ends_with("/managedClusters/demo"));

        let calls = cloud.calls();
        let group_done = position(
            &calls,
            &Call::OperationCompleted {
                kind: ResourceKind::ResourceGroup,
                name: "demo-resource-group".to_string(),
            },
        );
        let cluster_started = position(
            &calls,
            &Call::CreateOrUpdate {
                kind: ResourceKind::ManagedCluster,
                name: "demo".to_string(),
            },
        );
        assert!(group_done < cluster_started);
    }

    #[tokio::test]
    async fn test_invalid_credentials_send_nothing() {
        let cloud = FakeCloud::new();
        let mut credentials = fake_credentials();
        credentials.client_secret = None;

        let err = provisioner(ClusterStack, &cloud)
            .create(&StackConfig::new("demo", "eastus"), &credentials)
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Validate));
        assert_eq!(err.missing_field(), Some("clientSecret"));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_region_sends_nothing() {
        let cloud = FakeCloud::new();
        let config = StackConfig {
            name: Some("demo".to_string()),
            ..Default::default()
        };

        let err = provisioner(BlobStack, &cloud)
            .create(&config, &fake_credentials())
            .await
            .unwrap_err();
        assert_eq!(err.missing_field(), Some("region"));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dependent_failure_leaves_group_in_place() {
        let cloud = FakeCloud::new().failing(
            ResourceKind::StorageAccount,
            ProviderError::new("StorageAccountAlreadyTaken", "The storage account named demo is already taken."),
        );

        let err = provisioner(BlobStack, &cloud)
            .create(&StackConfig::new("demo", "eastus"), &fake_credentials())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Create(ResourceKind::StorageAccount)));
        assert!(err.is_provider_failure());
        assert!(err.to_string().contains("StorageAccountAlreadyTaken"));
        assert!(
            cloud
                .resource(ResourceKind::ResourceGroup, None, "demo-resource-group")
                .is_some()
        );
        assert!(
            !cloud
                .calls()
                .iter()
                .any(|c| matches!(c, Call::Delete { .. }))
        );
    }

    #[tokio::test]
    async fn test_rejected_credentials_surface_as_construction_error() {
        let cloud = FakeCloud::new().rejecting_credentials();
        let err = provisioner(ClusterStack, &cloud)
            .create(&StackConfig::new("demo", "eastus"), &fake_credentials())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::EnsureResourceGroup));
        assert!(err.is_client_construction());
        assert!(cloud.remote_calls().is_empty());
    }

    #[tokio::test]
    async fn test_database_creates_server_then_database() {
        let cloud = FakeCloud::new();
        let config = StackConfig::new("orders", "eastus")
            .with_database(DatabaseProperties::new("sqladmin", "P@ssw0rd!"));

        let resource = provisioner(DatabaseStack, &cloud)
            .create(&config, &fake_credentials())
            .await
            .unwrap();

        assert_eq!(resource.kind, ResourceKind::SqlDatabase);
        assert_eq!(resource.name, "orders/databases/orders");
        assert_eq!(resource.related.len(), 1);
        assert_eq!(resource.related[0].kind, ResourceKind::SqlServer);

        let creates: Vec<ResourceKind> = cloud
            .calls()
            .iter()
            .filter_map(|c| match c {
                Call::CreateOrUpdate { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            creates,
            vec![
                ResourceKind::ResourceGroup,
                ResourceKind::SqlServer,
                ResourceKind::SqlDatabase
            ]
        );
    }

    #[tokio::test]
    async fn test_server_failure_skips_database() {
        let cloud = FakeCloud::new().failing(
            ResourceKind::SqlServer,
            ProviderError::new("ServerNameAlreadyExists", "name in use"),
        );
        let config = StackConfig::new("orders", "eastus")
            .with_database(DatabaseProperties::new("sqladmin", "pw"));

        let err = provisioner(DatabaseStack, &cloud)
            .create(&config, &fake_credentials())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Create(ResourceKind::SqlServer)));
        assert!(
            !cloud
                .calls()
                .iter()
                .any(|c| c.kind() == ResourceKind::SqlDatabase)
        );
    }

    #[tokio::test]
    async fn test_delete_touches_only_the_group() {
        let cloud = FakeCloud::new();
        let config = StackConfig::new("demo", "eastus");
        let stack = provisioner(ClusterStack, &cloud);
        stack.create(&config, &fake_credentials()).await.unwrap();
        assert_eq!(cloud.resource_count(), 2);

        stack.delete(&config, &fake_credentials()).await.unwrap();

        let deletes: Vec<Call> = cloud
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Delete { .. }))
            .collect();
        assert_eq!(
            deletes,
            vec![Call::Delete {
                kind: ResourceKind::ResourceGroup,
                name: "demo-resource-group".to_string(),
            }]
        );
        assert_eq!(cloud.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_create_and_delete_derive_the_same_group() {
        fn custom(name: &str) -> String {
            format!("rg-{}-prod", name)
        }
        let cloud = FakeCloud::new();
        let config = StackConfig::new("demo", "eastus");
        let stack = provisioner(BlobStack, &cloud).with_naming(custom);

        let resource = stack.create(&config, &fake_credentials()).await.unwrap();
        assert_eq!(resource.resource_group, "rg-demo-prod");

        stack.delete(&config, &fake_credentials()).await.unwrap();
        assert!(cloud.calls().contains(&Call::Delete {
            kind: ResourceKind::ResourceGroup,
            name: "rg-demo-prod".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_cluster_get_returns_kubeconfig() {
        let cloud = FakeCloud::new();
        let config = StackConfig::new("demo", "eastus");
        let stack = provisioner(ClusterStack, &cloud);
        stack.create(&config, &fake_credentials()).await.unwrap();

        match stack.get(&config, &fake_credentials()).await.unwrap() {
            StackArtifact::Kubeconfig(kubeconfig) => {
                assert_eq!(kubeconfig.cluster, "demo");
                assert_eq!(kubeconfig.name, "clusterAdmin");
                assert_eq!(kubeconfig.value, crate::testing::FAKE_KUBECONFIG);
            }
            other => panic!("expected kubeconfig, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cluster_get_with_no_kubeconfigs_is_not_found() {
        let cloud = FakeCloud::new().with_empty_kubeconfigs();
        let config = StackConfig::new("demo", "eastus");
        let stack = provisioner(ClusterStack, &cloud);
        stack.create(&config, &fake_credentials()).await.unwrap();

        let err = stack.get(&config, &fake_credentials()).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.phase(), Some(Phase::Get(ResourceKind::ManagedCluster)));
    }

    #[tokio::test]
    async fn test_get_missing_blob_is_not_found() {
        let cloud = FakeCloud::new();
        let err = provisioner(BlobStack, &cloud)
            .get(&StackConfig::new("demo", "eastus"), &fake_credentials())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_group_creation() {
        let cloud = FakeCloud::new().with_pending_polls(usize::MAX);
        let (trigger, cancel) = Cancellation::new();
        let stack = StackProvisioner::new(
            ClusterStack,
            Arc::new(cloud.clone()),
            OperationWaiter::new(PollOptions::default()).with_cancellation(cancel),
        );

        let task = tokio::spawn(async move {
            stack
                .create(&StackConfig::new("demo", "eastus"), &fake_credentials())
                .await
        });
        tokio::time::sleep(Duration::from_secs(25)).await;
        trigger.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.phase(), Some(Phase::EnsureResourceGroup));
        assert!(
            !cloud
                .calls()
                .iter()
                .any(|c| c.kind() == ResourceKind::ManagedCluster)
        );
    }
}
