//! Managed Kubernetes cluster stack

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{CreateStep, StackArtifact, StackKind, StackType};
use crate::client::{ClientFactory, ResourceKind};
use crate::config::{
    AzureCredentials, ClusterProperties, ServicePrincipal, StackConfig, Validate, ValidationError,
};
use crate::error::{CoreError, Result};
use crate::operation::ProviderError;

const LIST_ADMIN_CREDENTIAL: &str = "listClusterAdminCredential";

/// Admin kubeconfig for a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Kubeconfig {
    pub cluster: String,
    pub name: String,
    /// Decoded kubeconfig YAML
    pub value: String,
}

#[derive(Deserialize)]
struct CredentialResults {
    #[serde(default)]
    kubeconfigs: Vec<CredentialResult>,
}

#[derive(Deserialize)]
struct CredentialResult {
    name: String,
    value: String,
}

/// AKS cluster with a single system node pool
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterStack;

impl ClusterStack {
    fn properties(config: &StackConfig) -> ClusterProperties {
        config.cluster.clone().unwrap_or_default()
    }
}

#[async_trait]
impl StackKind for ClusterStack {
    const STACK: StackType = StackType::Cluster;
    const PRIMARY: ResourceKind = ResourceKind::ManagedCluster;

    fn validate(&self, config: &StackConfig) -> std::result::Result<(), ValidationError> {
        Self::properties(config).validate()
    }

    fn create_steps(
        &self,
        config: &StackConfig,
        principal: &ServicePrincipal<'_>,
    ) -> std::result::Result<Vec<CreateStep>, ValidationError> {
        let name = config.name()?;
        let cluster = Self::properties(config);
        let pool = &cluster.node_pool;

        let mut agent_pool = json!({
            "name": pool.name,
            "count": pool.count,
            "vmSize": pool.vm_size,
            "maxPods": pool.max_pods,
            "osType": "Linux",
            "type": "VirtualMachineScaleSets",
            "mode": "System",
            "enableAutoScaling": pool.enable_auto_scaling,
        });
        if pool.enable_auto_scaling {
            agent_pool["minCount"] = json!(pool.min_count);
            agent_pool["maxCount"] = json!(pool.max_count);
        }

        let mut properties = json!({
            "dnsPrefix": cluster.dns_prefix_for(name),
            "agentPoolProfiles": [agent_pool],
            "servicePrincipalProfile": {
                "clientId": principal.client_id,
                "secret": principal.client_secret,
            },
        });
        if let Some(version) = &cluster.kubernetes_version {
            properties["kubernetesVersion"] = json!(version);
        }

        Ok(vec![CreateStep::new(
            ResourceKind::ManagedCluster,
            name,
            json!({
                "location": config.region()?,
                "properties": properties,
            }),
        )])
    }

    fn primary_name(&self, config: &StackConfig) -> std::result::Result<String, ValidationError> {
        config.name().map(str::to_string)
    }

    /// Fetch the cluster's admin kubeconfig
    async fn get(
        &self,
        factory: &dyn ClientFactory,
        config: &StackConfig,
        group: &str,
        credentials: &AzureCredentials,
    ) -> Result<StackArtifact> {
        let name = self.primary_name(config)?;
        let client = factory
            .client_for(ResourceKind::ManagedCluster, credentials, Some(group))
            .await?;

        let response = client.action(&name, LIST_ADMIN_CREDENTIAL).await?;
        let operation = format!("{} on managed cluster '{}'", LIST_ADMIN_CREDENTIAL, name);
        let results: CredentialResults = serde_json::from_value(response).map_err(|e| {
            CoreError::ProviderOperation {
                operation: operation.clone(),
                source: ProviderError::new("InvalidResponse", e.to_string()),
            }
        })?;

        let first = results
            .kubeconfigs
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound {
                resource: format!("admin kubeconfig for managed cluster '{}'", name),
            })?;
        debug!("Decoding kubeconfig '{}' for {}", first.name, name);

        let value = STANDARD
            .decode(first.value.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| CoreError::ProviderOperation {
                operation,
                source: ProviderError::new(
                    "InvalidKubeconfig",
                    "kubeconfig is not base64-encoded UTF-8",
                ),
            })?;

        Ok(StackArtifact::Kubeconfig(Kubeconfig {
            cluster: name,
            name: first.name,
            value,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn principal() -> ServicePrincipal<'static> {
        ServicePrincipal {
            client_id: "app-id",
            client_secret: "s3cret",
            subscription_id: "sub-123",
            tenant_id: None,
        }
    }

    #[test]
    fn test_default_cluster_payload() {
        let config = StackConfig::new("demo", "eastus");
        let steps = ClusterStack.create_steps(&config, &principal()).unwrap();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, ResourceKind::ManagedCluster);
        assert_eq!(steps[0].name, "demo");
        assert_eq!(
            steps[0].properties,
            json!({
                "location": "eastus",
                "properties": {
                    "dnsPrefix": "demo-dns",
                    "agentPoolProfiles": [{
                        "name": "agentpool",
                        "count": 1,
                        "vmSize": "Standard_DS2_v2",
                        "maxPods": 110,
                        "osType": "Linux",
                        "type": "VirtualMachineScaleSets",
                        "mode": "System",
                        "enableAutoScaling": true,
                        "minCount": 1,
                        "maxCount": 100
                    }],
                    "servicePrincipalProfile": {
                        "clientId": "app-id",
                        "secret": "s3cret"
                    }
                }
            })
        );
    }

    #[test]
    fn test_fixed_size_pool_omits_bounds() {
        let mut cluster = ClusterProperties {
            kubernetes_version: Some("1.29.2".to_string()),
            ..Default::default()
        };
        cluster.node_pool.enable_auto_scaling = false;
        cluster.node_pool.count = 3;
        let config = StackConfig::new("demo", "eastus").with_cluster(cluster);

        let steps = ClusterStack.create_steps(&config, &principal()).unwrap();
        let props = &steps[0].properties["properties"];
        assert_eq!(props["kubernetesVersion"], "1.29.2");
        assert_eq!(props["agentPoolProfiles"][0]["count"], 3);
        assert!(props["agentPoolProfiles"][0].get("minCount").is_none());
    }
}
