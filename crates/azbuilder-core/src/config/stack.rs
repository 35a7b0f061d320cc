//! Resource stack configuration
//!
//! A [`StackConfig`] describes one stack: its name, region, the resource
//! group that scopes it, and the kind-specific property blocks. The same
//! config shape serves every stack kind; provisioners only read the block
//! they need.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::validate::{Validate, ValidationError, require};

const SUBJECT: &str = "stack config";

/// Pure function deriving a resource group name from a stack name
pub type GroupNaming = fn(&str) -> String;

/// Default naming strategy: `<name>-resource-group`
pub fn derive_resource_group_name(name: &str) -> String {
    format!("{}-resource-group", name)
}

/// Desired state of one stack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "location")]
    pub region: Option<String>,
    /// Explicit resource group; derived from `name` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseProperties>,
}

impl StackConfig {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            region: Some(region.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_resource_group(mut self, group: impl Into<String>) -> Self {
        self.resource_group = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_cluster(mut self, cluster: ClusterProperties) -> Self {
        self.cluster = Some(cluster);
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: StorageProperties) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: DatabaseProperties) -> Self {
        self.database = Some(database);
        self
    }

    pub fn name(&self) -> Result<&str, ValidationError> {
        require(SUBJECT, "name", self.name.as_ref())
    }

    pub fn region(&self) -> Result<&str, ValidationError> {
        require(SUBJECT, "region", self.region.as_ref())
    }

    /// Resolve the scoping group: the explicit group if set, otherwise
    /// `naming(name)`. Create and delete both go through here.
    pub fn resource_group_name(&self, naming: GroupNaming) -> Result<String, ValidationError> {
        match &self.resource_group {
            Some(group) => require(SUBJECT, "resourceGroup", Some(group)).map(str::to_string),
            None => self.name().map(naming),
        }
    }
}

impl Validate for StackConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        self.name()?;
        self.region()?;
        self.resource_group_name(derive_resource_group_name)?;
        if let Some(cluster) = &self.cluster {
            cluster.validate()?;
        }
        if let Some(storage) = &self.storage {
            storage.validate()?;
        }
        if let Some(database) = &self.database {
            database.validate()?;
        }
        Ok(())
    }
}

// =============================================================================
// Managed cluster
// =============================================================================

/// Managed Kubernetes cluster settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProperties {
    /// DNS prefix for the API server; defaults to `<name>-dns`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub node_pool: NodePoolProperties,
}

/// System node pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolProperties {
    #[serde(default = "default_pool_name")]
    pub name: String,
    #[serde(default = "default_vm_size")]
    pub vm_size: String,
    #[serde(default = "default_node_count")]
    pub count: u32,
    #[serde(default = "default_max_pods")]
    pub max_pods: u32,
    #[serde(default = "default_true")]
    pub enable_auto_scaling: bool,
    #[serde(default = "default_node_count")]
    pub min_count: u32,
    #[serde(default = "default_max_count")]
    pub max_count: u32,
}

impl Default for NodePoolProperties {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            vm_size: default_vm_size(),
            count: default_node_count(),
            max_pods: default_max_pods(),
            enable_auto_scaling: true,
            min_count: default_node_count(),
            max_count: default_max_count(),
        }
    }
}

impl ClusterProperties {
    /// DNS prefix for a cluster named `name`
    pub fn dns_prefix_for(&self, name: &str) -> String {
        self.dns_prefix
            .clone()
            .unwrap_or_else(|| format!("{}-dns", name))
    }
}

impl Validate for ClusterProperties {
    fn validate(&self) -> Result<(), ValidationError> {
        const SUBJECT: &str = "cluster config";
        let pool = &self.node_pool;

        // AKS node pool names: 1-12 lowercase alphanumerics, leading letter
        let valid_name = !pool.name.is_empty()
            && pool.name.len() <= 12
            && pool.name.starts_with(|c: char| c.is_ascii_lowercase())
            && pool
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !valid_name {
            return Err(ValidationError::invalid(
                SUBJECT,
                "nodePool.name",
                "must be 1-12 lowercase alphanumerics starting with a letter",
            ));
        }
        if pool.vm_size.trim().is_empty() {
            return Err(ValidationError::missing(SUBJECT, "nodePool.vmSize"));
        }
        if pool.count == 0 {
            return Err(ValidationError::invalid(
                SUBJECT,
                "nodePool.count",
                "must be at least 1",
            ));
        }
        if pool.enable_auto_scaling {
            if pool.min_count == 0 || pool.min_count > pool.max_count {
                return Err(ValidationError::invalid(
                    SUBJECT,
                    "nodePool.minCount",
                    format!(
                        "must be between 1 and maxCount ({})",
                        pool.max_count
                    ),
                ));
            }
            if pool.count < pool.min_count || pool.count > pool.max_count {
                return Err(ValidationError::invalid(
                    SUBJECT,
                    "nodePool.count",
                    format!(
                        "must be within minCount..maxCount ({}..{})",
                        pool.min_count, pool.max_count
                    ),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Storage account
// =============================================================================

/// Blob storage account settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProperties {
    /// Account name override; derived from the stack name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default = "default_sku")]
    pub sku: String,
    #[serde(default = "default_storage_kind")]
    pub kind: String,
    #[serde(default = "default_access_tier")]
    pub access_tier: String,
}

impl Default for StorageProperties {
    fn default() -> Self {
        Self {
            account_name: None,
            sku: default_sku(),
            kind: default_storage_kind(),
            access_tier: default_access_tier(),
        }
    }
}

impl StorageProperties {
    /// Storage account names are 3-24 lowercase alphanumerics, globally unique
    pub fn account_name_for(&self, stack_name: &str) -> String {
        match &self.account_name {
            Some(name) => name.clone(),
            None => stack_name
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_lowercase())
                .take(24)
                .collect(),
        }
    }
}

impl Validate for StorageProperties {
    fn validate(&self) -> Result<(), ValidationError> {
        const SUBJECT: &str = "storage config";
        if let Some(name) = &self.account_name {
            let valid = (3..=24).contains(&name.len())
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
            if !valid {
                return Err(ValidationError::invalid(
                    SUBJECT,
                    "accountName",
                    "must be 3-24 lowercase alphanumerics",
                ));
            }
        }
        if self.sku.trim().is_empty() {
            return Err(ValidationError::missing(SUBJECT, "sku"));
        }
        if self.kind.trim().is_empty() {
            return Err(ValidationError::missing(SUBJECT, "kind"));
        }
        Ok(())
    }
}

// =============================================================================
// SQL server + database
// =============================================================================

/// Environment variable consulted when `adminPassword` is absent
pub const ENV_SQL_ADMIN_PASSWORD: &str = "AZBUILDER_SQL_ADMIN_PASSWORD";

/// SQL server and database settings
#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseProperties {
    /// Server name; defaults to the stack name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// Database name; defaults to the stack name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default)]
    pub admin_login: Option<String>,
    #[serde(default, skip_serializing)]
    pub admin_password: Option<String>,
}

impl DatabaseProperties {
    pub fn new(admin_login: impl Into<String>, admin_password: impl Into<String>) -> Self {
        Self {
            admin_login: Some(admin_login.into()),
            admin_password: Some(admin_password.into()),
            ..Default::default()
        }
    }

    pub fn server_name_for<'a>(&'a self, stack_name: &'a str) -> &'a str {
        self.server_name.as_deref().unwrap_or(stack_name)
    }

    pub fn database_name_for<'a>(&'a self, stack_name: &'a str) -> &'a str {
        self.database_name.as_deref().unwrap_or(stack_name)
    }

    /// Fill `adminPassword` from a lookup (environment in production) when absent
    #[must_use]
    pub fn with_password_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.admin_password.is_none() {
            self.admin_password = lookup(ENV_SQL_ADMIN_PASSWORD);
        }
        self
    }
}

impl Validate for DatabaseProperties {
    fn validate(&self) -> Result<(), ValidationError> {
        const SUBJECT: &str = "database config";
        require(SUBJECT, "adminLogin", self.admin_login.as_ref())?;
        require(SUBJECT, "adminPassword", self.admin_password.as_ref())?;
        Ok(())
    }
}

impl fmt::Debug for DatabaseProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseProperties")
            .field("server_name", &self.server_name)
            .field("database_name", &self.database_name)
            .field("admin_login", &self.admin_login)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_pool_name() -> String {
    "agentpool".to_string()
}

fn default_vm_size() -> String {
    "Standard_DS2_v2".to_string()
}

fn default_node_count() -> u32 {
    1
}

fn default_max_pods() -> u32 {
    110
}

fn default_max_count() -> u32 {
    100
}

fn default_sku() -> String {
    "Standard_LRS".to_string()
}

fn default_storage_kind() -> String {
    "StorageV2".to_string()
}

fn default_access_tier() -> String {
    "Cool".to_string()
}
