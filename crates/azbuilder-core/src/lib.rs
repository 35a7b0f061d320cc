//! # azbuilder-core
//!
//! Dependency-ordered provisioning of Azure resource stacks.
//!
//! A stack is a managed Kubernetes cluster, a blob storage account or a SQL
//! server + database, always inside a resource group. Creating a stack
//! ensures the group first and then creates each resource in order, waiting
//! for every long-running operation to finish. Deleting a stack deletes the
//! group, which takes its dependents with it.
//!
//! ## Layers
//!
//! - [`config`] - stack configs, credentials and offline validation
//! - [`client`] - the seams the core talks through ([`ClientFactory`],
//!   [`ResourceClient`], [`CredentialProvider`])
//! - [`progress`] - [`poll_operation`], the single waiting primitive
//! - [`resource_group`] - group ensure and teardown
//! - [`stack`] - the generic [`StackProvisioner`] and the three stack kinds
//! - [`orchestrator`] - per-command dispatch on [`StackType`]
//! - [`arm`] - Azure Resource Manager implementation of the client seams
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use azbuilder_core::{
//!     ArmClientFactory, OperationWaiter, Orchestrator, PollOptions, StackType,
//!     load_credentials, load_stack_config,
//! };
//!
//! let config = load_stack_config("aks.yaml".as_ref())?;
//! let credentials = load_credentials("credentials.json".as_ref())?;
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(ArmClientFactory::from_env()?),
//!     OperationWaiter::new(PollOptions::default()),
//! );
//! let cluster = orchestrator
//!     .create(StackType::Cluster, &config, &credentials)
//!     .await?;
//! println!("created {}", cluster.id);
//! ```

pub mod arm;
pub mod client;
pub mod config;
pub mod error;
pub mod operation;
pub mod orchestrator;
pub mod progress;
pub mod resource_group;
pub mod stack;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export commonly used types
pub use arm::ArmClientFactory;
pub use client::{
    AccessToken, AuthError, ClientFactory, CredentialProvider, ResourceClient, ResourceKind,
};
pub use config::{
    AzureCredentials, ConfigError, StackConfig, Validate, ValidationError, load_credentials,
    load_stack_config,
};
pub use error::{CoreError, Phase, Result};
pub use operation::{OperationHandle, OperationStatus, ProviderError};
pub use orchestrator::Orchestrator;
pub use progress::{
    CancelHandle, Cancellation, OperationWaiter, PollOptions, ProgressCallback, ProgressEvent,
    poll_operation,
};
pub use resource_group::{ResourceGroup, ResourceGroupManager};
pub use stack::{
    BlobStack, ClusterStack, DatabaseStack, Kubeconfig, ManagedResource, StackArtifact,
    StackKind, StackProvisioner, StackType,
};
