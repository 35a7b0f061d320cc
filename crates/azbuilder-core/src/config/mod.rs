//! Stack configuration, credentials and their validation
//!
//! Everything in this module is read-only after loading. Validation is pure:
//! it never touches the network and reports the first missing field in
//! declaration order, so error messages are stable.

pub mod credentials;
pub mod error;
pub mod loader;
pub mod stack;
pub mod validate;

// Re-export main types for convenience
pub use credentials::{AzureCredentials, ServicePrincipal};
pub use error::{ConfigError, Result};
pub use loader::{load_credentials, load_stack_config};
pub use stack::{
    ClusterProperties, DatabaseProperties, GroupNaming, NodePoolProperties, StackConfig,
    StorageProperties, derive_resource_group_name,
};
pub use validate::{Validate, ValidationError};
