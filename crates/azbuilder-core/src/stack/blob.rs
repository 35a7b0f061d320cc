//! Blob storage account stack

use async_trait::async_trait;
use serde_json::json;

use super::{CreateStep, StackKind, StackType};
use crate::client::ResourceKind;
use crate::config::{ServicePrincipal, StackConfig, StorageProperties, Validate, ValidationError};

#[derive(Debug, Clone, Copy, Default)]
pub struct BlobStack;

impl BlobStack {
    fn properties(config: &StackConfig) -> StorageProperties {
        config.storage.clone().unwrap_or_default()
    }
}

#[async_trait]
impl StackKind for BlobStack {
    const STACK: StackType = StackType::Blob;
    const PRIMARY: ResourceKind = ResourceKind::StorageAccount;

    fn validate(&self, config: &StackConfig) -> Result<(), ValidationError> {
        Self::properties(config).validate()?;
        // A derived name can still be too short once punctuation is stripped
        let account = self.primary_name(config)?;
        if account.len() < 3 {
            return Err(ValidationError::invalid(
                "storage config",
                "accountName",
                format!(
                    "'{}' derived from the stack name is shorter than 3 characters",
                    account
                ),
            ));
        }
        Ok(())
    }

    fn create_steps(
        &self,
        config: &StackConfig,
        _principal: &ServicePrincipal<'_>,
    ) -> Result<Vec<CreateStep>, ValidationError> {
        let storage = Self::properties(config);
        let account = self.primary_name(config)?;

        Ok(vec![CreateStep::new(
            ResourceKind::StorageAccount,
            account,
            json!({
                "location": config.region()?,
                "sku": { "name": storage.sku },
                "kind": storage.kind,
                "properties": {
                    "accessTier": storage.access_tier,
                    "encryption": {
                        "services": {
                            "blob": { "enabled": true },
                            "file": { "enabled": true }
                        },
                        "keySource": "Microsoft.Storage"
                    }
                }
            }),
        )])
    }

    fn primary_name(&self, config: &StackConfig) -> Result<String, ValidationError> {
        Ok(Self::properties(config).account_name_for(config.name()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> ServicePrincipal<'static> {
        ServicePrincipal {
            client_id: "app-id",
            client_secret: "s3cret",
            subscription_id: "sub-123",
            tenant_id: None,
        }
    }

    #[test]
    fn test_storage_payload_defaults() {
        let config = StackConfig::new("demo-store", "westeurope");
        let steps = BlobStack.create_steps(&config, &principal()).unwrap();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "demostore");
        let body = &steps[0].properties;
        assert_eq!(body["sku"]["name"], "Standard_LRS");
        assert_eq!(body["kind"], "StorageV2");
        assert_eq!(body["properties"]["accessTier"], "Cool");
        assert_eq!(
            body["properties"]["encryption"]["keySource"],
            "Microsoft.Storage"
        );
        // The service principal never lands in a storage payload
        assert!(!body.to_string().contains("s3cret"));
    }

    #[test]
    fn test_short_derived_name_rejected() {
        let config = StackConfig::new("a-b", "eastus");
        let err = BlobStack.validate(&config).unwrap_err();
        assert_eq!(err.field, "accountName");
    }
}
