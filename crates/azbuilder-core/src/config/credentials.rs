//! Service principal credentials used to reach Azure Resource Manager
//!
//! Credentials are loaded once per command, validated before any client is
//! built, and never written back anywhere. Environment variables override
//! values from the credentials file:
//!
//! | field | variable |
//! |---|---|
//! | `clientId` | `AZURE_CLIENT_ID` |
//! | `clientSecret` | `AZURE_CLIENT_SECRET` |
//! | `subscriptionId` | `AZURE_SUBSCRIPTION_ID` |
//! | `tenantId` | `AZURE_TENANT_ID` |

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::validate::{Validate, ValidationError, require};

const SUBJECT: &str = "credentials config";

pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const ENV_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";

/// Credentials bundle as read from JSON (e.g. `az ad sp create-for-rbac` output)
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureCredentials {
    #[serde(default, alias = "appId")]
    pub client_id: Option<String>,
    #[serde(default, alias = "password")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default, alias = "tenant")]
    pub tenant_id: Option<String>,
}

/// Borrowed view of credentials that passed validation
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ServicePrincipal<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub subscription_id: &'a str,
    pub tenant_id: Option<&'a str>,
}

impl AzureCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            subscription_id: Some(subscription_id.into()),
            tenant_id: None,
        }
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Validate and borrow the required fields
    pub fn validated(&self) -> Result<ServicePrincipal<'_>, ValidationError> {
        let client_id = require(SUBJECT, "clientId", self.client_id.as_ref())?;
        let client_secret = require(SUBJECT, "clientSecret", self.client_secret.as_ref())?;
        let subscription_id = require(SUBJECT, "subscriptionId", self.subscription_id.as_ref())?;
        let tenant_id = self
            .tenant_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        Ok(ServicePrincipal {
            client_id,
            client_secret,
            subscription_id,
            tenant_id,
        })
    }

    /// Overlay `AZURE_*` environment variables on top of file values
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|var| env::var(var).ok())
    }

    /// Overlay values from an arbitrary lookup (environment in production)
    #[must_use]
    pub fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |var: &str, current: Option<String>| {
            lookup(var).filter(|v| !v.trim().is_empty()).or(current)
        };
        Self {
            client_id: pick(ENV_CLIENT_ID, self.client_id),
            client_secret: pick(ENV_CLIENT_SECRET, self.client_secret),
            subscription_id: pick(ENV_SUBSCRIPTION_ID, self.subscription_id),
            tenant_id: pick(ENV_TENANT_ID, self.tenant_id),
        }
    }
}

impl Validate for AzureCredentials {
    fn validate(&self) -> Result<(), ValidationError> {
        self.validated().map(|_| ())
    }
}

// Secrets never reach logs
impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl fmt::Debug for ServicePrincipal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}
