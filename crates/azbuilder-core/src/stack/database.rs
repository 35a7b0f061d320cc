//! SQL server + database stack
//!
//! The server is created first, then the database inside it. ARM addresses
//! the database as a child of the server (`{server}/databases/{db}`).

use async_trait::async_trait;
use serde_json::json;

use super::{CreateStep, StackKind, StackType};
use crate::client::ResourceKind;
use crate::config::{DatabaseProperties, ServicePrincipal, StackConfig, Validate, ValidationError};

#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseStack;

impl DatabaseStack {
    fn properties(config: &StackConfig) -> Result<&DatabaseProperties, ValidationError> {
        config
            .database
            .as_ref()
            .ok_or_else(|| ValidationError::missing("stack config", "database"))
    }
}

#[async_trait]
impl StackKind for DatabaseStack {
    const STACK: StackType = StackType::Database;
    const PRIMARY: ResourceKind = ResourceKind::SqlDatabase;

    fn validate(&self, config: &StackConfig) -> Result<(), ValidationError> {
        Self::properties(config)?.validate()
    }

    fn create_steps(
        &self,
        config: &StackConfig,
        _principal: &ServicePrincipal<'_>,
    ) -> Result<Vec<CreateStep>, ValidationError> {
        const SUBJECT: &str = "database config";
        let name = config.name()?;
        let region = config.region()?;
        let database = Self::properties(config)?;
        let server = database.server_name_for(name);

        let login = database
            .admin_login
            .as_deref()
            .ok_or_else(|| ValidationError::missing(SUBJECT, "adminLogin"))?;
        let password = database
            .admin_password
            .as_deref()
            .ok_or_else(|| ValidationError::missing(SUBJECT, "adminPassword"))?;

        Ok(vec![
            CreateStep::new(
                ResourceKind::SqlServer,
                server,
                json!({
                    "location": region,
                    "properties": {
                        "administratorLogin": login,
                        "administratorLoginPassword": password,
                        "version": "12.0"
                    }
                }),
            ),
            CreateStep::new(
                ResourceKind::SqlDatabase,
                self.primary_name(config)?,
                json!({
                    "location": region,
                    "properties": {
                        "readScale": "Disabled"
                    }
                }),
            ),
        ])
    }

    fn primary_name(&self, config: &StackConfig) -> Result<String, ValidationError> {
        let name = config.name()?;
        // `get` needs only the names, so a missing block falls back to defaults
        let database = config.database.clone().unwrap_or_default();
        Ok(format!(
            "{}/databases/{}",
            database.server_name_for(name),
            database.database_name_for(name)
        ))
    }
}
