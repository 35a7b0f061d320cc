//! Reading stack configs and credentials from disk
//!
//! Files are decoded by extension: `.json` as JSON, anything else as YAML.
//! In stack configs, `${VAR}` and `${VAR:-default}` references inside string
//! values are expanded after parsing. Secrets are never expanded: the SQL
//! admin password and every credentials field are taken literally and have
//! their own environment variables instead.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use super::credentials::AzureCredentials;
use super::error::{ConfigError, Result};
use super::stack::StackConfig;

/// Keys whose values are taken literally
const LITERAL_KEYS: &[&str] = &["adminPassword"];

/// Load a stack config (YAML or JSON). The SQL admin password falls back to
/// `AZBUILDER_SQL_ADMIN_PASSWORD` when the file leaves it out.
pub fn load_stack_config(path: &Path) -> Result<StackConfig> {
    let mut config: StackConfig = load_document(path, true)?;
    config.database = config
        .database
        .map(|db| db.with_password_fallback(|var| std::env::var(var).ok()));
    Ok(config)
}

/// Load a credentials bundle and overlay `AZURE_*` environment variables
pub fn load_credentials(path: &Path) -> Result<AzureCredentials> {
    let credentials: AzureCredentials = load_document(path, false)?;
    Ok(credentials.with_env_overrides())
}

fn load_document<T: DeserializeOwned>(path: &Path, expand: bool) -> Result<T> {
    debug!("Loading {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        let json_error = |e| ConfigError::JsonError {
            path: path.display().to_string(),
            source: e,
        };
        let mut value: serde_json::Value = serde_json::from_str(&content).map_err(json_error)?;
        if expand {
            expand_json(&mut value);
        }
        serde_json::from_value(value).map_err(json_error)
    } else {
        let yaml_error = |e| ConfigError::YamlError {
            path: path.display().to_string(),
            source: e,
        };
        let mut value: serde_yaml::Value = serde_yaml::from_str(&content).map_err(yaml_error)?;
        if expand {
            expand_yaml(&mut value);
        }
        serde_yaml::from_value(value).map_err(yaml_error)
    }
}

fn expand_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(text) => *text = expand_env_vars(text),
        serde_json::Value::Array(items) => items.iter_mut().for_each(expand_json),
        serde_json::Value::Object(map) => map
            .iter_mut()
            .filter(|(key, _)| !LITERAL_KEYS.contains(&key.as_str()))
            .for_each(|(_, value)| expand_json(value)),
        _ => {}
    }
}

fn expand_yaml(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::String(text) => {
            let expanded = expand_env_vars(text);
            if expanded != *text {
                *value = yaml_scalar(expanded);
            }
        }
        serde_yaml::Value::Sequence(items) => items.iter_mut().for_each(expand_yaml),
        serde_yaml::Value::Mapping(map) => map
            .iter_mut()
            .filter(|(key, _)| !key.as_str().is_some_and(|key| LITERAL_KEYS.contains(&key)))
            .for_each(|(_, value)| expand_yaml(value)),
        _ => {}
    }
}

/// Re-type an expanded scalar so `count: ${NODE_COUNT}` still reads as a number
fn yaml_scalar(text: String) -> serde_yaml::Value {
    match serde_yaml::from_str::<serde_yaml::Value>(&text) {
        Ok(value @ (serde_yaml::Value::Number(_) | serde_yaml::Value::Bool(_))) => value,
        _ => serde_yaml::Value::String(text),
    }
}

/// Expand environment variables, leaving unknown ones untouched
fn expand_env_vars(content: &str) -> String {
    shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok()).to_string()
}
