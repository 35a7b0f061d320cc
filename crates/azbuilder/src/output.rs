//! Rendering command results as JSON, YAML or a table

use std::io::IsTerminal;

use comfy_table::Table;
use serde::Serialize;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};

impl OutputFormat {
    /// Pick a concrete format for `auto`
    pub fn resolve(self) -> Self {
        match self {
            OutputFormat::Auto if std::io::stdout().is_terminal() => OutputFormat::Table,
            OutputFormat::Auto => OutputFormat::Json,
            other => other,
        }
    }
}

pub fn print_output<T: Serialize>(data: T, format: OutputFormat) -> CliResult<()> {
    let value = serde_json::to_value(data).map_err(|e| CliError::OutputError {
        message: e.to_string(),
    })?;
    println!("{}", render(&value, format)?);
    Ok(())
}

fn render(value: &Value, format: OutputFormat) -> CliResult<String> {
    match format.resolve() {
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).map_err(|e| CliError::OutputError {
                message: e.to_string(),
            })
        }
        OutputFormat::Yaml => serde_yaml::to_string(value)
            .map(|s| s.trim_end().to_string())
            .map_err(|e| CliError::OutputError {
                message: e.to_string(),
            }),
        _ => Ok(render_table(value)),
    }
}

/// Objects become one `Key | Value` row per leaf, with nested keys dotted.
fn render_table(value: &Value) -> String {
    match value {
        Value::Object(_) => {
            let mut rows = Vec::new();
            flatten("", value, &mut rows);

            let mut table = Table::new();
            table.set_header(vec!["Key", "Value"]);
            for (key, val) in rows {
                table.add_row(vec![key, val]);
            }
            table.to_string()
        }
        _ => format_value(value),
    }
}

fn flatten(prefix: &str, value: &Value, rows: &mut Vec<(String, String)>) {
    match value {
        Value::Object(obj) if !obj.is_empty() => {
            for (key, val) in obj {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, val, rows);
            }
        }
        _ => rows.push((prefix.to_string(), format_value(value))),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(arr) if arr.iter().all(|v| !v.is_object() && !v.is_array()) => arr
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}
