//! Error types for azbuilder
//!
//! Library errors are wrapped in [`CliError`] and rendered as cargo-style
//! diagnostics with tips on how to recover.

use azbuilder_core::config::credentials::{
    ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_SUBSCRIPTION_ID, ENV_TENANT_ID,
};
use azbuilder_core::config::stack::ENV_SQL_ADMIN_PASSWORD;
use azbuilder_core::{ConfigError, CoreError};
use colored::Colorize;
use thiserror::Error;

/// Cargo-style diagnostic formatter for CLI errors.
///
/// Produces structured output like:
/// ```text
/// error: validate: Validation error: could not find clientSecret in credentials config
///
///   tip: add clientSecret to the credentials file or export AZURE_CLIENT_SECRET
/// ```
pub struct CliDiagnostic {
    message: String,
    detail: Option<String>,
    tips: Vec<(String, Vec<String>)>,
}

impl CliDiagnostic {
    /// Start a new error diagnostic with the given message.
    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            detail: None,
            tips: Vec::new(),
        }
    }

    /// Add a detail line below the error message.
    pub fn detail(mut self, text: &str) -> Self {
        self.detail = Some(text.to_string());
        self
    }

    /// Add a tip with optional example commands.
    pub fn tip(mut self, description: &str, commands: &[&str]) -> Self {
        self.tips.push((
            description.to_string(),
            commands.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Render without colors
    #[cfg(test)]
    fn render_plain(&self) -> String {
        let mut out = format!("error: {}\n", self.message);
        if let Some(detail) = &self.detail {
            out.push_str(&format!("  {}\n", detail));
        }
        for (description, commands) in &self.tips {
            out.push_str(&format!("\n  tip: {}\n", description));
            for cmd in commands {
                out.push_str(&format!("      {}\n", cmd));
            }
        }
        out
    }

    /// Print the diagnostic to stderr with colored formatting.
    pub fn print(&self) {
        eprint!("{}{}", "error".red().bold(), ": ".bold());
        eprintln!("{}", self.message);

        if let Some(detail) = &self.detail {
            eprintln!("  {}", detail);
        }

        for (description, commands) in &self.tips {
            eprintln!();
            eprint!("  {}{}", "tip".yellow().bold(), ": ".bold());
            eprintln!("{}", description);
            for cmd in commands {
                eprintln!("      {}", cmd);
            }
        }
    }
}

/// Main error type for the azbuilder binary
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("File error for '{path}': {message}")]
    FileError { path: String, message: String },

    #[error("Output formatting error: {message}")]
    OutputError { message: String },
}

/// Result type for azbuilder commands
pub type CliResult<T> = std::result::Result<T, CliError>;

/// A recovery hint, optionally with commands to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub text: String,
    pub commands: Vec<&'static str>,
}

impl Suggestion {
    fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            commands: Vec::new(),
        }
    }

    fn with_command(mut self, command: &'static str) -> Self {
        self.commands.push(command);
        self
    }
}

/// Where a missing field can be supplied from
fn field_source(field: &str) -> String {
    let env = match field {
        "clientId" => Some(ENV_CLIENT_ID),
        "clientSecret" => Some(ENV_CLIENT_SECRET),
        "subscriptionId" => Some(ENV_SUBSCRIPTION_ID),
        "tenantId" => Some(ENV_TENANT_ID),
        "adminPassword" => Some(ENV_SQL_ADMIN_PASSWORD),
        _ => None,
    };
    match (field, env) {
        ("adminPassword", Some(var)) => {
            format!("add database.adminPassword to the stack config or export {}", var)
        }
        (_, Some(var)) => format!("add {} to the credentials file or export {}", field, var),
        ("cluster" | "storage" | "database", None) => {
            format!("add a '{}:' block to the stack config", field)
        }
        (_, None) => format!("add {} to the stack config", field),
    }
}

impl CliError {
    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<Suggestion> {
        match self {
            CliError::Config(ConfigError::LoadError { path, .. }) => vec![
                Suggestion::new(format!("Check that the file exists: {}", path)),
                Suggestion::new("Verify file permissions are correct"),
            ],
            CliError::Config(_) => vec![
                Suggestion::new("Stack configs are YAML (or JSON with a .json extension)"),
                Suggestion::new(
                    "Credentials files are JSON, e.g. the output of 'az ad sp create-for-rbac'",
                ),
            ],
            CliError::Core(err) => core_suggestions(err),
            CliError::FileError { path, .. } => vec![Suggestion::new(format!(
                "Check that the directory for {} exists and is writable",
                path
            ))],
            CliError::OutputError { .. } => vec![],
        }
    }

    /// Print a cargo-style diagnostic to stderr using colored formatting.
    pub fn print_diagnostic(&self) {
        self.diagnostic().print();
    }

    fn diagnostic(&self) -> CliDiagnostic {
        let mut diag = CliDiagnostic::error(&self.to_string());
        if let CliError::Core(err) = self
            && err.may_still_be_running()
        {
            diag = diag.detail("The operation may still be running in Azure.");
        }
        for suggestion in self.suggestions() {
            diag = diag.tip(&suggestion.text, &suggestion.commands);
        }
        diag
    }
}

fn core_suggestions(err: &CoreError) -> Vec<Suggestion> {
    if let Some(field) = err.missing_field() {
        return vec![Suggestion::new(field_source(field))];
    }
    if err.is_validation() {
        return vec![
            Suggestion::new("Fix the reported value and check the inputs again")
                .with_command("azbuilder validate <stack> -c <config> -p <credentials>"),
        ];
    }
    if err.is_forbidden() {
        return vec![
            Suggestion::new(
                "The service principal signed in but lacks permission; grant it a role such as Contributor on the subscription",
            )
            .with_command("az role assignment create --assignee <clientId> --role Contributor --scope /subscriptions/<subscriptionId>"),
        ];
    }
    if err.is_client_construction() {
        return vec![
            Suggestion::new("Check the service principal clientId and clientSecret"),
            Suggestion::new(format!(
                "Set tenantId in the credentials file or export {} if it is missing",
                ENV_TENANT_ID
            )),
        ];
    }
    if err.may_still_be_running() {
        return vec![
            Suggestion::new(
                "Re-run the same create to resume waiting; existing resources are updated in place",
            ),
            Suggestion::new("Inspect the resource group").with_command("az group show -n <group>"),
        ];
    }
    if err.is_not_found() {
        return vec![
            Suggestion::new("Create the stack first")
                .with_command("azbuilder create <stack> -c <config> -p <credentials>"),
        ];
    }
    if err.is_provider_failure() {
        return vec![
            Suggestion::new(
                "Resources created before the failure are kept; fix the error and re-run create",
            ),
            Suggestion::new("Remove everything")
                .with_command("azbuilder delete <stack> -c <config> -p <credentials>"),
        ];
    }
    Vec::new()
}
