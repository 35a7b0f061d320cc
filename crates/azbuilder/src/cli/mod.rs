//! CLI structure and command definitions
//!
//! Every stack command takes the stack kind as its first positional argument
//! and the two input files with `-c` / `-p`:
//!
//! ```text
//! azbuilder create aks -c aks.yaml -p credentials.json
//! ```

use std::path::PathBuf;

use azbuilder_core::StackType;
use clap::{Args, Parser, Subcommand};

/// Provision and tear down Azure resource stacks
#[derive(Parser, Debug)]
#[command(name = "azbuilder")]
#[command(
    version,
    about = "Provision and tear down Azure resource stacks (AKS, blob storage, SQL)"
)]
#[command(long_about = "
Provision and tear down Azure resource stacks (AKS, blob storage, SQL)

Each stack lives in its own resource group. Create ensures the group first,
then the stack's resources in order, waiting for every operation to finish.
Delete removes the whole group.

EXAMPLES:
    # Check a config without calling Azure
    azbuilder validate aks -c aks.yaml -p credentials.json

    # Create a managed Kubernetes cluster, giving up after 30 minutes
    azbuilder create aks -c aks.yaml -p credentials.json --timeout 1800

    # Fetch the admin kubeconfig
    azbuilder get aks -c aks.yaml -p credentials.json --kubeconfig-out ~/.kube/demo

    # Tear down a SQL stack
    azbuilder delete database -c sql.yaml -p credentials.json

Credentials can also come from AZURE_CLIENT_ID, AZURE_CLIENT_SECRET,
AZURE_SUBSCRIPTION_ID and AZURE_TENANT_ID.

For more help on a specific command, run:
    azbuilder <command> --help
")]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value = "auto")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Table on a terminal, JSON otherwise
    Auto,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Human-readable table format
    Table,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a stack and wait until it is provisioned
    Create {
        #[arg(value_enum)]
        stack: StackType,
        #[command(flatten)]
        inputs: StackInputs,
        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Read a stack back (the admin kubeconfig for aks)
    Get {
        #[arg(value_enum)]
        stack: StackType,
        #[command(flatten)]
        inputs: StackInputs,
        /// Write the kubeconfig to this file instead of printing it
        #[arg(long, value_name = "FILE")]
        kubeconfig_out: Option<PathBuf>,
    },

    /// Delete a stack by deleting its resource group
    #[command(visible_alias = "rm")]
    Delete {
        #[arg(value_enum)]
        stack: StackType,
        #[command(flatten)]
        inputs: StackInputs,
        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Check config and credentials without calling Azure
    Validate {
        #[arg(value_enum)]
        stack: StackType,
        #[command(flatten)]
        inputs: StackInputs,
    },

    /// Generate shell completions
    #[command(visible_alias = "comp")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// The two files every stack command reads
#[derive(Args, Debug, Clone)]
pub struct StackInputs {
    /// Stack config (YAML, or JSON by extension)
    #[arg(long, short = 'c', value_name = "FILE", env = "AZBUILDER_CONFIG")]
    pub config: PathBuf,

    /// Service principal credentials (JSON)
    #[arg(long = "credentials", short = 'p', value_name = "FILE", env = "AZBUILDER_CREDENTIALS")]
    pub credentials: PathBuf,
}

/// How long to wait on long-running operations
#[derive(Args, Debug, Clone)]
pub struct WaitArgs {
    /// Stop waiting after this many seconds (the operation keeps running in Azure)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Seconds between status polls
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    pub interval: u64,
}

/// Supported shells for completion generation
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bourne Again Shell
    Bash,
    /// Z Shell
    Zsh,
    /// Friendly Interactive Shell
    Fish,
    /// PowerShell
    #[value(name = "powershell", alias = "power-shell")]
    PowerShell,
    /// Elvish
    Elvish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_create_parses_wait_args() {
        let cli = Cli::try_parse_from([
            "azbuilder", "create", "aks", "-c", "aks.yaml", "-p", "creds.json", "--timeout", "60",
        ])
        .unwrap();

        match cli.command {
            Commands::Create { stack, inputs, wait } => {
                assert_eq!(stack, StackType::Cluster);
                assert_eq!(inputs.config, PathBuf::from("aks.yaml"));
                assert_eq!(wait.timeout, Some(60));
                assert_eq!(wait.interval, 10);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_stack_aliases() {
        let cli = Cli::try_parse_from([
            "azbuilder", "validate", "sql", "-c", "sql.yaml", "-p", "creds.json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Validate {
                stack: StackType::Database,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_stack_is_rejected() {
        let err = Cli::try_parse_from([
            "azbuilder", "create", "vm", "-c", "vm.yaml", "-p", "creds.json",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
