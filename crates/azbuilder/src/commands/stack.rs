//! `create`, `get`, `delete` and `validate`

use std::fs;
use std::path::Path;

use azbuilder_core::config::derive_resource_group_name;
use azbuilder_core::{CoreError, OperationWaiter, StackArtifact, StackConfig, StackType};
use serde::Serialize;
use tracing::{info, warn};

use super::wait::WaitSession;
use super::{load_inputs, orchestrator};
use crate::cli::{OutputFormat, StackInputs, WaitArgs};
use crate::error::{CliError, CliResult};
use crate::output::print_output;

/// Summary printed by commands that have no resource to show
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StackSummary<'a> {
    stack: StackType,
    name: &'a str,
    resource_group: String,
    status: &'static str,
}

impl<'a> StackSummary<'a> {
    fn new(stack: StackType, config: &'a StackConfig, status: &'static str) -> CliResult<Self> {
        let name = config.name().map_err(CoreError::from)?;
        let resource_group = config
            .resource_group_name(derive_resource_group_name)
            .map_err(CoreError::from)?;
        Ok(Self {
            stack,
            name,
            resource_group,
            status,
        })
    }
}

pub async fn create(
    stack: StackType,
    inputs: &StackInputs,
    wait: &WaitArgs,
    output: OutputFormat,
) -> CliResult<()> {
    let (config, credentials) = load_inputs(inputs)?;
    let session = WaitSession::new(wait);
    let orchestrator = orchestrator(session.waiter())?;

    info!("Creating {} stack from {}", stack, inputs.config.display());
    let resource = session
        .run(orchestrator.create(stack, &config, &credentials))
        .await?;
    print_output(&resource, output)
}

pub async fn get(
    stack: StackType,
    inputs: &StackInputs,
    kubeconfig_out: Option<&Path>,
    output: OutputFormat,
) -> CliResult<()> {
    let (config, credentials) = load_inputs(inputs)?;
    let orchestrator = orchestrator(OperationWaiter::default())?;
    let artifact = orchestrator.get(stack, &config, &credentials).await?;

    match (artifact, kubeconfig_out) {
        (StackArtifact::Kubeconfig(kubeconfig), Some(path)) => {
            write_private(path, &kubeconfig.value)?;
            eprintln!(
                "Wrote kubeconfig for cluster '{}' to {}",
                kubeconfig.cluster,
                path.display()
            );
            Ok(())
        }
        // A bare kubeconfig on stdout can be piped straight into a file
        (StackArtifact::Kubeconfig(kubeconfig), None) if output == OutputFormat::Auto => {
            print!("{}", kubeconfig.value);
            Ok(())
        }
        (artifact, out) => {
            if out.is_some() {
                warn!("--kubeconfig-out only applies to aks stacks; ignoring it");
            }
            print_output(&artifact, output)
        }
    }
}

pub async fn delete(
    stack: StackType,
    inputs: &StackInputs,
    wait: &WaitArgs,
    output: OutputFormat,
) -> CliResult<()> {
    let (config, credentials) = load_inputs(inputs)?;
    let session = WaitSession::new(wait);
    let orchestrator = orchestrator(session.waiter())?;

    info!("Deleting {} stack from {}", stack, inputs.config.display());
    session
        .run(orchestrator.delete(stack, &config, &credentials))
        .await?;
    print_output(StackSummary::new(stack, &config, "deleted")?, output)
}

pub fn validate(stack: StackType, inputs: &StackInputs, output: OutputFormat) -> CliResult<()> {
    let (config, credentials) = load_inputs(inputs)?;
    orchestrator(OperationWaiter::default())?.validate(stack, &config, &credentials)?;
    print_output(StackSummary::new(stack, &config, "valid")?, output)
}

/// Write a file readable only by the current user
fn write_private(path: &Path, contents: &str) -> CliResult<()> {
    let file_error = |e: std::io::Error| CliError::FileError {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(file_error)?;
    }
    fs::write(path, contents).map_err(file_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(file_error)?;
    }
    Ok(())
}
