//! Command implementations

pub mod stack;
pub mod wait;

use std::sync::Arc;

use azbuilder_core::{
    ArmClientFactory, AzureCredentials, OperationWaiter, Orchestrator, StackConfig,
    load_credentials, load_stack_config,
};
use tracing::debug;

use crate::cli::StackInputs;
use crate::error::CliResult;

/// Read the stack config and credentials named on the command line
pub(crate) fn load_inputs(inputs: &StackInputs) -> CliResult<(StackConfig, AzureCredentials)> {
    debug!(
        "Loading config {} and credentials {}",
        inputs.config.display(),
        inputs.credentials.display()
    );
    let config = load_stack_config(&inputs.config)?;
    let credentials = load_credentials(&inputs.credentials)?;
    Ok((config, credentials))
}

/// Orchestrator talking to Azure Resource Manager
pub(crate) fn orchestrator(waiter: OperationWaiter) -> CliResult<Orchestrator> {
    let factory = ArmClientFactory::from_env()?;
    Ok(Orchestrator::new(Arc::new(factory), waiter))
}
