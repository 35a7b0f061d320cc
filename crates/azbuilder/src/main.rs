use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells};
use tracing::{debug, error, info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod error;
mod output;

use cli::{Cli, Commands};
use error::CliError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level
    init_tracing(cli.verbose);

    if let Err(e) = execute_command(&cli).await {
        e.print_diagnostic();
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    // Check for RUST_LOG env var first, then fall back to verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "azbuilder=warn,azbuilder_core=warn",
            1 => "azbuilder=info,azbuilder_core=info",
            2 => "azbuilder=debug,azbuilder_core=debug",
            _ => "azbuilder=trace,azbuilder_core=trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    debug!("Tracing initialized with verbosity level: {}", verbose);
}

async fn execute_command(cli: &Cli) -> Result<(), CliError> {
    trace!("Executing command: {:?}", cli.command);
    info!("Command: {}", format_command(&cli.command));

    let start = std::time::Instant::now();
    let result = match &cli.command {
        Commands::Create {
            stack,
            inputs,
            wait,
        } => commands::stack::create(*stack, inputs, wait, cli.output).await,
        Commands::Get {
            stack,
            inputs,
            kubeconfig_out,
        } => {
            commands::stack::get(*stack, inputs, kubeconfig_out.as_deref(), cli.output).await
        }
        Commands::Delete {
            stack,
            inputs,
            wait,
        } => commands::stack::delete(*stack, inputs, wait, cli.output).await,
        Commands::Validate { stack, inputs } => {
            commands::stack::validate(*stack, inputs, cli.output)
        }
        Commands::Completions { shell } => {
            debug!("Generating completions for {:?}", shell);
            generate_completions(*shell);
            Ok(())
        }
    };

    let duration = start.elapsed();
    match &result {
        Ok(_) => info!("Command completed successfully in {:?}", duration),
        Err(e) => error!("Command failed after {:?}: {}", duration, e),
    }

    result
}

fn generate_completions(shell: cli::Shell) {
    let mut cmd = cli::Cli::command();
    let name = cmd.get_name().to_string();

    match shell {
        cli::Shell::Bash => generate(shells::Bash, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Zsh => generate(shells::Zsh, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Fish => generate(shells::Fish, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, name, &mut std::io::stdout())
        }
        cli::Shell::Elvish => generate(shells::Elvish, &mut cmd, name, &mut std::io::stdout()),
    }
}

/// Format command for human-readable logging (file paths only, never contents)
fn format_command(command: &Commands) -> String {
    match command {
        Commands::Create { stack, inputs, .. } => {
            format!("create {} -c {}", stack, inputs.config.display())
        }
        Commands::Get { stack, inputs, .. } => {
            format!("get {} -c {}", stack, inputs.config.display())
        }
        Commands::Delete { stack, inputs, .. } => {
            format!("delete {} -c {}", stack, inputs.config.display())
        }
        Commands::Validate { stack, inputs } => {
            format!("validate {} -c {}", stack, inputs.config.display())
        }
        Commands::Completions { shell } => format!("completions {:?}", shell),
    }
}
