//! Waiting on long-running operations from the terminal
//!
//! Drives an indicatif spinner from the core's progress events and turns
//! Ctrl-C into cancellation of the current wait.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use azbuilder_core::progress::DEFAULT_POLL_INTERVAL;
use azbuilder_core::{
    CancelHandle, Cancellation, CoreError, OperationWaiter, PollOptions, ProgressCallback,
    ProgressEvent,
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::signal;
use tracing::warn;

use crate::cli::WaitArgs;

impl WaitArgs {
    pub fn poll_options(&self) -> PollOptions {
        let interval = match self.interval {
            0 => DEFAULT_POLL_INTERVAL,
            secs => Duration::from_secs(secs),
        };
        let options = PollOptions::default().with_interval(interval);
        match self.timeout {
            Some(secs) => options.with_deadline(Duration::from_secs(secs)),
            None => options,
        }
    }
}

/// Spinner plus cancellation for one command
pub struct WaitSession {
    spinner: ProgressBar,
    cancel: CancelHandle,
    waiter: OperationWaiter,
}

impl WaitSession {
    pub fn new(args: &WaitArgs) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));

        let (cancel, cancellation) = Cancellation::new();
        let waiter = OperationWaiter::new(args.poll_options())
            .with_cancellation(cancellation)
            .with_progress(spinner_callback(spinner.clone()));

        Self {
            spinner,
            cancel,
            waiter,
        }
    }

    pub fn waiter(&self) -> OperationWaiter {
        self.waiter.clone()
    }

    /// Run a stack command, cancelling its wait on Ctrl-C
    pub async fn run<T, F>(self, command: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, CoreError>>,
    {
        tokio::pin!(command);
        let result = tokio::select! {
            result = &mut command => result,
            Ok(()) = signal::ctrl_c() => {
                warn!("Interrupted, cancelling the current wait");
                self.spinner.set_message("Cancelling...");
                self.cancel.cancel();
                command.await
            }
        };
        self.spinner.finish_and_clear();
        result
    }
}

fn spinner_callback(spinner: ProgressBar) -> ProgressCallback {
    Arc::new(move |event: ProgressEvent| match &event {
        ProgressEvent::Completed { .. } => spinner.println(describe(&event)),
        ProgressEvent::Failed { .. } => spinner.println(describe(&event)),
        _ => spinner.set_message(describe(&event)),
    })
}

fn describe(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Started { operation } => format!("Waiting for {}", operation),
        ProgressEvent::Polling {
            operation,
            status,
            attempt,
            ..
        } => format!("{}: {} (poll {})", operation, status, attempt),
        ProgressEvent::Completed { operation, elapsed } => {
            format!("{} {} ({}s)", "✓".green(), operation, elapsed.as_secs())
        }
        ProgressEvent::Failed { operation, error } => {
            format!("{} {}: {}", "✗".red(), operation, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azbuilder_core::progress::DEFAULT_MAX_WAIT;

    #[test]
    fn test_timeout_becomes_deadline() {
        let options = WaitArgs {
            timeout: Some(90),
            interval: 5,
        }
        .poll_options();

        assert_eq!(options.interval, Duration::from_secs(5));
        assert_eq!(options.deadline, Some(Duration::from_secs(90)));
        assert_eq!(options.limit(), Duration::from_secs(90));
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let options = WaitArgs {
            timeout: None,
            interval: 0,
        }
        .poll_options();

        assert_eq!(options.interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(options.deadline, None);
        assert_eq!(options.limit(), DEFAULT_MAX_WAIT);
    }

    #[test]
    fn test_polling_message() {
        let message = describe(&ProgressEvent::Polling {
            operation: "create storage account 'demo'".to_string(),
            status: "InProgress".to_string(),
            attempt: 3,
            elapsed: Duration::from_secs(30),
        });
        assert_eq!(message, "create storage account 'demo': InProgress (poll 3)");
    }
}
