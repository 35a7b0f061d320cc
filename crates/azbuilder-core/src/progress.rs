//! Progress tracking and polling for long-running operations
//!
//! Every create, update and delete issued by the core is funneled through
//! [`poll_operation`]. It polls an [`OperationHandle`] until the provider
//! reports a terminal state, sleeping once per attempt, and stops early when
//! the caller's deadline passes, the safety bound passes, or the caller
//! cancels. Cancelling or timing out does not retract the remote operation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::operation::{OperationHandle, OperationStatus};

/// Default time between polling attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Wall-clock bound applied even when the caller sets no deadline
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2 * 60 * 60);

/// Progress events emitted during long-running operations
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Waiting has started
    Started { operation: String },
    /// Polling iteration with current status
    Polling {
        operation: String,
        status: String,
        attempt: u32,
        elapsed: Duration,
    },
    /// Operation completed successfully
    Completed { operation: String, elapsed: Duration },
    /// Operation failed, timed out or was cancelled
    Failed { operation: String, error: String },
}

/// Callback type for progress updates
///
/// The CLI uses this to drive its spinner. Shared so one callback can
/// observe every operation in a stack command.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Bounds for a single wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Time between polling attempts when the provider suggests none
    pub interval: Duration,
    /// Caller-supplied deadline
    pub deadline: Option<Duration>,
    /// Safety bound applied regardless of `deadline`
    pub max_wait: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl PollOptions {
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// The effective bound: the deadline, capped by the safety bound
    pub fn limit(&self) -> Duration {
        self.deadline
            .map_or(self.max_wait, |deadline| deadline.min(self.max_wait))
    }
}

/// Caller-side cancellation signal, checked between polling attempts
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

/// Trigger side of a [`Cancellation`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// A connected signal and its trigger
    pub fn new() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, Self { rx: Some(rx) })
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolve once cancellation is requested; pends forever otherwise
    pub async fn cancelled(&self) {
        let Some(mut rx) = self.rx.clone() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Trigger dropped without firing
                return std::future::pending().await;
            }
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Poll an operation until completion
///
/// # Arguments
///
/// * `handle` - The operation to drive
/// * `options` - Interval, optional deadline and safety bound
/// * `cancel` - Caller cancellation signal
/// * `on_progress` - Optional callback for progress updates
///
/// # Returns
///
/// The resource produced by the operation (`None` for deletes), a
/// `ProviderOperation` error if the provider reported failure, or
/// `Timeout` / `Cancelled` if the wait ended first.
///
/// # Example
///
/// ```rust,ignore
/// use azbuilder_core::progress::{poll_operation, Cancellation, PollOptions};
/// use std::time::Duration;
///
/// let handle = client.create_or_update("demo", properties).await?;
/// let resource = poll_operation(
///     handle,
///     &PollOptions::default().with_deadline(Duration::from_secs(1800)),
///     &Cancellation::never(),
///     None,
/// )
/// .await?;
/// ```
pub async fn poll_operation(
    mut handle: Box<dyn OperationHandle>,
    options: &PollOptions,
    cancel: &Cancellation,
    on_progress: Option<&ProgressCallback>,
) -> Result<Option<Value>> {
    let operation = handle.describe().to_string();
    let start = Instant::now();
    let limit = options.limit();
    let mut attempt: u32 = 0;

    debug!("Waiting for {} (limit {:?})", operation, limit);
    emit(
        on_progress,
        ProgressEvent::Started {
            operation: operation.clone(),
        },
    );

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(&operation, on_progress));
        }

        attempt += 1;
        let status = handle.poll().await?;
        let elapsed = start.elapsed();

        match status {
            OperationStatus::Succeeded(resource) => {
                info!("{} succeeded after {:?}", operation, elapsed);
                emit(
                    on_progress,
                    ProgressEvent::Completed {
                        operation: operation.clone(),
                        elapsed,
                    },
                );
                return Ok(resource);
            }
            OperationStatus::Failed(source) => {
                warn!("{} failed: {}", operation, source);
                emit(
                    on_progress,
                    ProgressEvent::Failed {
                        operation: operation.clone(),
                        error: source.to_string(),
                    },
                );
                return Err(CoreError::ProviderOperation { operation, source });
            }
            OperationStatus::InProgress(_) => {
                let label = status.label().to_string();
                debug!("{}: {} (attempt {}, {:?})", operation, label, attempt, elapsed);
                emit(
                    on_progress,
                    ProgressEvent::Polling {
                        operation: operation.clone(),
                        status: label,
                        attempt,
                        elapsed,
                    },
                );
            }
        }

        let remaining = limit.saturating_sub(elapsed);
        if remaining.is_zero() {
            warn!("{} still running after {:?}, giving up", operation, elapsed);
            emit(
                on_progress,
                ProgressEvent::Failed {
                    operation: operation.clone(),
                    error: format!("timed out after {:?}", elapsed),
                },
            );
            return Err(CoreError::Timeout {
                operation,
                waited: elapsed,
            });
        }

        let wait = handle.retry_after().unwrap_or(options.interval).min(remaining);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(cancelled(&operation, on_progress));
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// Reusable wait settings shared by every operation in a command
#[derive(Clone, Default)]
pub struct OperationWaiter {
    pub options: PollOptions,
    pub cancel: Cancellation,
    pub on_progress: Option<ProgressCallback>,
}

impl OperationWaiter {
    pub fn new(options: PollOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Drive `handle` to completion with these settings
    pub async fn wait(&self, handle: Box<dyn OperationHandle>) -> Result<Option<Value>> {
        poll_operation(
            handle,
            &self.options,
            &self.cancel,
            self.on_progress.as_ref(),
        )
        .await
    }
}

fn cancelled(operation: &str, on_progress: Option<&ProgressCallback>) -> CoreError {
    warn!("{} cancelled; it may still complete remotely", operation);
    emit(
        on_progress,
        ProgressEvent::Failed {
            operation: operation.to_string(),
            error: "cancelled".to_string(),
        },
    );
    CoreError::Cancelled {
        operation: operation.to_string(),
    }
}

/// Helper to emit progress events
fn emit(callback: Option<&ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ProviderError;
    use crate::testing::ScriptedOperation;
    use serde_json::json;
    use std::sync::Mutex;

    fn options() -> PollOptions {
        PollOptions::default().with_interval(Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_n_plus_one_polls() {
        let (op, polls) = ScriptedOperation::in_progress_then(
            "create managed cluster 'demo'",
            3,
            OperationStatus::Succeeded(Some(json!({"id": "/clusters/demo"}))),
        );

        let result = poll_operation(Box::new(op), &options(), &Cancellation::never(), None)
            .await
            .unwrap();

        assert_eq!(result, Some(json!({"id": "/clusters/demo"})));
        assert_eq!(polls.count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_returns_immediately() {
        let (op, polls) = ScriptedOperation::new(
            "create storage account 'demo'",
            vec![
                OperationStatus::Failed(ProviderError::new("StorageAccountAlreadyTaken", "taken")),
                OperationStatus::Succeeded(None),
            ],
        );

        let err = poll_operation(Box::new(op), &options(), &Cancellation::never(), None)
            .await
            .unwrap_err();

        assert_eq!(polls.count(), 1);
        match err {
            CoreError::ProviderOperation { operation, source } => {
                assert_eq!(operation, "create storage account 'demo'");
                assert_eq!(source.code, "StorageAccountAlreadyTaken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_shorter_than_polls_times_out() {
        let (op, polls) = ScriptedOperation::in_progress_then(
            "create managed cluster 'demo'",
            10,
            OperationStatus::Succeeded(None),
        );
        let opts = options().with_deadline(Duration::from_secs(25));

        let err = poll_operation(Box::new(op), &opts, &Cancellation::never(), None)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(!err.is_provider_failure());
        // t=0, 10, 20, then the final attempt at the 25s deadline
        assert_eq!(polls.count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_bound_applies_without_deadline() {
        let (op, _polls) = ScriptedOperation::in_progress_then(
            "delete resource group 'demo'",
            usize::MAX,
            OperationStatus::Succeeded(None),
        );
        let opts = options().with_max_wait(Duration::from_secs(60));

        let err = poll_operation(Box::new(op), &opts, &Cancellation::never(), None)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_attempts() {
        let (op, polls) = ScriptedOperation::in_progress_then(
            "delete resource group 'demo'",
            usize::MAX,
            OperationStatus::Succeeded(None),
        );
        let (trigger, cancel) = Cancellation::new();

        let waiter = tokio::spawn(async move {
            poll_operation(Box::new(op), &options(), &cancel, None).await
        });
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert_eq!(polls.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_never_polls() {
        let (op, polls) =
            ScriptedOperation::in_progress_then("x", 0, OperationStatus::Succeeded(None));
        let (trigger, cancel) = Cancellation::new();
        trigger.cancel();

        let err = poll_operation(Box::new(op), &options(), &cancel, None)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(polls.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_events_in_order() {
        let (op, _polls) = ScriptedOperation::in_progress_then(
            "create sql server 'demo'",
            2,
            OperationStatus::Succeeded(None),
        );
        let events: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = events.clone();
        let callback: ProgressCallback = Arc::new(move |event| {
            let tag = match event {
                ProgressEvent::Started { .. } => "started".to_string(),
                ProgressEvent::Polling { attempt, .. } => format!("polling-{}", attempt),
                ProgressEvent::Completed { .. } => "completed".to_string(),
                ProgressEvent::Failed { .. } => "failed".to_string(),
            };
            sink.lock().unwrap().push(tag);
        });

        let waiter = OperationWaiter::new(options()).with_progress(callback);
        waiter.wait(Box::new(op)).await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["started", "polling-1", "polling-2", "completed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_events_carry_status_label() {
        let (op, _polls) = ScriptedOperation::new(
            "create managed cluster 'demo'",
            vec![
                OperationStatus::InProgress(None),
                OperationStatus::InProgress(Some("Creating".to_string())),
                OperationStatus::Succeeded(None),
            ],
        );
        let statuses: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = statuses.clone();
        let callback: ProgressCallback = Arc::new(move |event| {
            if let ProgressEvent::Polling { status, .. } = event {
                sink.lock().unwrap().push(status);
            }
        });

        let waiter = OperationWaiter::new(options()).with_progress(callback);
        waiter.wait(Box::new(op)).await.unwrap();

        assert_eq!(*statuses.lock().unwrap(), vec!["InProgress", "Creating"]);
    }

    #[test]
    fn test_limit_caps_deadline() {
        let opts = PollOptions::default()
            .with_deadline(Duration::from_secs(10_000))
            .with_max_wait(Duration::from_secs(600));
        assert_eq!(opts.limit(), Duration::from_secs(600));
        assert_eq!(PollOptions::default().limit(), DEFAULT_MAX_WAIT);
    }
}
