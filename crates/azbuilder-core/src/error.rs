//! Unified error handling for azbuilder-core
//!
//! Every failure the core can produce is a [`CoreError`]. Stack provisioners
//! wrap failures in [`CoreError::Phase`] so callers see a single chain naming
//! the step that failed (validation, client construction, remote operation).
//!
//! # Example
//!
//! ```rust
//! use azbuilder_core::{AzureCredentials, CoreError, Validate};
//!
//! let credentials = AzureCredentials {
//!     client_id: Some("app".to_string()),
//!     client_secret: None,
//!     subscription_id: Some("sub".to_string()),
//!     tenant_id: None,
//! };
//!
//! let err: CoreError = credentials.validate().unwrap_err().into();
//! assert!(err.is_validation());
//! assert_eq!(err.missing_field(), Some("clientSecret"));
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::client::{AuthError, ResourceKind};
use crate::config::ValidationError;
use crate::operation::ProviderError;

/// Step of a stack command, attached to errors for user-facing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    EnsureResourceGroup,
    Create(ResourceKind),
    Get(ResourceKind),
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Validate => write!(f, "validate"),
            Phase::EnsureResourceGroup => write!(f, "ensure-resource-group"),
            Phase::Create(kind) => write!(f, "create {}", kind),
            Phase::Get(kind) => write!(f, "get {}", kind),
            Phase::Teardown => write!(f, "teardown"),
        }
    }
}

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing or malformed input, detected before any network call
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Credential rejection or transport failure while building a client
    #[error("Could not construct {kind} client: {source}")]
    ClientConstruction {
        kind: ResourceKind,
        #[source]
        source: AuthError,
    },

    /// The control plane reported a terminal failure for an operation
    #[error("{operation} failed: {source}")]
    ProviderOperation {
        operation: String,
        #[source]
        source: ProviderError,
    },

    /// The wait bound was reached; the remote operation may still be running
    #[error("{operation} timed out after {waited:?}")]
    Timeout { operation: String, waited: Duration },

    /// The caller cancelled the wait; the remote operation may still be running
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    /// A lookup found nothing where exactly one result was expected
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Request could not be sent or its response could not be read
    #[error("Request failed: {0}")]
    Transport(String),

    /// Failure annotated with the command phase it happened in. The phase is
    /// left out of the message when the inner message already starts with it.
    #[error("{}", phase_message(.phase, .source))]
    Phase {
        phase: Phase,
        #[source]
        source: Box<CoreError>,
    },
}

fn phase_message(phase: &Phase, source: &CoreError) -> String {
    let phase = phase.to_string();
    let message = source.to_string();
    if message.starts_with(&phase) {
        message
    } else {
        format!("{}: {}", phase, message)
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Annotate this error with a phase. Already annotated errors keep their
    /// innermost phase.
    #[must_use]
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            CoreError::Phase { .. } => self,
            other => CoreError::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The error with any phase annotation stripped
    #[must_use]
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    /// The phase this error was raised in, if annotated
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self {
            CoreError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Returns true if this is a validation error
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), CoreError::Validation(_))
    }

    /// Name of the missing or malformed field for validation errors
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        match self.root() {
            CoreError::Validation(err) => Some(err.field),
            _ => None,
        }
    }

    /// Returns true if this is a "not found" error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), CoreError::NotFound { .. })
    }

    /// Returns true if the wait bound was reached
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), CoreError::Timeout { .. })
    }

    /// Returns true if the caller cancelled the wait
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), CoreError::Cancelled { .. })
    }

    /// Returns true if the control plane reported a terminal failure
    #[must_use]
    pub fn is_provider_failure(&self) -> bool {
        matches!(self.root(), CoreError::ProviderOperation { .. })
    }

    /// Returns true if a client could not be constructed
    #[must_use]
    pub fn is_client_construction(&self) -> bool {
        matches!(self.root(), CoreError::ClientConstruction { .. })
    }

    /// Returns true if the caller is authenticated but not allowed to act
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self.root(),
            CoreError::ClientConstruction {
                source: AuthError::Forbidden(_),
                ..
            }
        )
    }

    /// Returns true if the remote operation may still be running
    #[must_use]
    pub fn may_still_be_running(&self) -> bool {
        self.is_timeout() || self.is_cancelled()
    }
}

/// Attach a [`Phase`] to the error side of a result
pub trait PhaseContext<T> {
    fn in_phase(self, phase: Phase) -> Result<T>;
}

impl<T, E: Into<CoreError>> PhaseContext<T> for std::result::Result<T, E> {
    fn in_phase(self, phase: Phase) -> Result<T> {
        self.map_err(|e| e.into().in_phase(phase))
    }
}
