//! Lifecycle of a stack within one command

use std::fmt;

/// Where a stack is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    Unprovisioned,
    Creating,
    Provisioned,
    CreateFailed,
    Deleting,
    DeleteFailed,
}

/// Input to [`StackState::transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEvent {
    CreateRequested,
    CreateSucceeded,
    CreateFailed,
    DeleteRequested,
    DeleteSucceeded,
    DeleteFailed,
}

impl StackState {
    /// Next state for `event`, or `None` if the transition is not allowed
    pub fn transition(self, event: StackEvent) -> Option<StackState> {
        use StackEvent as E;
        use StackState as S;

        match (self, event) {
            (S::Unprovisioned, E::CreateRequested) => Some(S::Creating),
            (S::Creating, E::CreateSucceeded) => Some(S::Provisioned),
            (S::Creating, E::CreateFailed) => Some(S::CreateFailed),
            (S::Provisioned, E::DeleteRequested) => Some(S::Deleting),
            (S::Deleting, E::DeleteSucceeded) => Some(S::Unprovisioned),
            (S::Deleting, E::DeleteFailed) => Some(S::DeleteFailed),
            _ => None,
        }
    }

    /// Failed states end the command
    pub fn is_failed(&self) -> bool {
        matches!(self, StackState::CreateFailed | StackState::DeleteFailed)
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StackState::Unprovisioned => "unprovisioned",
            StackState::Creating => "creating",
            StackState::Provisioned => "provisioned",
            StackState::CreateFailed => "create-failed",
            StackState::Deleting => "deleting",
            StackState::DeleteFailed => "delete-failed",
        };
        f.write_str(name)
    }
}
