//! Task state machine (as tracked by the engine).

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Available -> Locked -> Completed
/// - Locked -> FailedRetryable -> (retry timeout) Available -> Locked
/// - Locked -> FailedTerminal (incident)
/// - Locked -> (lock expired) Available
///
/// adapter 実行中かどうかはエンジンからは見えないので、その間も `Locked`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for a worker (fresh, expired lock, or retry timeout elapsed).
    Available,

    /// Leased to exactly one worker.
    Locked,

    /// Completed; the process token moved on.
    Completed,

    /// Failure reported with retries left; held back for the retry timeout.
    FailedRetryable,

    /// Retries exhausted; the engine raised an incident.
    FailedTerminal,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::FailedTerminal)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Available, Locked)
                | (Locked, Available)
                | (Locked, Completed)
                | (Locked, FailedRetryable)
                | (Locked, FailedTerminal)
                | (FailedRetryable, Available)
        )
    }
}
