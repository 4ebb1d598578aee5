//! Outcome model: how a leased task is resolved.
//!
//! This module does not know about HTTP or storage. It only defines the shape
//! of what the worker tells the engine after running an adapter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::variables::Variables;

/// The engine-facing failure payload.
///
/// `message` / `details` are already truncated to the protocol limits
/// when built through `RetryPolicy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub message: String,
    pub details: String,
    pub retries: u32,
    pub retry_timeout: Duration,
}

impl FailureReport {
    /// retries = 0 → エンジンは再キューせず incident を上げる
    pub fn is_terminal(&self) -> bool {
        self.retries == 0
    }
}

/// What to do with a task once its adapter has run.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Complete(Variables),
    Fail(FailureReport),
}

/// Classification of a resolved (or unresolved) task, for reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Completed,
    FailedRetryable,
    FailedTerminal,
    /// complete / failure の送信自体が失敗した。lock 期限切れで再配送される
    Unresolved,
}

impl Resolution {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Resolution::Complete(_) => OutcomeKind::Completed,
            Resolution::Fail(r) if r.is_terminal() => OutcomeKind::FailedTerminal,
            Resolution::Fail(_) => OutcomeKind::FailedRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(retries: u32) -> FailureReport {
        FailureReport {
            message: "m".into(),
            details: "d".into(),
            retries,
            retry_timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn resolution_kinds() {
        assert_eq!(
            Resolution::Complete(Variables::new()).kind(),
            OutcomeKind::Completed
        );
        assert_eq!(
            Resolution::Fail(report(2)).kind(),
            OutcomeKind::FailedRetryable
        );
        assert_eq!(
            Resolution::Fail(report(0)).kind(),
            OutcomeKind::FailedTerminal
        );
    }

    #[test]
    fn outcome_kind_serializes_as_screaming_snake_case() {
        let s = serde_json::to_string(&OutcomeKind::FailedRetryable).unwrap();
        assert_eq!(s, "\"FAILED_RETRYABLE\"");
    }
}
