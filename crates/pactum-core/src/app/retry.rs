//! RetryPolicy - 失敗をエンジンにどう報告するかを決める
//!
//! # 設計原則
//! - ワーカーは試行回数を数えない。残り回数はエンジンの `task.retries` が正本
//! - backoff もエンジン任せ（`retry_timeout` の間 task を保留してもらう）
//! - Permanent なエラーは retries = 0 で即 incident

use std::error::Error as _;
use std::time::Duration;

use crate::domain::{AdapterError, ExternalTask, FailureReport};

/// Engine limit for `errorMessage`.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 255;

/// Engine limit for `errorDetails`.
pub const MAX_ERROR_DETAILS_CHARS: usize = 4000;

/// Bounded-retry policy with engine-side backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per task, the first delivery included.
    pub max_retries: u32,

    /// How long the engine holds a failed task back before redelivering it.
    pub retry_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_timeout: Duration::from_millis(60_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_timeout: Duration) -> Self {
        Self {
            max_retries,
            retry_timeout,
        }
    }

    /// Retries to report for a retryable failure of `task`.
    ///
    /// - 初回（`task.retries` が null）→ `max_retries - 1`
    /// - 以降 → `task.retries - 1`（0 で止まる）
    ///
    /// `max_retries` 回目の failure 報告で 0 になり、エンジンが incident を上げる。
    pub fn remaining_after_failure(&self, task: &ExternalTask) -> u32 {
        task.retries
            .unwrap_or(self.max_retries)
            .saturating_sub(1)
    }

    /// Build the failure payload for `task` failing with `err`.
    pub fn report(&self, task: &ExternalTask, err: &AdapterError) -> FailureReport {
        let retries = if err.kind().is_retryable() {
            self.remaining_after_failure(task)
        } else {
            0
        };

        FailureReport {
            message: truncate_chars(&format!("{}: {err}", err.summary()), MAX_ERROR_MESSAGE_CHARS),
            details: truncate_chars(&error_chain(err), MAX_ERROR_DETAILS_CHARS),
            retries,
            retry_timeout: self.retry_timeout,
        }
    }
}

/// `err` and all of its sources, one per line.
fn error_chain(err: &AdapterError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Keep at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}
