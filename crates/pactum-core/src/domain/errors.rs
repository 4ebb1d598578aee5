//! Errors - エラー型と分類
//!
//! ErrorKind は「エンジンにどう報告するか」の分類。
//! - Transient / Infrastructure: retryable failure として報告（エンジンが再配送）
//! - Permanent: retries = 0 で報告（エンジンが incident を上げる）

use std::time::Duration;

use thiserror::Error;

use super::contract::ContractStatus;
use super::ids::{ContractId, TaskId};

/// ErrorKind は実行エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 一時的なエラー（deadline 超過、read-back 不一致など）
    Transient,
    /// 恒久的なエラー（入力不正、禁止された状態遷移）。リトライしても直らない
    Permanent,
    /// インフラエラー（DB 接続断など）
    Infrastructure,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Permanent)
    }
}

/// Bad or missing task variable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required variable '{name}'")]
    Missing { name: String },

    #[error("variable '{name}' has type {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: String,
    },

    #[error("variable '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },
}

/// Errors raised by a `ContractStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("contract {0} not found")]
    NotFound(ContractId),

    #[error("contract {contract_id}: status transition {from} -> {to} is not allowed")]
    Transition {
        contract_id: ContractId,
        from: ContractStatus,
        to: ContractStatus,
    },

    #[error("corrupt contract row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Database(_) => ErrorKind::Infrastructure,
            StoreError::NotFound(_) => ErrorKind::Transient,
            StoreError::Transition { .. } | StoreError::Corrupt(_) => ErrorKind::Permanent,
        }
    }
}

/// Everything a persistence adapter can fail with.
///
/// WorkerLoop はこれを全部ローカルで捕まえて RetryPolicy に渡す。
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid task variables: {0}")]
    Validation(#[from] ValidationError),

    #[error("persistence failed: {0}")]
    Persistence(#[source] StoreError),

    #[error("contract {contract_id}: status transition {from} -> {to} is not allowed")]
    Transition {
        contract_id: ContractId,
        from: ContractStatus,
        to: ContractStatus,
    },

    #[error("verification failed for contract {contract_id}: {reason}")]
    Verification {
        contract_id: ContractId,
        reason: String,
    },

    #[error("task exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Validation(_) | AdapterError::Transition { .. } => ErrorKind::Permanent,
            AdapterError::Persistence(e) => e.kind(),
            AdapterError::Verification { .. } | AdapterError::DeadlineExceeded(_) => {
                ErrorKind::Transient
            }
        }
    }

    /// Short, operator-facing summary (goes into the engine's `errorMessage`).
    pub fn summary(&self) -> &'static str {
        match self {
            AdapterError::Validation(_) => "invalid task variables",
            AdapterError::Persistence(_) => "contract store write failed",
            AdapterError::Transition { .. } => "contract status transition rejected",
            AdapterError::Verification { .. } => "contract write could not be verified",
            AdapterError::DeadlineExceeded(_) => "task deadline exceeded",
        }
    }
}

impl From<StoreError> for AdapterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transition {
                contract_id,
                from,
                to,
            } => AdapterError::Transition {
                contract_id,
                from,
                to,
            },
            other => AdapterError::Persistence(other),
        }
    }
}

/// Errors talking to the task source.
///
/// Transport / HTTP の失敗は task の失敗とは別物として扱う（loop レベルで処理）。
#[derive(Debug, Error)]
pub enum TaskSourceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode engine response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("task {0} is not locked by this worker")]
    LockNotHeld(TaskId),

    #[error("task {0} does not exist")]
    UnknownTask(TaskId),
}
