//! TaskSource port - エンジンの lock ベース task キュー
//!
//! エンジンは唯一の直列化ポイント。1 task の lock 保持者は常に高々 1 人だが、
//! 実行は at-least-once（exactly-once ではない）。
//!
//! # 実装
//! - **EngineRestClient**: 本番用（HTTP/JSON）
//! - **InMemoryEngine**: テスト・demo 用の fake

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ExternalTask, FailureReport, TaskId, TaskSourceError, Variables, WorkerId};

/// Parameters of one fetch-and-lock call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub worker_id: WorkerId,
    pub topic: String,
    pub max_tasks: u32,
    pub lock_duration: Duration,
}

/// TaskSource は lock / fetch / complete / fail プロトコルの抽象
///
/// # 設計原則
/// - 返された task は `lock_duration` の間このワーカー専用
/// - 期限切れの task は誰にでも再配送される
/// - transport エラーは `TaskSourceError` で返し、task の失敗とは区別する
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Lock up to `max_tasks` tasks of one topic. May return an empty batch.
    async fn fetch_and_lock(&self, request: &FetchRequest)
    -> Result<Vec<ExternalTask>, TaskSourceError>;

    /// Release the lock and advance the process past this step.
    async fn complete(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        variables: &Variables,
    ) -> Result<(), TaskSourceError>;

    /// Report a failure. `report.retries == 0` raises an incident.
    async fn report_failure(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        report: &FailureReport,
    ) -> Result<(), TaskSourceError>;
}
