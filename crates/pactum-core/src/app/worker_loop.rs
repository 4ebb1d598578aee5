//! WorkerLoop - 1 topic 分のポーリングループ
//!
//! # フロー（1 サイクル）
//! 1. TaskSource::fetch_and_lock() で最大 `max_tasks` 件を lock
//! 2. 空なら `poll_interval` 眠る（busy-spin しない）
//! 3. 各 task を adapter に通す（`concurrency` 件まで並行、deadline 付き）
//! 4. 成功 → complete / 失敗 → RetryPolicy 経由で report_failure
//! 5. fetch 自体の失敗 → ログを出して `loop_error_backoff` 眠り、続行
//!
//! 次の fetch の前に、取得した task はすべて complete か failure で解決済み。
//! 解決の送信に失敗した task は lock 期限切れでエンジンが再配送する。

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::status::{CycleReport, LoopStats};
use crate::adapters::PersistenceAdapter;
use crate::config::WorkerConfig;
use crate::domain::{AdapterError, ExternalTask, OutcomeKind, Resolution, TaskSourceError};
use crate::ports::{FetchRequest, TaskSource};

pub struct WorkerLoop {
    config: WorkerConfig,
    source: Arc<dyn TaskSource>,
    adapter: Arc<dyn PersistenceAdapter>,
    stats: Arc<LoopStats>,
}

impl WorkerLoop {
    pub fn new(
        config: WorkerConfig,
        source: Arc<dyn TaskSource>,
        adapter: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        Self {
            config,
            source,
            adapter,
            stats: Arc::new(LoopStats::default()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<LoopStats> {
        Arc::clone(&self.stats)
    }

    fn fetch_request(&self) -> FetchRequest {
        FetchRequest {
            worker_id: self.config.worker_id.clone(),
            topic: self.config.topic.clone(),
            max_tasks: self.config.max_tasks,
            lock_duration: self.config.lock_duration,
        }
    }

    /// Fetch one batch and resolve every task in it.
    ///
    /// Err は fetch の失敗だけ。task ごとの失敗は CycleReport に数えられる。
    pub async fn run_once(&self) -> Result<CycleReport, TaskSourceError> {
        let tasks = self.source.fetch_and_lock(&self.fetch_request()).await?;

        let mut report = CycleReport {
            fetched: tasks.len(),
            ..CycleReport::default()
        };
        if tasks.is_empty() {
            self.stats.record_cycle(&report);
            return Ok(report);
        }

        // task は所有して stream に渡す（借用の closure だと run() の future が Send にならない）
        let outcomes: Vec<OutcomeKind> = stream::iter(tasks)
            .map(|task| async move { self.process(&task).await })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            report.record(outcome);
        }

        self.stats.record_cycle(&report);
        Ok(report)
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped).
    ///
    /// shutdown 要求後は新しい batch を取らない。処理中の batch は最後まで解決する。
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            topic = %self.config.topic,
            worker_id = %self.config.worker_id,
            max_tasks = self.config.max_tasks,
            lock_ms = self.config.lock_duration.as_millis() as u64,
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.run_once().await {
                Ok(report) if report.is_idle() => Some(self.config.poll_interval),
                Ok(report) => {
                    debug!(topic = %self.config.topic, ?report, "cycle finished");
                    None
                }
                Err(err) => {
                    self.stats.record_fetch_error();
                    error!(
                        topic = %self.config.topic,
                        error = %err,
                        backoff_ms = self.config.loop_error_backoff.as_millis() as u64,
                        "fetch failed, backing off"
                    );
                    Some(self.config.loop_error_backoff)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            // sender が drop された = shutdown
                            break;
                        }
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!(topic = %self.config.topic, stats = ?self.stats.snapshot(), "worker stopped");
    }

    async fn process(&self, task: &ExternalTask) -> OutcomeKind {
        let span = info_span!(
            "task",
            task_id = %task.id,
            topic = %self.config.topic,
            process_instance_id = task.process_instance_id.as_ref().map(|p| p.as_str()),
        );
        async {
            let resolution = self.execute(task).await;
            self.resolve(task, resolution).await
        }
        .instrument(span)
        .await
    }

    /// Run the adapter under the per-task deadline and decide the resolution.
    async fn execute(&self, task: &ExternalTask) -> Resolution {
        let deadline = self.config.effective_deadline();
        let result = match tokio::time::timeout(deadline, self.adapter.apply(task)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::DeadlineExceeded(deadline)),
        };

        match result {
            Ok(variables) => Resolution::Complete(variables),
            Err(err) => {
                let report = self.config.retry.report(task, &err);
                if report.is_terminal() {
                    error!(error = %err, kind = ?err.kind(), "task failed, raising incident");
                } else {
                    warn!(
                        error = %err,
                        retries = report.retries,
                        retry_timeout_ms = report.retry_timeout.as_millis() as u64,
                        "task failed, engine will retry"
                    );
                }
                Resolution::Fail(report)
            }
        }
    }

    async fn resolve(&self, task: &ExternalTask, resolution: Resolution) -> OutcomeKind {
        let worker_id = &self.config.worker_id;
        let sent = match &resolution {
            Resolution::Complete(variables) => {
                self.source.complete(worker_id, &task.id, variables).await
            }
            Resolution::Fail(report) => {
                self.source.report_failure(worker_id, &task.id, report).await
            }
        };

        match sent {
            Ok(()) => {
                if matches!(resolution, Resolution::Complete(_)) {
                    info!("task completed");
                }
                resolution.kind()
            }
            Err(err) => {
                warn!(
                    error = %err,
                    outcome = ?resolution.kind(),
                    "could not resolve task, lock expiry will redeliver it"
                );
                OutcomeKind::Unresolved
            }
        }
    }
}
