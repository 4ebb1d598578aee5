//! InMemoryEngine - lock プロトコルの fake（テスト・demo 用）
//!
//! # 再現している挙動
//! - topic ごとに task を公開し、1 task の lock 保持者は高々 1 人
//! - lock 期限切れの task は誰にでも再配送される（at-least-once）
//! - failure 報告後は `retry_timeout` の間保留し、retries = 0 なら incident
//! - lock を持っていないワーカーからの complete / failure は拒否
//! - complete の変数は process instance の変数に merge され、後続 task に渡る
//!
//! 時刻は注入された Clock で判定するので、ManualClock で期限切れを再現できる。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    ExternalTask, FailureReport, ProcessInstanceId, TaskId, TaskSourceError, TaskState, Variables,
    WorkerId,
};
use crate::ports::{Clock, FetchRequest, SystemClock, TaskSource, UlidGenerator};

#[derive(Debug, Clone)]
struct Lock {
    worker_id: WorkerId,
    expires_at: DateTime<Utc>,
}

/// One task as the engine sees it.
#[derive(Debug, Clone)]
struct EngineTask {
    task: ExternalTask,
    state: TaskState,
    lock: Option<Lock>,
    /// FailedRetryable の task はこの時刻まで配送しない
    available_at: DateTime<Utc>,
    deliveries: u32,
}

impl EngineTask {
    fn set_state(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "{:?} -> {next:?}",
            self.state
        );
        self.state = next;
    }

    /// Expired lock or elapsed retry timeout → Available.
    fn release_if_due(&mut self, now: DateTime<Utc>) {
        match self.state {
            TaskState::Locked
                if self.lock.as_ref().is_some_and(|l| l.expires_at <= now) =>
            {
                self.lock = None;
                self.set_state(TaskState::Available);
            }
            TaskState::FailedRetryable if self.available_at <= now => {
                self.set_state(TaskState::Available);
            }
            _ => {}
        }
    }
}

/// A completion received by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRecord {
    pub task_id: TaskId,
    pub topic: String,
    pub worker_id: WorkerId,
    pub variables: Variables,
    pub at: DateTime<Utc>,
}

/// A failure report received by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub task_id: TaskId,
    pub topic: String,
    pub worker_id: WorkerId,
    pub report: FailureReport,
    pub at: DateTime<Utc>,
}

/// Raised when a task is failed with no retries left.
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub task_id: TaskId,
    pub topic: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct EngineState {
    tasks: HashMap<TaskId, EngineTask>,
    /// 公開順（fetch はこの順で返す）
    order: Vec<TaskId>,
    processes: HashMap<ProcessInstanceId, Variables>,
    completions: Vec<CompletionRecord>,
    failures: Vec<FailureRecord>,
    incidents: Vec<Incident>,
    /// 次の fetch をこの回数だけ失敗させる（transport 障害の再現）
    failing_fetches: u32,
}

impl EngineState {
    fn locked_by<'a>(
        &'a mut self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<&'a mut EngineTask, TaskSourceError> {
        let entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskSourceError::UnknownTask(task_id.clone()))?;
        entry.release_if_due(now);
        match &entry.lock {
            Some(lock) if &lock.worker_id == worker_id && entry.state == TaskState::Locked => {
                Ok(entry)
            }
            _ => Err(TaskSourceError::LockNotHeld(task_id.clone())),
        }
    }
}

/// In-memory implementation of [`TaskSource`].
#[derive(Clone)]
pub struct InMemoryEngine {
    state: Arc<Mutex<EngineState>>,
    clock: Arc<dyn Clock>,
    ids: Arc<UlidGenerator<Arc<dyn Clock>>>,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState::default())),
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }

    /// Publish a task with no process instance.
    pub async fn publish(&self, topic: &str, variables: Variables) -> TaskId {
        self.publish_task(topic, None, None, variables).await
    }

    /// Publish a task for a process instance.
    ///
    /// task の変数は「process instance の変数 + `variables`」になる。
    pub async fn publish_for(
        &self,
        topic: &str,
        process_instance: impl Into<ProcessInstanceId>,
        variables: Variables,
    ) -> TaskId {
        self.publish_task(topic, Some(process_instance.into()), None, variables)
            .await
    }

    pub async fn publish_task(
        &self,
        topic: &str,
        process_instance: Option<ProcessInstanceId>,
        business_key: Option<String>,
        variables: Variables,
    ) -> TaskId {
        let id = self.ids.generate_task_id();
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let mut merged = process_instance
            .as_ref()
            .and_then(|pi| state.processes.get(pi))
            .cloned()
            .unwrap_or_default();
        for (name, value) in variables.iter() {
            merged.insert(name.clone(), value.clone());
        }
        if let Some(pi) = &process_instance {
            state.processes.insert(pi.clone(), merged.clone());
        }

        let mut task = ExternalTask::new(id.clone(), merged);
        task.topic_name = Some(topic.to_string());
        task.process_instance_id = process_instance;
        task.business_key = business_key;

        state.tasks.insert(
            id.clone(),
            EngineTask {
                task,
                state: TaskState::Available,
                lock: None,
                available_at: now,
                deliveries: 0,
            },
        );
        state.order.push(id.clone());
        id
    }

    /// Make the next `n` fetches fail with HTTP 503.
    pub async fn fail_next_fetches(&self, n: u32) {
        self.state.lock().await.failing_fetches = n;
    }

    pub async fn task_state(&self, task_id: &TaskId) -> Option<TaskState> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let entry = state.tasks.get_mut(task_id)?;
        entry.release_if_due(now);
        Some(entry.state)
    }

    /// How many times the task has been handed to a worker.
    pub async fn deliveries(&self, task_id: &TaskId) -> u32 {
        let state = self.state.lock().await;
        state.tasks.get(task_id).map_or(0, |t| t.deliveries)
    }

    /// Retries value the engine currently holds for the task.
    pub async fn retries(&self, task_id: &TaskId) -> Option<u32> {
        let state = self.state.lock().await;
        state.tasks.get(task_id).and_then(|t| t.task.retries)
    }

    /// Tasks of `topic` that are neither completed nor in an incident.
    pub async fn open_tasks(&self, topic: &str) -> usize {
        let state = self.state.lock().await;
        state
            .tasks
            .values()
            .filter(|t| t.task.topic_name.as_deref() == Some(topic) && !t.state.is_terminal())
            .count()
    }

    pub async fn process_variables(&self, process_instance: &ProcessInstanceId) -> Option<Variables> {
        self.state.lock().await.processes.get(process_instance).cloned()
    }

    pub async fn completions(&self) -> Vec<CompletionRecord> {
        self.state.lock().await.completions.clone()
    }

    pub async fn failures(&self) -> Vec<FailureRecord> {
        self.state.lock().await.failures.clone()
    }

    pub async fn incidents(&self) -> Vec<Incident> {
        self.state.lock().await.incidents.clone()
    }
}

#[async_trait]
impl TaskSource for InMemoryEngine {
    async fn fetch_and_lock(
        &self,
        request: &FetchRequest,
    ) -> Result<Vec<ExternalTask>, TaskSourceError> {
        let now = self.clock.now();
        let lock_for = Duration::from_std(request.lock_duration).unwrap_or_else(|_| Duration::days(1));
        let mut state = self.state.lock().await;

        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(TaskSourceError::Status {
                status: 503,
                body: "engine unavailable".into(),
            });
        }

        let EngineState { tasks, order, .. } = &mut *state;
        let mut batch = Vec::new();
        for id in order.iter() {
            if batch.len() >= request.max_tasks as usize {
                break;
            }
            let Some(entry) = tasks.get_mut(id) else {
                continue;
            };
            if entry.task.topic_name.as_deref() != Some(request.topic.as_str()) {
                continue;
            }
            entry.release_if_due(now);
            if entry.state != TaskState::Available {
                continue;
            }

            let expires_at = now + lock_for;
            entry.set_state(TaskState::Locked);
            entry.lock = Some(Lock {
                worker_id: request.worker_id.clone(),
                expires_at,
            });
            entry.deliveries += 1;

            let mut task = entry.task.clone();
            task.worker_id = Some(request.worker_id.clone());
            task.lock_expiration_time = Some(expires_at.to_rfc3339());
            batch.push(task);
        }
        Ok(batch)
    }

    async fn complete(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        variables: &Variables,
    ) -> Result<(), TaskSourceError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let entry = state.locked_by(worker_id, task_id, now)?;
        entry.lock = None;
        entry.set_state(TaskState::Completed);
        let topic = entry.task.topic_name.clone().unwrap_or_default();
        let process_instance = entry.task.process_instance_id.clone();

        if let Some(pi) = process_instance {
            let process_vars = state.processes.entry(pi).or_default();
            for (name, value) in variables.iter() {
                process_vars.insert(name.clone(), value.clone());
            }
        }
        state.completions.push(CompletionRecord {
            task_id: task_id.clone(),
            topic,
            worker_id: worker_id.clone(),
            variables: variables.clone(),
            at: now,
        });
        Ok(())
    }

    async fn report_failure(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        report: &FailureReport,
    ) -> Result<(), TaskSourceError> {
        let now = self.clock.now();
        let hold_for = Duration::from_std(report.retry_timeout).unwrap_or_else(|_| Duration::days(1));
        let mut state = self.state.lock().await;

        let entry = state.locked_by(worker_id, task_id, now)?;
        entry.lock = None;
        entry.task.retries = Some(report.retries);
        let topic = entry.task.topic_name.clone().unwrap_or_default();

        if report.is_terminal() {
            entry.set_state(TaskState::FailedTerminal);
            state.incidents.push(Incident {
                task_id: task_id.clone(),
                topic: topic.clone(),
                message: report.message.clone(),
                at: now,
            });
        } else {
            entry.set_state(TaskState::FailedRetryable);
            entry.available_at = now + hold_for;
        }

        state.failures.push(FailureRecord {
            task_id: task_id.clone(),
            topic,
            worker_id: worker_id.clone(),
            report: report.clone(),
            at: now,
        });
        Ok(())
    }
}
