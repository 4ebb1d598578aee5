//! EngineRestClient - エンジンの external-task REST API
//!
//! - `POST {base}/external-task/fetchAndLock`
//! - `POST {base}/external-task/{id}/complete`
//! - `POST {base}/external-task/{id}/failure`
//!
//! すべて basic 認証。fetch は 60 秒、complete / failure は 30 秒でタイムアウト。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::app::retry::truncate_chars;
use crate::config::EngineConfig;
use crate::domain::{
    ExternalTask, FailureReport, TaskId, TaskSourceError, Variables, WorkerId,
};
use crate::ports::{FetchRequest, TaskSource};

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies are kept for logs, but not in full.
const MAX_ERROR_BODY_CHARS: usize = 1000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FetchAndLockBody<'a> {
    worker_id: &'a str,
    max_tasks: u32,
    use_priority: bool,
    topics: [TopicBody<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopicBody<'a> {
    topic_name: &'a str,
    lock_duration: u64,
}

impl<'a> FetchAndLockBody<'a> {
    pub(crate) fn new(request: &'a FetchRequest) -> Self {
        Self {
            worker_id: request.worker_id.as_str(),
            max_tasks: request.max_tasks,
            use_priority: true,
            topics: [TopicBody {
                topic_name: &request.topic,
                lock_duration: duration_ms(request.lock_duration),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompleteBody<'a> {
    worker_id: &'a str,
    variables: &'a Variables,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FailureBody<'a> {
    worker_id: &'a str,
    error_message: &'a str,
    error_details: &'a str,
    retries: u32,
    retry_timeout: u64,
}

impl<'a> FailureBody<'a> {
    pub(crate) fn new(worker_id: &'a WorkerId, report: &'a FailureReport) -> Self {
        Self {
            worker_id: worker_id.as_str(),
            error_message: &report.message,
            error_details: &report.details,
            retries: report.retries,
            retry_timeout: duration_ms(report.retry_timeout),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// HTTP implementation of [`TaskSource`].
#[derive(Debug, Clone)]
pub struct EngineRestClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl EngineRestClient {
    pub fn new(config: &EngineConfig) -> Result<Self, TaskSourceError> {
        let http = Client::builder().build()?;
        Ok(Self::with_client(http, config))
    }

    /// Use a preconfigured `reqwest::Client` (proxies, custom TLS, ...).
    pub fn with_client(http: Client, config: &EngineConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/external-task/{path}", self.base_url)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<String, TaskSourceError> {
        let response = self
            .http
            .post(self.url(path))
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(TaskSourceError::Status {
                status: status.as_u16(),
                body: truncate_chars(&text, MAX_ERROR_BODY_CHARS),
            })
        }
    }

    /// complete / failure 用: 404 は「task がもう無い」
    async fn resolve<B: Serialize + ?Sized>(
        &self,
        task_id: &TaskId,
        action: &str,
        body: &B,
    ) -> Result<(), TaskSourceError> {
        let path = format!("{}/{action}", task_id.as_str());
        match self.post(&path, body, RESOLVE_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err(TaskSourceError::Status { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Err(TaskSourceError::UnknownTask(task_id.clone()))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TaskSource for EngineRestClient {
    async fn fetch_and_lock(
        &self,
        request: &FetchRequest,
    ) -> Result<Vec<ExternalTask>, TaskSourceError> {
        let body = FetchAndLockBody::new(request);
        let text = self.post("fetchAndLock", &body, FETCH_TIMEOUT).await?;
        let tasks = decode_tasks(&text)?;
        debug!(topic = %request.topic, count = tasks.len(), "fetched tasks");
        Ok(tasks)
    }

    async fn complete(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        variables: &Variables,
    ) -> Result<(), TaskSourceError> {
        let body = CompleteBody {
            worker_id: worker_id.as_str(),
            variables,
        };
        self.resolve(task_id, "complete", &body).await
    }

    async fn report_failure(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        report: &FailureReport,
    ) -> Result<(), TaskSourceError> {
        self.resolve(task_id, "failure", &FailureBody::new(worker_id, report))
            .await
    }
}

/// 空レスポンスは空配列として扱う
pub(crate) fn decode_tasks(text: &str) -> Result<Vec<ExternalTask>, TaskSourceError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(text)?)
}
