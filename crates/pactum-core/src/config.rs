//! Configuration - ワーカー 1 つ分の検証済み設定
//!
//! 値の読み込み（環境変数 / CLI フラグ）は CLI 側の clap が担当し、
//! ここでは「組み上がった設定が妥当か」だけを起動時に検証する（Fail-fast）。

use std::time::Duration;

use thiserror::Error;

use crate::app::retry::RetryPolicy;
use crate::domain::{TopicKind, WorkerId};

/// Invalid or missing configuration, raised at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}

/// Engine REST endpoint and credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// e.g. `http://camunda:8080/engine-rest`
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: "demo".into(),
            password: "demo".into(),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Missing("ENGINE_REST"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("ENGINE_REST", format!("'{url}' is not an http(s) URL")));
        }
        Ok(())
    }
}

// password をログに出さない
impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// PostgreSQL connection settings.
///
/// `url` があればそれを優先し、無ければ個別の host / port / ... から組み立てる。
#[derive(Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "postgres".into(),
            port: 5432,
            database: "camunda".into(),
            user: "camunda".into(),
            password: "camunda".into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(invalid("DATABASE_URL", "expected a postgres:// URL"));
            }
        } else if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("DB_HOST"));
        }
        if self.max_connections == 0 {
            return Err(invalid("DB_MAX_CONNECTIONS", "must be at least 1"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("url", &self.url.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Settings of one topic worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub kind: TopicKind,
    pub topic: String,
    pub worker_id: WorkerId,
    pub max_tasks: u32,
    pub lock_duration: Duration,
    pub poll_interval: Duration,
    pub loop_error_backoff: Duration,
    /// None → 80% of `lock_duration`
    pub task_deadline: Option<Duration>,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl WorkerConfig {
    /// Defaults for one kind of worker (topic name, generated worker id, ...).
    pub fn for_kind(kind: TopicKind) -> Self {
        Self {
            kind,
            topic: kind.default_topic().to_string(),
            worker_id: WorkerId::new(kind.default_worker_id()),
            max_tasks: 5,
            lock_duration: Duration::from_millis(60_000),
            poll_interval: Duration::from_secs_f64(2.0),
            loop_error_backoff: Duration::from_secs_f64(5.0),
            task_deadline: None,
            concurrency: 1,
            retry: RetryPolicy::default(),
        }
    }

    pub fn effective_deadline(&self) -> Duration {
        self.task_deadline
            .unwrap_or_else(|| self.lock_duration * 4 / 5)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::Missing("TOPIC_NAME"));
        }
        if self.worker_id.as_str().trim().is_empty() {
            return Err(ConfigError::Missing("WORKER_ID"));
        }
        if self.max_tasks == 0 {
            return Err(invalid("MAX_TASKS", "must be at least 1"));
        }
        if self.lock_duration.is_zero() {
            return Err(invalid("LOCK_DURATION_MS", "must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("POLL_SLEEP_SEC", "must be positive"));
        }
        // 0 だと engine 停止中に fetch を空回りする
        if self.loop_error_backoff.is_zero() {
            return Err(invalid("LOOP_ERROR_BACKOFF_SEC", "must be positive"));
        }
        if self.concurrency == 0 {
            return Err(invalid("WORKER_CONCURRENCY", "must be at least 1"));
        }
        if self.retry.max_retries == 0 {
            return Err(invalid("MAX_RETRIES", "must be at least 1"));
        }

        let deadline = self.effective_deadline();
        if deadline.is_zero() || deadline >= self.lock_duration {
            return Err(invalid(
                "TASK_DEADLINE_MS",
                format!(
                    "{}ms must be positive and shorter than the lock duration ({}ms)",
                    deadline.as_millis(),
                    self.lock_duration.as_millis()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployed_workers() {
        let cfg = WorkerConfig::for_kind(TopicKind::Approve);
        assert_eq!(cfg.topic, "store-contract");
        assert!(cfg.worker_id.as_str().starts_with("worker-approve-"));
        assert_eq!(cfg.max_tasks, 5);
        assert_eq!(cfg.lock_duration, Duration::from_secs(60));
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.effective_deadline(), Duration::from_secs(48));
        assert_eq!(cfg.retry.max_retries, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deadline_must_be_shorter_than_lock() {
        let mut cfg = WorkerConfig::for_kind(TopicKind::Create);
        cfg.task_deadline = Some(cfg.lock_duration);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { name: "TASK_DEADLINE_MS", .. })
        ));

        cfg.task_deadline = Some(Duration::ZERO);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mut cfg = WorkerConfig::for_kind(TopicKind::Reject);
        cfg.max_tasks = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { name: "MAX_TASKS", .. })
        ));

        let mut cfg = WorkerConfig::for_kind(TopicKind::Reject);
        cfg.concurrency = 0;
        assert!(cfg.validate().is_err());

        let cfg = WorkerConfig {
            loop_error_backoff: Duration::ZERO,
            ..WorkerConfig::for_kind(TopicKind::Create)
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { name: "LOOP_ERROR_BACKOFF_SEC", .. })
        ));
    }

    #[test]
    fn engine_url_is_required_and_http() {
        assert_eq!(
            EngineConfig::new("  ").validate(),
            Err(ConfigError::Missing("ENGINE_REST"))
        );
        assert!(EngineConfig::new("camunda:8080").validate().is_err());
        assert!(EngineConfig::new("http://camunda:8080/engine-rest").validate().is_ok());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let engine = EngineConfig::new("http://e").with_credentials("demo", "s3cret");
        assert!(!format!("{engine:?}").contains("s3cret"));

        let storage = StorageConfig {
            url: Some("postgres://u:s3cret@db/x".into()),
            ..StorageConfig::default()
        };
        assert!(!format!("{storage:?}").contains("s3cret"));
    }

    #[test]
    fn storage_requires_postgres_url_and_pool() {
        let mut storage = StorageConfig {
            url: Some("mysql://db".into()),
            ..StorageConfig::default()
        };
        assert!(storage.validate().is_err());

        storage.url = None;
        storage.max_connections = 0;
        assert!(storage.validate().is_err());

        storage.max_connections = 5;
        assert!(storage.validate().is_ok());
    }
}
