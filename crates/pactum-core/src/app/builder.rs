//! WorkerBuilder - 1 topic 分のワーカーの組み立て
//!
//! # Fail-fast 設計
//! - build() 時に設定を検証（ConfigError）
//! - TaskSource / ContractStore が無ければ BuildError
//! - 明示した adapter の種類と設定の種類が食い違えば BuildError

use std::sync::Arc;

use crate::adapters::{PersistenceAdapter, adapter_for};
use crate::app::worker_loop::WorkerLoop;
use crate::config::{ConfigError, WorkerConfig};
use crate::domain::TopicKind;
use crate::ports::{Clock, ContractIdGenerator, ContractStore, ProcessScopedIds, SystemClock, TaskSource};

/// BuildError はワーカー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task source configured")]
    MissingTaskSource,

    #[error("no contract store configured (needed to build the {0} adapter)")]
    MissingStore(TopicKind),

    #[error("adapter handles {adapter} tasks but the worker is configured for {configured}")]
    KindMismatch {
        configured: TopicKind,
        adapter: TopicKind,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// WorkerBuilder は WorkerLoop を構築
///
/// # 使用例
/// ```ignore
/// let worker = WorkerBuilder::new(WorkerConfig::for_kind(TopicKind::Approve))
///     .task_source(engine)
///     .store(store)
///     .build()?;
/// ```
pub struct WorkerBuilder {
    config: WorkerConfig,
    source: Option<Arc<dyn TaskSource>>,
    store: Option<Arc<dyn ContractStore>>,
    adapter: Option<Arc<dyn PersistenceAdapter>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn ContractIdGenerator>,
}

impl WorkerBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            source: None,
            store: None,
            adapter: None,
            clock: Arc::new(SystemClock),
            ids: Arc::new(ProcessScopedIds),
        }
    }

    pub fn task_source(mut self, source: Arc<dyn TaskSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn ContractStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom adapter instead of the standard one for the configured kind.
    pub fn adapter(mut self, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn contract_ids(mut self, ids: Arc<dyn ContractIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn build(self) -> Result<WorkerLoop, BuildError> {
        self.config.validate()?;
        let source = self.source.ok_or(BuildError::MissingTaskSource)?;
        let kind = self.config.kind;

        let adapter = match (self.adapter, self.store) {
            (Some(adapter), _) => {
                if adapter.kind() != kind {
                    return Err(BuildError::KindMismatch {
                        configured: kind,
                        adapter: adapter.kind(),
                    });
                }
                adapter
            }
            (None, Some(store)) => adapter_for(kind, store, self.clock, self.ids),
            (None, None) => return Err(BuildError::MissingStore(kind)),
        };

        Ok(WorkerLoop::new(self.config, source, adapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RejectContract;
    use crate::impls::{InMemoryContractStore, InMemoryEngine};

    fn engine() -> Arc<dyn TaskSource> {
        Arc::new(InMemoryEngine::new())
    }

    fn store() -> Arc<dyn ContractStore> {
        Arc::new(InMemoryContractStore::new())
    }

    #[test]
    fn build_success() {
        let worker = WorkerBuilder::new(WorkerConfig::for_kind(TopicKind::Create))
            .task_source(engine())
            .store(store())
            .build()
            .unwrap();
        assert_eq!(worker.config().topic, "store-create-contract");
    }

    #[test]
    fn build_missing_task_source() {
        let result = WorkerBuilder::new(WorkerConfig::for_kind(TopicKind::Create))
            .store(store())
            .build();
        assert!(matches!(result, Err(BuildError::MissingTaskSource)));
    }

    #[test]
    fn build_missing_store() {
        let result = WorkerBuilder::new(WorkerConfig::for_kind(TopicKind::Reject))
            .task_source(engine())
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingStore(TopicKind::Reject))
        ));
    }

    #[test]
    fn build_rejects_adapter_of_another_kind() {
        let adapter = Arc::new(RejectContract::new(store(), Arc::new(SystemClock)));
        let result = WorkerBuilder::new(WorkerConfig::for_kind(TopicKind::Approve))
            .task_source(engine())
            .adapter(adapter)
            .build();
        assert!(matches!(
            result,
            Err(BuildError::KindMismatch {
                configured: TopicKind::Approve,
                adapter: TopicKind::Reject
            })
        ));
    }

    #[test]
    fn build_validates_config() {
        let mut config = WorkerConfig::for_kind(TopicKind::Approve);
        config.max_tasks = 0;
        let result = WorkerBuilder::new(config)
            .task_source(engine())
            .store(store())
            .build();
        assert!(matches!(result, Err(BuildError::Config(_))));
    }
}
