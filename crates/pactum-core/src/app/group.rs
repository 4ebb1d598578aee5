use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use super::status::{LoopStats, LoopStatsSnapshot};
use super::worker_loop::WorkerLoop;

/// Worker group handle (one loop per topic in one process).
/// - `shutdown_tx` を drop するとワーカー全体が止まる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<(String, JoinHandle<()>)>,
    stats: Vec<(String, Arc<LoopStats>)>,
}

impl WorkerGroup {
    /// Spawn every loop on the current runtime.
    pub fn spawn(workers: Vec<WorkerLoop>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(workers.len());
        let mut stats = Vec::with_capacity(workers.len());
        for worker in workers {
            let topic = worker.config().topic.clone();
            stats.push((topic.clone(), worker.stats()));

            let rx = shutdown_rx.clone();
            let join = tokio::spawn(async move {
                worker.run(rx).await;
            });
            joins.push((topic, join));
        }

        Self {
            shutdown_tx,
            joins,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// This does not cancel an in-flight batch; loops just stop taking new ones.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    ///
    /// 返すカウンタは全ループ終了後に読むので、最後の batch まで含む。
    pub async fn shutdown_and_join(self) -> Vec<(String, LoopStatsSnapshot)> {
        self.request_shutdown();
        for (topic, join) in self.joins {
            if let Err(e) = join.await {
                error!(topic = %topic, error = %e, "worker task panicked");
            }
        }
        self.stats
            .into_iter()
            .map(|(topic, stats)| (topic, stats.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::WorkerBuilder;
    use crate::config::WorkerConfig;
    use crate::domain::{TopicKind, Variables};
    use crate::impls::{InMemoryContractStore, InMemoryEngine};
    use std::time::Duration;

    #[tokio::test]
    async fn group_runs_one_loop_per_topic_and_joins() {
        let engine = InMemoryEngine::new();
        let store = InMemoryContractStore::new();
        engine
            .publish_for("store-create-contract", "pi-group", Variables::new())
            .await;

        let workers: Vec<WorkerLoop> = TopicKind::ALL
            .into_iter()
            .map(|kind| {
                let config = WorkerConfig {
                    poll_interval: Duration::from_millis(10),
                    ..WorkerConfig::for_kind(kind)
                };
                WorkerBuilder::new(config)
                    .task_source(Arc::new(engine.clone()))
                    .store(Arc::new(store.clone()))
                    .build()
                    .unwrap()
            })
            .collect();

        let group = WorkerGroup::spawn(workers);
        assert_eq!(group.len(), 3);

        for _ in 0..200 {
            if store.len().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stats = tokio::time::timeout(Duration::from_secs(5), group.shutdown_and_join())
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(stats.len(), 3);
        let create = stats
            .iter()
            .find(|(topic, _)| topic == "store-create-contract")
            .map(|(_, snap)| snap.completed);
        assert_eq!(create, Some(1));
        assert_eq!(engine.completions().await.len(), 1);
    }
}
