//! App - アプリケーション層
//!
//! このモジュールは、ports と adapters を組み合わせてワーカーを動かします。
//!
//! # 主要コンポーネント
//! - **WorkerBuilder**: 1 topic 分のワーカーの構築とワイヤリング
//! - **WorkerLoop**: fetch → apply → complete / failure のループ
//! - **WorkerGroup**: 複数 topic のループを 1 プロセスで動かす
//! - **RetryPolicy**: 失敗の報告内容（retries / retry_timeout）を決める

pub mod builder;
pub mod group;
pub mod retry;
pub mod status;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, WorkerBuilder};
pub use self::group::WorkerGroup;
pub use self::retry::RetryPolicy;
pub use self::status::{CycleReport, LoopStats, LoopStatsSnapshot};
pub use self::worker_loop::WorkerLoop;
