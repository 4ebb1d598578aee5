//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 外部システム（ワークフローエンジン, PostgreSQL）への
//! インターフェースを trait として提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - エンジンが task の正本（lock / retry 回数）
//! - PostgreSQL が契約の正本
//! - ワーカーはどちらの状態もローカルに持たない

pub mod clock;
pub mod contract_store;
pub mod id_generator;
pub mod task_source;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::contract_store::ContractStore;
pub use self::id_generator::{ContractIdGenerator, ProcessScopedIds, UlidGenerator};
pub use self::task_source::{FetchRequest, TaskSource};
