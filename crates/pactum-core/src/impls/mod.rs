//! Impls - ports の実装
//!
//! # 本番用
//! - **EngineRestClient**: エンジンの REST API（reqwest）
//! - **PgContractStore**: PostgreSQL（sqlx）
//!
//! # テスト・demo 用
//! - **InMemoryEngine**: lock プロトコルの fake
//! - **InMemoryContractStore**: HashMap ベースの契約テーブル

pub mod engine_rest;
pub mod inmem_engine;
pub mod inmem_store;
pub mod pg_store;

// 主要な型を再エクスポート
pub use self::engine_rest::EngineRestClient;
pub use self::inmem_engine::{CompletionRecord, FailureRecord, InMemoryEngine, Incident};
pub use self::inmem_store::InMemoryContractStore;
pub use self::pg_store::PgContractStore;
