//! pactum-core
//!
//! External-task workers for the contract approval process.
//! エンジンから task を lock して取り出し、契約テーブルに冪等に書き込み、
//! 結果（complete / failure）をエンジンに返す。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, variables, task, contract, outcome, state, errors）
//! - **ports**: 抽象化レイヤー（TaskSource, ContractStore, Clock, ContractIdGenerator）
//! - **impls**: ports の実装（REST クライアント, PostgreSQL, in-memory fake）
//! - **adapters**: topic ごとの永続化ロジック（create / approve / reject）
//! - **app**: ワーカーループ・リトライ方針・構築（builder, worker_loop, group, retry）
//! - **config**: 検証済み設定
//! - **telemetry**: tracing の初期化

pub mod adapters;
pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod telemetry;

pub use app::{RetryPolicy, WorkerBuilder, WorkerGroup, WorkerLoop};
pub use config::{ConfigError, EngineConfig, StorageConfig, WorkerConfig};
