//! Domain identifiers (strongly-typed IDs).
//!
//! エンジン側の ID（task / process instance / worker）は不透明な文字列なので、
//! Phantom type パターンで `EngineId<T>` を共通実装し、型だけを分けています。
//! `ContractId` だけはこちらで採番する UUID です。
//!
//! ## Phantom Type パターン
//! - `T` は実行時には使わないマーカー型（PhantomData）
//! - TaskId と ProcessInstanceId を取り違えるとコンパイルエラーになる

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// ログに出すときのラベル（例: "task", "worker"）
    fn label() -> &'static str;
}

/// エンジンが払い出す不透明な文字列 ID
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> EngineId<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn label(&self) -> &'static str {
        T::label()
    }
}

// derive だと T にも bound が付いてしまうので手で実装する
impl<T: IdMarker> Clone for EngineId<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T: IdMarker> PartialEq for EngineId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: IdMarker> Eq for EngineId<T> {}

impl<T: IdMarker> std::hash::Hash for EngineId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdMarker> fmt::Debug for EngineId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::label(), self.value)
    }
}

impl<T: IdMarker> fmt::Display for EngineId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: IdMarker> From<&str> for EngineId<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for EngineId<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// External task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {}

impl IdMarker for Task {
    fn label() -> &'static str {
        "task"
    }
}

/// Process instance のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessInstance {}

impl IdMarker for ProcessInstance {
    fn label() -> &'static str {
        "process-instance"
    }
}

/// Worker のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Worker {}

impl IdMarker for Worker {
    fn label() -> &'static str {
        "worker"
    }
}

/// Identifier of an external task lease.
pub type TaskId = EngineId<Task>;

/// Identifier of a running process instance.
pub type ProcessInstanceId = EngineId<ProcessInstance>;

/// Identity this process presents to the engine on every call.
pub type WorkerId = EngineId<Worker>;

/// Primary key of a contract row.
///
/// create adapter が process instance ごとに一度だけ採番し、
/// 完了変数としてエンジンに返す。以降の task はすべて同じ値を持つ。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(Uuid);

impl ContractId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for ContractId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for ContractId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}
