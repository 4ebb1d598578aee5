//! Adapters - topic ごとの永続化ロジック
//!
//! 1 つの adapter は 1 つの topic を担当し、
//! 1. task 変数を取り出して検証・変換し
//! 2. ContractStore に冪等な書き込みを行い
//! 3. エンジンに返す完了変数を作る
//!
//! エラーはすべて `AdapterError` で返す。どう報告するか（retry / incident）は
//! WorkerLoop と RetryPolicy の仕事で、adapter は関知しない。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    AdapterError, ContractId, ContractRecord, ContractStatus, ExternalTask, TopicKind, Variables,
};
use crate::ports::{Clock, ContractIdGenerator, ContractStore};

pub mod approve;
pub mod create;
pub mod reject;

pub use self::approve::ApproveContract;
pub use self::create::CreateContract;
pub use self::reject::RejectContract;

/// Name of the variable that carries the contract id between steps.
pub const CONTRACT_ID_VAR: &str = "contractId";

/// PersistenceAdapter は 1 つの task を 1 回分処理する
///
/// # 冪等性
/// 同じ task が何度届いても（再配送）、ストアの結果は 1 回目と同じでなければならない。
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    fn kind(&self) -> TopicKind;

    /// Apply the task's side effect and return the completion variables.
    async fn apply(&self, task: &ExternalTask) -> Result<Variables, AdapterError>;
}

/// Adapter for `kind`, wired to `store`.
pub fn adapter_for(
    kind: TopicKind,
    store: Arc<dyn ContractStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn ContractIdGenerator>,
) -> Arc<dyn PersistenceAdapter> {
    match kind {
        TopicKind::Create => Arc::new(CreateContract::new(store, clock, ids)),
        TopicKind::Approve => Arc::new(ApproveContract::new(store, clock)),
        TopicKind::Reject => Arc::new(RejectContract::new(store, clock)),
    }
}

/// Read the row back after a write.
///
/// 行が無い / status が違う → Verification（retryable）。黙って complete しない。
pub(crate) async fn verify_status(
    store: &dyn ContractStore,
    contract_id: ContractId,
    expected: ContractStatus,
) -> Result<ContractRecord, AdapterError> {
    let row = store
        .find(contract_id)
        .await
        .map_err(AdapterError::from)?
        .ok_or_else(|| AdapterError::Verification {
            contract_id,
            reason: "row not found after update".into(),
        })?;

    if row.status != expected {
        return Err(AdapterError::Verification {
            contract_id,
            reason: format!("status is {} after update, expected {expected}", row.status),
        });
    }
    Ok(row)
}

/// `contractId` of a downstream (approve / reject) task. Missing or malformed is terminal.
pub(crate) fn required_contract_id(variables: &Variables) -> Result<ContractId, AdapterError> {
    Ok(variables.require_contract_id(CONTRACT_ID_VAR)?)
}
