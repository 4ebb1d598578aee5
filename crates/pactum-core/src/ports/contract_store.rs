//! ContractStore port - 契約テーブルの正本（source of truth）
//!
//! # 実装
//! - **PgContractStore**: PostgreSQL（sqlx）
//! - **InMemoryContractStore**: テスト・demo 用
//!
//! # 設計原則
//! - すべての書き込みは contract_id をキーにした冪等な upsert / update
//! - 状態遷移は前進のみ（`ContractStatus::can_transition_to`）
//! - 再適用しても approved_at / rejected_at は最初の値のまま

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ContractDraft, ContractId, ContractRecord, LegalReview, ProviderOffer, SignedContract,
    StatusCounts, StatusGroup, StoreError,
};

#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Insert a `Submitted` row, or refresh the draft fields of an existing one.
    ///
    /// 既存行の status は動かさない（再配送で Running → Submitted に戻さない）。
    async fn upsert_submitted(
        &self,
        contract_id: ContractId,
        draft: &ContractDraft,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record a provider offer and move the row to `Running`.
    async fn record_offer(
        &self,
        contract_id: ContractId,
        offer: &ProviderOffer,
    ) -> Result<(), StoreError>;

    /// Move the row to `Approved`.
    ///
    /// `NotFound` if the row does not exist, `Transition` if it is `Rejected`.
    async fn approve(
        &self,
        contract_id: ContractId,
        signed: &SignedContract,
        review: &LegalReview,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Move the row to `Rejected`.
    async fn reject(
        &self,
        contract_id: ContractId,
        review: &LegalReview,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find(&self, contract_id: ContractId) -> Result<Option<ContractRecord>, StoreError>;

    /// Rows of one reporting group, newest first by the group's timestamp.
    async fn list(&self, group: StatusGroup) -> Result<Vec<ContractRecord>, StoreError>;

    async fn counts(&self) -> Result<StatusCounts, StoreError>;
}
