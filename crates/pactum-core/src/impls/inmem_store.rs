//! InMemoryContractStore - HashMap ベースの ContractStore（テスト・demo 用）
//!
//! PgContractStore と同じ規則（冪等 upsert、前進のみの遷移、
//! 最初のタイムスタンプを保持）を守る。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    ContractDraft, ContractId, ContractRecord, ContractStatus, LegalReview, ProviderOffer,
    SignedContract, StatusCounts, StatusGroup, StoreError,
};
use crate::ports::ContractStore;

#[derive(Clone, Default)]
pub struct InMemoryContractStore {
    rows: Arc<Mutex<HashMap<ContractId, ContractRecord>>>,
    /// 次の書き込みをこの回数だけ失敗させる（DB 障害の再現）
    failing_writes: Arc<Mutex<u32>>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with a database error.
    pub async fn fail_next_writes(&self, n: u32) {
        *self.failing_writes.lock().await = n;
    }

    /// Remove a row (simulates a row deleted behind the worker's back).
    pub async fn remove(&self, contract_id: ContractId) -> Option<ContractRecord> {
        self.rows.lock().await.remove(&contract_id)
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    async fn check_write(&self) -> Result<(), StoreError> {
        let mut failing = self.failing_writes.lock().await;
        if *failing > 0 {
            *failing -= 1;
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn update<F>(
        &self,
        contract_id: ContractId,
        target: ContractStatus,
        apply: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ContractRecord) + Send,
    {
        self.check_write().await?;
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(&contract_id)
            .ok_or(StoreError::NotFound(contract_id))?;
        row.transition_to(target)?;
        apply(row);
        Ok(())
    }
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn upsert_submitted(
        &self,
        contract_id: ContractId,
        draft: &ContractDraft,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_write().await?;
        let mut rows = self.rows.lock().await;
        rows.entry(contract_id)
            .and_modify(|row| row.draft = draft.clone())
            .or_insert_with(|| ContractRecord::submitted(contract_id, draft.clone(), now));
        Ok(())
    }

    async fn record_offer(
        &self,
        contract_id: ContractId,
        offer: &ProviderOffer,
    ) -> Result<(), StoreError> {
        self.update(contract_id, ContractStatus::Running, |row| {
            row.offer = offer.clone();
        })
        .await
    }

    async fn approve(
        &self,
        contract_id: ContractId,
        signed: &SignedContract,
        review: &LegalReview,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(contract_id, ContractStatus::Approved, |row| {
            row.signed = signed.clone();
            row.review = review.clone();
            row.approved_at.get_or_insert(now);
        })
        .await
    }

    async fn reject(
        &self,
        contract_id: ContractId,
        review: &LegalReview,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(contract_id, ContractStatus::Rejected, |row| {
            row.review = review.clone();
            row.rejected_at.get_or_insert(now);
        })
        .await
    }

    async fn find(&self, contract_id: ContractId) -> Result<Option<ContractRecord>, StoreError> {
        Ok(self.rows.lock().await.get(&contract_id).cloned())
    }

    async fn list(&self, group: StatusGroup) -> Result<Vec<ContractRecord>, StoreError> {
        let rows = self.rows.lock().await;
        let mut out: Vec<ContractRecord> = rows
            .values()
            .filter(|r| StatusGroup::of(r.status) == group)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        Ok(out)
    }

    async fn counts(&self) -> Result<StatusCounts, StoreError> {
        let rows = self.rows.lock().await;
        let mut counts = StatusCounts::default();
        for row in rows.values() {
            counts.add(row.status, 1);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn draft(title: &str) -> ContractDraft {
        ContractDraft {
            title: Some(title.into()),
            ..ContractDraft::default()
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_keeps_status() {
        let store = InMemoryContractStore::new();
        let id = ContractId::from_uuid(Uuid::new_v4());

        store.upsert_submitted(id, &draft("a"), t0()).await.unwrap();
        store
            .record_offer(id, &ProviderOffer::default())
            .await
            .unwrap();
        store
            .upsert_submitted(id, &draft("b"), t0() + Duration::hours(1))
            .await
            .unwrap();

        let row = store.find(id).await.unwrap().unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(row.status, ContractStatus::Running);
        assert_eq!(row.draft.title.as_deref(), Some("b"));
        assert_eq!(row.created_at, t0());
    }

    #[tokio::test]
    async fn replayed_approval_keeps_first_timestamp() {
        let store = InMemoryContractStore::new();
        let id = ContractId::from_uuid(Uuid::new_v4());
        store.upsert_submitted(id, &draft("a"), t0()).await.unwrap();

        let signed = SignedContract::default();
        let review = LegalReview::default();
        store.approve(id, &signed, &review, t0()).await.unwrap();
        let first = store.find(id).await.unwrap();
        store
            .approve(id, &signed, &review, t0() + Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(store.find(id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn approved_rows_cannot_be_rejected() {
        let store = InMemoryContractStore::new();
        let id = ContractId::from_uuid(Uuid::new_v4());
        store.upsert_submitted(id, &draft("a"), t0()).await.unwrap();
        store
            .approve(id, &SignedContract::default(), &LegalReview::default(), t0())
            .await
            .unwrap();

        let err = store.reject(id, &LegalReview::default(), t0()).await;
        assert!(matches!(err, Err(StoreError::Transition { .. })));
        assert_eq!(
            store.find(id).await.unwrap().unwrap().status,
            ContractStatus::Approved
        );
    }

    #[tokio::test]
    async fn missing_row_is_not_found() {
        let store = InMemoryContractStore::new();
        let id = ContractId::from_uuid(Uuid::new_v4());
        let err = store.reject(id, &LegalReview::default(), t0()).await;
        assert!(matches!(err, Err(StoreError::NotFound(x)) if x == id));
    }

    #[tokio::test]
    async fn list_groups_and_orders_newest_first() {
        let store = InMemoryContractStore::new();
        let ids: Vec<ContractId> = (0..3).map(|_| ContractId::from_uuid(Uuid::new_v4())).collect();
        for (i, id) in ids.iter().enumerate() {
            store
                .upsert_submitted(*id, &draft("x"), t0() + Duration::minutes(i as i64))
                .await
                .unwrap();
        }
        store
            .record_offer(ids[0], &ProviderOffer::default())
            .await
            .unwrap();
        store
            .reject(ids[2], &LegalReview::default(), t0())
            .await
            .unwrap();

        let submitted = store.list(StatusGroup::Submitted).await.unwrap();
        let order: Vec<ContractId> = submitted.iter().map(|r| r.contract_id).collect();
        assert_eq!(order, vec![ids[1], ids[0]]);

        let counts = store.counts().await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                submitted: 2,
                approved: 0,
                rejected: 1
            }
        );
    }

    #[tokio::test]
    async fn injected_write_failures_are_database_errors() {
        let store = InMemoryContractStore::new();
        store.fail_next_writes(1).await;
        let id = ContractId::from_uuid(Uuid::new_v4());

        let err = store.upsert_submitted(id, &draft("a"), t0()).await;
        assert!(matches!(err, Err(StoreError::Database(_))));
        assert!(store.upsert_submitted(id, &draft("a"), t0()).await.is_ok());
    }
}
