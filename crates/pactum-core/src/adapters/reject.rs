//! RejectContract - `store-reject-contract`

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::approve::review_from;
use super::{PersistenceAdapter, required_contract_id, verify_status};
use crate::domain::{AdapterError, ContractStatus, ExternalTask, TopicKind, Variables};
use crate::ports::{Clock, ContractStore};

pub struct RejectContract {
    store: Arc<dyn ContractStore>,
    clock: Arc<dyn Clock>,
}

impl RejectContract {
    pub fn new(store: Arc<dyn ContractStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl PersistenceAdapter for RejectContract {
    fn kind(&self) -> TopicKind {
        TopicKind::Reject
    }

    async fn apply(&self, task: &ExternalTask) -> Result<Variables, AdapterError> {
        let contract_id = required_contract_id(&task.variables)?;
        let review = review_from(&task.variables)?;

        self.store
            .reject(contract_id, &review, self.clock.now())
            .await?;
        verify_status(self.store.as_ref(), contract_id, ContractStatus::Rejected).await?;
        info!(contract_id = %contract_id, "stored rejected contract");

        Ok(Variables::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CONTRACT_ID_VAR;
    use crate::domain::{
        ContractDraft, ContractId, LegalReview, ProviderOffer, SignedContract, TypedValue,
    };
    use crate::impls::InMemoryContractStore;
    use crate::ports::SystemClock;
    use chrono::Utc;
    use uuid::Uuid;

    fn rejection(id: ContractId) -> ExternalTask {
        ExternalTask::new(
            "t-reject",
            Variables::new()
                .with(CONTRACT_ID_VAR, TypedValue::string(id.to_string()))
                .with("legalcomment", TypedValue::string("liability clause missing"))
                .with("approvaldecision", TypedValue::string("rejected")),
        )
    }

    fn adapter(store: &InMemoryContractStore) -> RejectContract {
        RejectContract::new(Arc::new(store.clone()), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn rejects_a_running_contract() {
        let store = InMemoryContractStore::new();
        let id = ContractId::from_uuid(Uuid::new_v4());
        store
            .upsert_submitted(id, &ContractDraft::default(), Utc::now())
            .await
            .unwrap();
        store
            .record_offer(id, &ProviderOffer::default())
            .await
            .unwrap();

        adapter(&store).apply(&rejection(id)).await.unwrap();

        let row = store.find(id).await.unwrap().unwrap();
        assert_eq!(row.status, ContractStatus::Rejected);
        assert_eq!(
            row.review.legal_comment.as_deref(),
            Some("liability clause missing")
        );
        assert!(row.rejected_at.is_some());
        assert!(row.approved_at.is_none());
    }

    #[tokio::test]
    async fn approved_contract_is_never_rejected() {
        let store = InMemoryContractStore::new();
        let id = ContractId::from_uuid(Uuid::new_v4());
        store
            .upsert_submitted(id, &ContractDraft::default(), Utc::now())
            .await
            .unwrap();
        store
            .approve(id, &SignedContract::default(), &LegalReview::default(), Utc::now())
            .await
            .unwrap();

        let err = adapter(&store).apply(&rejection(id)).await.unwrap_err();

        assert!(!err.kind().is_retryable());
        assert_eq!(
            store.find(id).await.unwrap().unwrap().status,
            ContractStatus::Approved
        );
    }
}
