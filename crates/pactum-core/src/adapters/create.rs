//! CreateContract - `store-create-contract`
//!
//! contract draft フォームの内容を `Submitted` 行として保存し、
//! contractId を完了変数としてエンジンに返す。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{CONTRACT_ID_VAR, PersistenceAdapter};
use crate::domain::{
    AdapterError, ContractDraft, ContractId, ExternalTask, TopicKind, TypedValue,
    ValidationError, Variables,
};
use crate::ports::{Clock, ContractIdGenerator, ContractStore};

pub struct CreateContract {
    store: Arc<dyn ContractStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn ContractIdGenerator>,
}

impl CreateContract {
    pub fn new(
        store: Arc<dyn ContractStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn ContractIdGenerator>,
    ) -> Self {
        Self { store, clock, ids }
    }

    /// Reuse the task's `contractId`, or derive one from the process instance.
    fn contract_id(&self, task: &ExternalTask) -> Result<ContractId, AdapterError> {
        match (
            task.variables.contract_id(CONTRACT_ID_VAR)?,
            &task.process_instance_id,
        ) {
            (Some(id), _) => Ok(id),
            (None, Some(pi)) => Ok(self.ids.contract_id_for(pi)),
            // どちらも無いと再配送のたびに別の行ができてしまう
            (None, None) => Err(ValidationError::Missing {
                name: CONTRACT_ID_VAR.into(),
            }
            .into()),
        }
    }
}

/// Draft fields of the task.
///
/// budget だけは寛容に変換する（空・数値でない → None）。日付は不正なら Validation。
pub fn draft_from(task: &ExternalTask) -> Result<ContractDraft, AdapterError> {
    let vars = &task.variables;
    Ok(ContractDraft {
        process_instance_id: task
            .process_instance_id
            .as_ref()
            .map(|pi| pi.as_str().to_string()),
        business_key: task.business_key.clone(),
        title: vars.string("contractTitle")?,
        contract_type: vars.string("contractType")?,
        roles: vars.string("roles")?,
        skills: vars.string("skills")?,
        request_type: vars.string("requestType")?,
        budget: vars.decimal_lenient("budget"),
        start_date: vars.date("contractStartDate")?,
        end_date: vars.date("contractEndDate")?,
        description: vars.string("description")?,
    })
}

#[async_trait]
impl PersistenceAdapter for CreateContract {
    fn kind(&self) -> TopicKind {
        TopicKind::Create
    }

    async fn apply(&self, task: &ExternalTask) -> Result<Variables, AdapterError> {
        let contract_id = self.contract_id(task)?;
        let draft = draft_from(task)?;

        self.store
            .upsert_submitted(contract_id, &draft, self.clock.now())
            .await?;
        info!(contract_id = %contract_id, "stored submitted contract");

        Ok(Variables::new().with(CONTRACT_ID_VAR, TypedValue::string(contract_id.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContractStatus, ErrorKind};
    use crate::impls::InMemoryContractStore;
    use crate::ports::{FixedClock, ProcessScopedIds};
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn adapter(store: &InMemoryContractStore) -> CreateContract {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
        CreateContract::new(
            Arc::new(store.clone()),
            Arc::new(FixedClock::new(now)),
            Arc::new(ProcessScopedIds),
        )
    }

    fn draft_vars() -> Variables {
        Variables::new()
            .with("contractTitle", TypedValue::string("Data platform"))
            .with("contractType", TypedValue::string("Service"))
            .with("budget", TypedValue::string("12500.50"))
            .with("contractStartDate", TypedValue::string("2024-03-01"))
            .with("contractEndDate", TypedValue::string("2024-12-31"))
    }

    fn returned_id(vars: &Variables) -> ContractId {
        vars.require_contract_id(CONTRACT_ID_VAR).unwrap()
    }

    #[tokio::test]
    async fn stores_draft_and_returns_contract_id() {
        let store = InMemoryContractStore::new();
        let task = ExternalTask::new("t1", draft_vars())
            .with_process_instance("pi-1")
            .with_business_key("bk-1");

        let out = adapter(&store).apply(&task).await.unwrap();
        let id = returned_id(&out);
        let row = store.find(id).await.unwrap().unwrap();

        assert_eq!(row.status, ContractStatus::Submitted);
        assert_eq!(row.draft.title.as_deref(), Some("Data platform"));
        assert_eq!(row.draft.budget, Some(12500.5));
        assert_eq!(row.draft.start_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(row.draft.process_instance_id.as_deref(), Some("pi-1"));
        assert_eq!(row.draft.business_key.as_deref(), Some("bk-1"));
    }

    #[tokio::test]
    async fn redelivery_reuses_the_same_row() {
        let store = InMemoryContractStore::new();
        let adapter = adapter(&store);
        let task = ExternalTask::new("t1", draft_vars()).with_process_instance("pi-1");

        let first = adapter.apply(&task).await.unwrap();
        let second = adapter.apply(&task).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn existing_contract_id_is_reused() {
        let store = InMemoryContractStore::new();
        let given = "6f1c2b0e-8d47-4b8a-9f3e-1a2b3c4d5e6f";
        let task = ExternalTask::new(
            "t1",
            draft_vars().with(CONTRACT_ID_VAR, TypedValue::string(given)),
        );

        let out = adapter(&store).apply(&task).await.unwrap();
        assert_eq!(returned_id(&out).to_string(), given);
    }

    #[tokio::test]
    async fn unusable_budget_becomes_null() {
        let store = InMemoryContractStore::new();
        for (i, budget) in [json!(""), json!("about 10k"), json!(null)]
            .into_iter()
            .enumerate()
        {
            let vars = draft_vars().with(
                "budget",
                TypedValue {
                    value: budget,
                    value_type: None,
                },
            );
            let out = adapter(&store)
                .apply(&ExternalTask::new("t", vars).with_process_instance(format!("pi-{i}")))
                .await
                .unwrap();
            let row = store.find(returned_id(&out)).await.unwrap().unwrap();
            assert_eq!(row.draft.budget, None);
        }
    }

    #[tokio::test]
    async fn malformed_date_is_a_terminal_validation_error() {
        let store = InMemoryContractStore::new();
        let vars = draft_vars().with("contractStartDate", TypedValue::string("next monday"));

        let err = adapter(&store)
            .apply(&ExternalTask::new("t", vars).with_process_instance("pi-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::Validation(_)));
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn store_outage_is_retryable() {
        let store = InMemoryContractStore::new();
        store.fail_next_writes(1).await;

        let err = adapter(&store)
            .apply(&ExternalTask::new("t", draft_vars()).with_process_instance("pi-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::Persistence(_)));
        assert!(err.kind().is_retryable());
    }

    #[tokio::test]
    async fn task_without_contract_id_or_process_instance_is_rejected() {
        let store = InMemoryContractStore::new();
        let adapter = adapter(&store);
        let task = ExternalTask::new("t", draft_vars());

        for _ in 0..2 {
            let err = adapter.apply(&task).await.unwrap_err();
            assert!(matches!(
                err,
                AdapterError::Validation(ValidationError::Missing { ref name }) if name == CONTRACT_ID_VAR
            ));
            assert_eq!(err.kind(), ErrorKind::Permanent);
        }
        assert!(store.is_empty().await);
    }
}
