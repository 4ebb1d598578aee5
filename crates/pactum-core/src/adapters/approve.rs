//! ApproveContract - `store-contract`
//!
//! 署名済み契約とリーガルレビューの内容を保存し、行を `Approved` にする。
//! 書き込み後に read-back で確認できるまで complete しない。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{PersistenceAdapter, required_contract_id, verify_status};
use crate::domain::{
    AdapterError, ContractStatus, ExternalTask, LegalReview, SignedContract, TopicKind, Variables,
};
use crate::ports::{Clock, ContractStore};

pub struct ApproveContract {
    store: Arc<dyn ContractStore>,
    clock: Arc<dyn Clock>,
}

impl ApproveContract {
    pub fn new(store: Arc<dyn ContractStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

/// Legal review fields (shared with rejection).
pub fn review_from(vars: &Variables) -> Result<LegalReview, AdapterError> {
    Ok(LegalReview {
        legal_comment: vars.string("legalcomment")?,
        approval_decision: vars.string("approvaldecision")?,
    })
}

pub fn signed_from(vars: &Variables) -> Result<SignedContract, AdapterError> {
    Ok(SignedContract {
        signed_date: vars.date("signeddate")?,
        employee_name: vars.string("employeeName")?,
        office_address: vars.string("officeAddress")?,
        final_price: vars.decimal("finalPrice")?,
        storage_location: vars.string("storagelocation")?,
        version_number: vars.string("versionnumber")?,
    })
}

#[async_trait]
impl PersistenceAdapter for ApproveContract {
    fn kind(&self) -> TopicKind {
        TopicKind::Approve
    }

    async fn apply(&self, task: &ExternalTask) -> Result<Variables, AdapterError> {
        let vars = &task.variables;
        let contract_id = required_contract_id(vars)?;
        let signed = signed_from(vars)?;
        let review = review_from(vars)?;

        self.store
            .approve(contract_id, &signed, &review, self.clock.now())
            .await?;
        let row = verify_status(self.store.as_ref(), contract_id, ContractStatus::Approved).await?;
        info!(
            contract_id = %contract_id,
            title = row.draft.title.as_deref().unwrap_or(""),
            "stored approved contract"
        );

        Ok(Variables::new())
    }
}
