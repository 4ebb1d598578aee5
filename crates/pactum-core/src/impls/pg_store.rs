//! PgContractStore - PostgreSQL 実装（sqlx）
//!
//! 期待するテーブルは `migrations/` の DDL。適用はデプロイ側の責務で、
//! このクレートでは `#[sqlx::test]` がテスト DB に流すだけ。
//!
//! # 冪等性
//! - create は `ON CONFLICT (contract_id) DO UPDATE`（draft 列だけ更新）
//! - 遷移は `WHERE contract_status = ANY($n)` でガード
//! - `approved_at = COALESCE(approved_at, $n)` で最初の時刻を保持

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::domain::{
    ContractDraft, ContractId, ContractRecord, ContractStatus, LegalReview, ProviderOffer,
    SignedContract, StatusCounts, StatusGroup, StoreError,
};
use crate::ports::ContractStore;

const SELECT_COLUMNS: &str = "contract_id, process_instance_id, business_key, contract_title, \
     contract_type, roles, skills, request_type, budget, contract_start_date, contract_end_date, \
     description, contract_status, providers_budget, providers_comment, meet_requirement, \
     providers_name, signed_date, employee_name, office_address, final_price, storage_location, \
     version_number, legal_comment, approval_decision, created_at, approved_at, rejected_at";

#[derive(Debug, FromRow)]
struct ContractRow {
    contract_id: Uuid,
    process_instance_id: Option<String>,
    business_key: Option<String>,
    contract_title: Option<String>,
    contract_type: Option<String>,
    roles: Option<String>,
    skills: Option<String>,
    request_type: Option<String>,
    budget: Option<f64>,
    contract_start_date: Option<NaiveDate>,
    contract_end_date: Option<NaiveDate>,
    description: Option<String>,
    contract_status: String,
    providers_budget: Option<i64>,
    providers_comment: Option<String>,
    meet_requirement: Option<String>,
    providers_name: Option<String>,
    signed_date: Option<NaiveDate>,
    employee_name: Option<String>,
    office_address: Option<String>,
    final_price: Option<f64>,
    storage_location: Option<String>,
    version_number: Option<String>,
    legal_comment: Option<String>,
    approval_decision: Option<String>,
    created_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
}

impl TryFrom<ContractRow> for ContractRecord {
    type Error = StoreError;

    fn try_from(row: ContractRow) -> Result<Self, Self::Error> {
        let status = ContractStatus::from_str(&row.contract_status).map_err(|e| {
            StoreError::Corrupt(format!("contract {}: {e}", row.contract_id))
        })?;
        Ok(ContractRecord {
            contract_id: ContractId::from_uuid(row.contract_id),
            status,
            draft: ContractDraft {
                process_instance_id: row.process_instance_id,
                business_key: row.business_key,
                title: row.contract_title,
                contract_type: row.contract_type,
                roles: row.roles,
                skills: row.skills,
                request_type: row.request_type,
                budget: row.budget,
                start_date: row.contract_start_date,
                end_date: row.contract_end_date,
                description: row.description,
            },
            offer: ProviderOffer {
                providers_budget: row.providers_budget,
                providers_comment: row.providers_comment,
                meet_requirement: row.meet_requirement,
                providers_name: row.providers_name,
            },
            signed: SignedContract {
                signed_date: row.signed_date,
                employee_name: row.employee_name,
                office_address: row.office_address,
                final_price: row.final_price,
                storage_location: row.storage_location,
                version_number: row.version_number,
            },
            review: LegalReview {
                legal_comment: row.legal_comment,
                approval_decision: row.approval_decision,
            },
            created_at: row.created_at,
            approved_at: row.approved_at,
            rejected_at: row.rejected_at,
        })
    }
}

/// Statuses a row may have for a write to `target`, as SQL text values.
fn sources_of(target: ContractStatus) -> Vec<String> {
    ContractStatus::allowed_sources(target)
        .into_iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

/// Timestamp column a listing of `group` is ordered by.
fn order_column(group: StatusGroup) -> &'static str {
    match group {
        StatusGroup::Submitted => "created_at",
        StatusGroup::Approved => "approved_at",
        StatusGroup::Rejected => "rejected_at",
    }
}

pub fn connect_options(config: &StorageConfig) -> Result<PgConnectOptions, StoreError> {
    match &config.url {
        Some(url) => Ok(PgConnectOptions::from_str(url)?),
        None => Ok(PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)),
    }
}

/// PostgreSQL implementation of [`ContractStore`].
#[derive(Debug, Clone)]
pub struct PgContractStore {
    pool: PgPool,
}

impl PgContractStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &StorageConfig) -> Result<Self, StoreError> {
        let options = connect_options(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;
        info!(
            max_connections = config.max_connections,
            "connected to contract store"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// 0 行更新だったときの原因を調べる（行が無い / 遷移が禁止）
    async fn explain_miss(
        &self,
        contract_id: ContractId,
        target: ContractStatus,
    ) -> StoreError {
        match self.find(contract_id).await {
            Ok(Some(row)) => StoreError::Transition {
                contract_id,
                from: row.status,
                to: target,
            },
            Ok(None) => StoreError::NotFound(contract_id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl ContractStore for PgContractStore {
    async fn upsert_submitted(
        &self,
        contract_id: ContractId,
        draft: &ContractDraft,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO contracts
                (contract_id, process_instance_id, business_key, contract_title, contract_type,
                 roles, skills, request_type, budget, contract_start_date, contract_end_date,
                 description, contract_status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (contract_id) DO UPDATE SET
                process_instance_id = EXCLUDED.process_instance_id,
                business_key        = EXCLUDED.business_key,
                contract_title      = EXCLUDED.contract_title,
                contract_type       = EXCLUDED.contract_type,
                roles               = EXCLUDED.roles,
                skills              = EXCLUDED.skills,
                request_type        = EXCLUDED.request_type,
                budget              = EXCLUDED.budget,
                contract_start_date = EXCLUDED.contract_start_date,
                contract_end_date   = EXCLUDED.contract_end_date,
                description         = EXCLUDED.description
            "#,
        )
        .bind(contract_id.as_uuid())
        .bind(&draft.process_instance_id)
        .bind(&draft.business_key)
        .bind(&draft.title)
        .bind(&draft.contract_type)
        .bind(&draft.roles)
        .bind(&draft.skills)
        .bind(&draft.request_type)
        .bind(draft.budget)
        .bind(draft.start_date)
        .bind(draft.end_date)
        .bind(&draft.description)
        .bind(ContractStatus::Submitted.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_offer(
        &self,
        contract_id: ContractId,
        offer: &ProviderOffer,
    ) -> Result<(), StoreError> {
        let target = ContractStatus::Running;
        let result = sqlx::query(
            r#"
            UPDATE contracts SET
                providers_budget  = $2,
                providers_comment = $3,
                meet_requirement  = $4,
                providers_name    = $5,
                contract_status   = $6
            WHERE contract_id = $1 AND contract_status = ANY($7)
            "#,
        )
        .bind(contract_id.as_uuid())
        .bind(offer.providers_budget)
        .bind(&offer.providers_comment)
        .bind(&offer.meet_requirement)
        .bind(&offer.providers_name)
        .bind(target.as_str())
        .bind(sources_of(target))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_miss(contract_id, target).await);
        }
        Ok(())
    }

    async fn approve(
        &self,
        contract_id: ContractId,
        signed: &SignedContract,
        review: &LegalReview,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let target = ContractStatus::Approved;
        let result = sqlx::query(
            r#"
            UPDATE contracts SET
                signed_date       = $2,
                employee_name     = $3,
                office_address    = $4,
                final_price       = $5,
                storage_location  = $6,
                version_number    = $7,
                legal_comment     = $8,
                approval_decision = $9,
                approved_at       = COALESCE(approved_at, $10),
                contract_status   = $11
            WHERE contract_id = $1 AND contract_status = ANY($12)
            "#,
        )
        .bind(contract_id.as_uuid())
        .bind(signed.signed_date)
        .bind(&signed.employee_name)
        .bind(&signed.office_address)
        .bind(signed.final_price)
        .bind(&signed.storage_location)
        .bind(&signed.version_number)
        .bind(&review.legal_comment)
        .bind(&review.approval_decision)
        .bind(now)
        .bind(target.as_str())
        .bind(sources_of(target))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_miss(contract_id, target).await);
        }
        Ok(())
    }

    async fn reject(
        &self,
        contract_id: ContractId,
        review: &LegalReview,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let target = ContractStatus::Rejected;
        let result = sqlx::query(
            r#"
            UPDATE contracts SET
                legal_comment     = $2,
                approval_decision = $3,
                rejected_at       = COALESCE(rejected_at, $4),
                contract_status   = $5
            WHERE contract_id = $1 AND contract_status = ANY($6)
            "#,
        )
        .bind(contract_id.as_uuid())
        .bind(&review.legal_comment)
        .bind(&review.approval_decision)
        .bind(now)
        .bind(target.as_str())
        .bind(sources_of(target))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_miss(contract_id, target).await);
        }
        Ok(())
    }

    async fn find(&self, contract_id: ContractId) -> Result<Option<ContractRecord>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM contracts WHERE contract_id = $1");
        let row: Option<ContractRow> = sqlx::query_as(&sql)
            .bind(contract_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ContractRecord::try_from).transpose()
    }

    async fn list(&self, group: StatusGroup) -> Result<Vec<ContractRecord>, StoreError> {
        let statuses: Vec<String> = group
            .statuses()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM contracts WHERE contract_status = ANY($1) \
             ORDER BY {} DESC NULLS LAST",
            order_column(group)
        );
        let rows: Vec<ContractRow> = sqlx::query_as(&sql)
            .bind(statuses)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ContractRecord::try_from).collect()
    }

    async fn counts(&self) -> Result<StatusCounts, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT contract_status, COUNT(*) FROM contracts GROUP BY contract_status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            let status = ContractStatus::from_str(&status).map_err(StoreError::Corrupt)?;
            counts.add(status, u64::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transition_guards_list_allowed_sources() {
        assert_eq!(sources_of(ContractStatus::Running), vec!["Submitted", "Running"]);
        assert_eq!(
            sources_of(ContractStatus::Approved),
            vec!["Submitted", "Running", "Approved"]
        );
        assert_eq!(
            sources_of(ContractStatus::Rejected),
            vec!["Submitted", "Running", "Rejected"]
        );
    }

    #[test]
    fn listings_order_by_group_timestamp() {
        assert_eq!(order_column(StatusGroup::Submitted), "created_at");
        assert_eq!(order_column(StatusGroup::Approved), "approved_at");
        assert_eq!(order_column(StatusGroup::Rejected), "rejected_at");
    }

    #[test]
    fn corrupt_status_is_reported() {
        let row = ContractRow {
            contract_id: Uuid::nil(),
            process_instance_id: None,
            business_key: None,
            contract_title: None,
            contract_type: None,
            roles: None,
            skills: None,
            request_type: None,
            budget: None,
            contract_start_date: None,
            contract_end_date: None,
            description: None,
            contract_status: "Archived".into(),
            providers_budget: None,
            providers_comment: None,
            meet_requirement: None,
            providers_name: None,
            signed_date: None,
            employee_name: None,
            office_address: None,
            final_price: None,
            storage_location: None,
            version_number: None,
            legal_comment: None,
            approval_decision: None,
            created_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
        };
        assert!(matches!(
            ContractRecord::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn connect_options_accept_url_or_parts() {
        let from_parts = connect_options(&StorageConfig::default()).unwrap();
        assert_eq!(from_parts.get_host(), "postgres");
        assert_eq!(from_parts.get_port(), 5432);

        let from_url = connect_options(&StorageConfig {
            url: Some("postgres://u:p@db.internal:6543/contracts".into()),
            ..StorageConfig::default()
        })
        .unwrap();
        assert_eq!(from_url.get_host(), "db.internal");
        assert_eq!(from_url.get_port(), 6543);
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn id() -> ContractId {
        ContractId::from_uuid(Uuid::new_v4())
    }

    fn draft(title: &str, budget: Option<f64>) -> ContractDraft {
        ContractDraft {
            process_instance_id: Some("pi-1".into()),
            title: Some(title.into()),
            budget,
            ..Default::default()
        }
    }

    fn review(decision: &str) -> LegalReview {
        LegalReview {
            legal_comment: Some("ok".into()),
            approval_decision: Some(decision.into()),
        }
    }

    async fn submitted(store: &PgContractStore) -> ContractId {
        let id = id();
        store
            .upsert_submitted(id, &draft("NDA", Some(1000.0)), at(9))
            .await
            .unwrap();
        id
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn create_replay_keeps_one_row_and_running_status(pool: PgPool) -> sqlx::Result<()> {
        let store = PgContractStore::new(pool.clone());
        let id = submitted(&store).await;

        store
            .record_offer(
                id,
                &ProviderOffer {
                    providers_budget: Some(950),
                    providers_name: Some("Acme".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .upsert_submitted(id, &draft("NDA v2", Some(1000.0)), at(11))
            .await
            .unwrap();

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contracts")
            .fetch_one(&pool)
            .await?;
        assert_eq!(rows, 1);

        let row = store.find(id).await.unwrap().unwrap();
        assert_eq!(row.status, ContractStatus::Running);
        assert_eq!(row.draft.title.as_deref(), Some("NDA v2"));
        assert_eq!(row.offer.providers_budget, Some(950));
        assert_eq!(row.created_at, at(9));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn approve_replay_keeps_first_timestamp(pool: PgPool) -> sqlx::Result<()> {
        let store = PgContractStore::new(pool);
        let id = submitted(&store).await;
        let signed = SignedContract {
            final_price: Some(990.0),
            ..Default::default()
        };

        store.approve(id, &signed, &review("approved"), at(10)).await.unwrap();
        store.approve(id, &signed, &review("approved"), at(12)).await.unwrap();

        let row = store.find(id).await.unwrap().unwrap();
        assert_eq!(row.status, ContractStatus::Approved);
        assert_eq!(row.approved_at, Some(at(10)));
        assert_eq!(row.signed.final_price, Some(990.0));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reject_replay_leaves_the_row_identical(pool: PgPool) -> sqlx::Result<()> {
        let store = PgContractStore::new(pool);
        let id = submitted(&store).await;

        store.reject(id, &review("rejected"), at(10)).await.unwrap();
        let once = store.find(id).await.unwrap();
        store.reject(id, &review("rejected"), at(12)).await.unwrap();

        assert_eq!(store.find(id).await.unwrap(), once);
        assert_eq!(once.and_then(|r| r.rejected_at), Some(at(10)));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rejected_contract_cannot_be_approved(pool: PgPool) -> sqlx::Result<()> {
        let store = PgContractStore::new(pool);
        let id = submitted(&store).await;
        store.reject(id, &review("rejected"), at(10)).await.unwrap();

        let err = store
            .approve(id, &SignedContract::default(), &review("approved"), at(11))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::Transition {
                from: ContractStatus::Rejected,
                to: ContractStatus::Approved,
                ..
            }
        ));
        let row = store.find(id).await.unwrap().unwrap();
        assert_eq!(row.status, ContractStatus::Rejected);
        assert_eq!(row.approved_at, None);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn writes_to_a_missing_row_are_not_found(pool: PgPool) -> sqlx::Result<()> {
        let store = PgContractStore::new(pool);
        let missing = id();

        let approve = store
            .approve(missing, &SignedContract::default(), &review("approved"), at(10))
            .await;
        let reject = store.reject(missing, &review("rejected"), at(10)).await;

        assert!(matches!(approve, Err(StoreError::NotFound(m)) if m == missing));
        assert!(matches!(reject, Err(StoreError::NotFound(m)) if m == missing));
        assert_eq!(store.find(missing).await.unwrap(), None);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn absent_budget_is_stored_as_null(pool: PgPool) -> sqlx::Result<()> {
        let store = PgContractStore::new(pool.clone());
        let id = id();
        store
            .upsert_submitted(id, &draft("NDA", None), at(9))
            .await
            .unwrap();

        let (budget,): (Option<f64>,) =
            sqlx::query_as("SELECT budget FROM contracts WHERE contract_id = $1")
                .bind(id.as_uuid())
                .fetch_one(&pool)
                .await?;
        assert_eq!(budget, None);
        assert_eq!(store.find(id).await.unwrap().unwrap().draft.budget, None);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn listings_and_counts_follow_status_groups(pool: PgPool) -> sqlx::Result<()> {
        let store = PgContractStore::new(pool);
        let early = submitted(&store).await;
        let late = submitted(&store).await;
        let rejected = submitted(&store).await;
        let signed = SignedContract::default();
        store.approve(early, &signed, &review("approved"), at(10)).await.unwrap();
        store.approve(late, &signed, &review("approved"), at(12)).await.unwrap();
        store.reject(rejected, &review("rejected"), at(11)).await.unwrap();

        let approved: Vec<ContractId> = store
            .list(StatusGroup::Approved)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.contract_id)
            .collect();
        assert_eq!(approved, vec![late, early]);
        assert_eq!(
            store.counts().await.unwrap(),
            StatusCounts {
                submitted: 0,
                approved: 2,
                rejected: 1,
            }
        );
        Ok(())
    }
}
