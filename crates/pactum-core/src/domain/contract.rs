//! Contract record and its status machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::errors::StoreError;
use super::ids::ContractId;

/// Contract status.
///
/// State transitions (forward only):
/// - Submitted -> Running -> Approved | Rejected
/// - Submitted -> Approved | Rejected（provider offer は省略可能）
/// - 同じ status への再適用は冪等な no-op（再配送対策）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    Submitted,
    Running,
    Approved,
    Rejected,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 4] = [
        ContractStatus::Submitted,
        ContractStatus::Running,
        ContractStatus::Approved,
        ContractStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContractStatus::Submitted => "Submitted",
            ContractStatus::Running => "Running",
            ContractStatus::Approved => "Approved",
            ContractStatus::Rejected => "Rejected",
        }
    }

    fn rank(self) -> u8 {
        match self {
            ContractStatus::Submitted => 0,
            ContractStatus::Running => 1,
            ContractStatus::Approved | ContractStatus::Rejected => 2,
        }
    }

    /// Approved / Rejected からはどこにも行けない
    pub fn is_terminal(self) -> bool {
        matches!(self, ContractStatus::Approved | ContractStatus::Rejected)
    }

    pub fn can_transition_to(self, next: ContractStatus) -> bool {
        self == next || (!self.is_terminal() && next.rank() > self.rank())
    }

    /// Statuses a row may currently have for a write to `target` to be accepted.
    pub fn allowed_sources(target: ContractStatus) -> Vec<ContractStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(target))
            .collect()
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown contract status '{s}'"))
    }
}

/// Reporting groups used by listings and counts.
///
/// `Submitted` は Submitted と Running の両方を含む。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusGroup {
    Submitted,
    Approved,
    Rejected,
}

impl StatusGroup {
    pub const ALL: [StatusGroup; 3] = [
        StatusGroup::Submitted,
        StatusGroup::Approved,
        StatusGroup::Rejected,
    ];

    pub fn statuses(self) -> &'static [ContractStatus] {
        match self {
            StatusGroup::Submitted => &[ContractStatus::Submitted, ContractStatus::Running],
            StatusGroup::Approved => &[ContractStatus::Approved],
            StatusGroup::Rejected => &[ContractStatus::Rejected],
        }
    }

    pub fn of(status: ContractStatus) -> Self {
        match status {
            ContractStatus::Submitted | ContractStatus::Running => StatusGroup::Submitted,
            ContractStatus::Approved => StatusGroup::Approved,
            ContractStatus::Rejected => StatusGroup::Rejected,
        }
    }
}

impl FromStr for StatusGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "submitted" => Ok(StatusGroup::Submitted),
            "approved" => Ok(StatusGroup::Approved),
            "rejected" => Ok(StatusGroup::Rejected),
            other => Err(format!(
                "invalid status '{other}': must be submitted, approved, or rejected"
            )),
        }
    }
}

/// Counts per reporting group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub submitted: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: ContractStatus, n: u64) {
        match StatusGroup::of(status) {
            StatusGroup::Submitted => self.submitted += n,
            StatusGroup::Approved => self.approved += n,
            StatusGroup::Rejected => self.rejected += n,
        }
    }
}

/// Fields captured by the contract draft form (create step).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDraft {
    pub process_instance_id: Option<String>,
    pub business_key: Option<String>,
    pub title: Option<String>,
    pub contract_type: Option<String>,
    pub roles: Option<String>,
    pub skills: Option<String>,
    pub request_type: Option<String>,
    pub budget: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
}

/// A provider's offer; moves the contract to `Running`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOffer {
    pub providers_budget: Option<i64>,
    pub providers_comment: Option<String>,
    pub meet_requirement: Option<String>,
    pub providers_name: Option<String>,
}

/// Signed-contract details captured on approval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedContract {
    pub signed_date: Option<NaiveDate>,
    pub employee_name: Option<String>,
    pub office_address: Option<String>,
    pub final_price: Option<f64>,
    pub storage_location: Option<String>,
    pub version_number: Option<String>,
}

/// Legal review outcome; shared by approval and rejection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalReview {
    pub legal_comment: Option<String>,
    pub approval_decision: Option<String>,
}

/// One row of the contracts table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    pub contract_id: ContractId,
    pub status: ContractStatus,
    #[serde(flatten)]
    pub draft: ContractDraft,
    #[serde(flatten)]
    pub offer: ProviderOffer,
    #[serde(flatten)]
    pub signed: SignedContract,
    #[serde(flatten)]
    pub review: LegalReview,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl ContractRecord {
    pub fn submitted(contract_id: ContractId, draft: ContractDraft, now: DateTime<Utc>) -> Self {
        Self {
            contract_id,
            status: ContractStatus::Submitted,
            draft,
            offer: ProviderOffer::default(),
            signed: SignedContract::default(),
            review: LegalReview::default(),
            created_at: now,
            approved_at: None,
            rejected_at: None,
        }
    }

    /// Move to `next`, refusing any backward or sideways transition.
    pub fn transition_to(&mut self, next: ContractStatus) -> Result<(), StoreError> {
        if !self.status.can_transition_to(next) {
            return Err(StoreError::Transition {
                contract_id: self.contract_id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// The timestamp listings sort by for this row's group.
    pub fn sort_key(&self) -> DateTime<Utc> {
        match self.status {
            ContractStatus::Submitted | ContractStatus::Running => self.created_at,
            ContractStatus::Approved => self.approved_at.unwrap_or(self.created_at),
            ContractStatus::Rejected => self.rejected_at.unwrap_or(self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    use ContractStatus::*;

    #[rstest]
    #[case(Submitted, Running, true)]
    #[case(Submitted, Approved, true)]
    #[case(Submitted, Rejected, true)]
    #[case(Running, Approved, true)]
    #[case(Running, Rejected, true)]
    #[case(Running, Running, true)]
    #[case(Approved, Approved, true)]
    #[case(Rejected, Rejected, true)]
    #[case(Running, Submitted, false)]
    #[case(Approved, Running, false)]
    #[case(Approved, Submitted, false)]
    #[case(Approved, Rejected, false)]
    #[case(Rejected, Approved, false)]
    #[case(Rejected, Running, false)]
    fn transitions_only_move_forward(
        #[case] from: ContractStatus,
        #[case] to: ContractStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn allowed_sources_for_approval() {
        assert_eq!(
            ContractStatus::allowed_sources(Approved),
            vec![Submitted, Running, Approved]
        );
        assert_eq!(ContractStatus::allowed_sources(Submitted), vec![Submitted]);
    }

    #[test]
    fn record_refuses_backward_transition() {
        let mut rec = ContractRecord::submitted(
            ContractId::from_uuid(Uuid::nil()),
            ContractDraft::default(),
            Utc::now(),
        );
        rec.transition_to(Rejected).unwrap();
        let err = rec.transition_to(Running).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transition { from: Rejected, to: Running, .. }
        ));
        assert_eq!(rec.status, Rejected);
    }

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!("approved".parse::<ContractStatus>().unwrap(), Approved);
        assert_eq!("Running".parse::<ContractStatus>().unwrap(), Running);
        assert!("archived".parse::<ContractStatus>().is_err());

        assert_eq!("SUBMITTED".parse::<StatusGroup>().unwrap(), StatusGroup::Submitted);
        assert!("running".parse::<StatusGroup>().is_err());
    }

    #[test]
    fn running_counts_as_submitted() {
        let mut counts = StatusCounts::default();
        counts.add(Submitted, 2);
        counts.add(Running, 1);
        counts.add(Rejected, 4);
        assert_eq!(
            counts,
            StatusCounts {
                submitted: 3,
                approved: 0,
                rejected: 4
            }
        );
    }
}
