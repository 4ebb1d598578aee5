//! Domain model (IDs, variables, tasks, contracts, outcomes, errors).
//!
//! ここは I/O を一切持たない。HTTP やDBの型は ports / impls 側に閉じ込める
//! （例外: `StoreError` / `TaskSourceError` は下位エラーを source として包む）。

pub mod contract;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;
pub mod topic;
pub mod variables;

pub use contract::{
    ContractDraft, ContractRecord, ContractStatus, LegalReview, ProviderOffer, SignedContract,
    StatusCounts, StatusGroup,
};
pub use errors::{AdapterError, ErrorKind, StoreError, TaskSourceError, ValidationError};
pub use ids::{ContractId, ProcessInstanceId, TaskId, WorkerId};
pub use outcome::{FailureReport, OutcomeKind, Resolution};
pub use state::TaskState;
pub use task::ExternalTask;
pub use topic::TopicKind;
pub use variables::{TypedValue, VariableType, Variables};
