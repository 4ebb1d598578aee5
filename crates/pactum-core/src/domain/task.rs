//! ExternalTask - エンジンから lease された作業単位

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ProcessInstanceId, TaskId, WorkerId};
use super::variables::Variables;

/// A unit of work leased from the engine.
///
/// The worker owns it only for the lock duration; it must be resolved with
/// `complete` or `report_failure` before the lock expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTask {
    pub id: TaskId,

    #[serde(default)]
    pub topic_name: Option<String>,

    #[serde(default)]
    pub worker_id: Option<WorkerId>,

    #[serde(default)]
    pub process_instance_id: Option<ProcessInstanceId>,

    #[serde(default)]
    pub business_key: Option<String>,

    /// 初回配送では null。以降は直近の failure 報告で渡した値。
    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub lock_expiration_time: Option<String>,

    #[serde(default)]
    pub variables: Variables,
}

impl ExternalTask {
    pub fn new(id: impl Into<TaskId>, variables: Variables) -> Self {
        Self {
            id: id.into(),
            topic_name: None,
            worker_id: None,
            process_instance_id: None,
            business_key: None,
            retries: None,
            lock_expiration_time: None,
            variables,
        }
    }

    pub fn with_process_instance(mut self, id: impl Into<ProcessInstanceId>) -> Self {
        self.process_instance_id = Some(id.into());
        self
    }

    pub fn with_business_key(mut self, key: impl Into<String>) -> Self {
        self.business_key = Some(key.into());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn lock_expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.lock_expiration_time.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_engine_payload() {
        let task: ExternalTask = serde_json::from_value(json!({
            "activityId": "StoreContract",
            "id": "3f2c",
            "topicName": "store-contract",
            "workerId": "worker-approve-1",
            "processInstanceId": "pi-9",
            "businessKey": null,
            "retries": null,
            "lockExpirationTime": "2024-05-01T10:00:00.000+0000",
            "variables": {
                "contractId": {"value": "abc", "type": "String"}
            }
        }))
        .unwrap();

        assert_eq!(task.id.as_str(), "3f2c");
        assert_eq!(task.process_instance_id.as_ref().unwrap().as_str(), "pi-9");
        assert_eq!(task.business_key, None);
        assert_eq!(task.retries, None);
        assert_eq!(task.variables.len(), 1);
        assert!(task.lock_expires_at().is_some());
    }

    #[test]
    fn tolerates_minimal_payload() {
        let task: ExternalTask = serde_json::from_value(json!({"id": "t1"})).unwrap();
        assert!(task.variables.is_empty());
        assert!(task.lock_expires_at().is_none());
    }
}
