//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **ProcessScopedIds**: contract_id を process instance から決定的に導出（UUID v5）
//! - **UlidGenerator**: fake エンジンの task id（ULID）

use ulid::Ulid;
use uuid::Uuid;

use crate::domain::{ContractId, ProcessInstanceId, TaskId};
use crate::ports::Clock;

/// UUID v5 namespace for contract ids.
pub const CONTRACT_NAMESPACE: Uuid = Uuid::from_u128(0x4b2f_9d3e_6a1c_4e07_8f55_c0a1_7d2e_93b4);

/// ContractIdGenerator は create adapter が使う採番器
///
/// # 冪等性
/// create task が complete 前にクラッシュして再配送されても、
/// 同じ process instance からは同じ contract_id が出てくる必要がある。
pub trait ContractIdGenerator: Send + Sync {
    fn contract_id_for(&self, process_instance: &ProcessInstanceId) -> ContractId;
}

/// UUID v5(namespace, process_instance_id)
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessScopedIds;

impl ContractIdGenerator for ProcessScopedIds {
    fn contract_id_for(&self, process_instance: &ProcessInstanceId) -> ContractId {
        ContractId::from_uuid(Uuid::new_v5(
            &CONTRACT_NAMESPACE,
            process_instance.as_str().as_bytes(),
        ))
    }
}

/// UlidGenerator は ULID ベースの task id 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// ManualClock を使えば時刻部分を固定できる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn generate_task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskId::new(ulid.to_string().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn same_process_instance_gives_same_contract_id() {
        let ids = ProcessScopedIds;
        let pi = ProcessInstanceId::new("pi-42");

        let a = ids.contract_id_for(&pi);
        let b = ids.contract_id_for(&pi);
        let other = ids.contract_id_for(&ProcessInstanceId::new("pi-43"));

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert_eq!(a.as_uuid().get_version_num(), 5);
    }

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);
        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();

        // ランダム部分があるので ID は異なるが、timestamp 部分は同じ
        assert_ne!(id1, id2);
        let ts = |id: &TaskId| Ulid::from_string(id.as_str()).unwrap().timestamp_ms();
        assert_eq!(ts(&id1), ts(&id2));
        assert_eq!(ts(&id1), fixed_time.timestamp_millis() as u64);
    }
}
