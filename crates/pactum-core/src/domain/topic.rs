//! TopicKind - 3 種類のワーカー（create / approve / reject）

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which persistence step a worker performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    Create,
    Approve,
    Reject,
}

impl TopicKind {
    pub const ALL: [TopicKind; 3] = [TopicKind::Create, TopicKind::Approve, TopicKind::Reject];

    /// Topic name the process model uses for this step.
    pub fn default_topic(self) -> &'static str {
        match self {
            TopicKind::Create => "store-create-contract",
            TopicKind::Approve => "store-contract",
            TopicKind::Reject => "store-reject-contract",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TopicKind::Create => "create",
            TopicKind::Approve => "approve",
            TopicKind::Reject => "reject",
        }
    }

    /// `worker-{label}-{uuid}`
    pub fn default_worker_id(self) -> String {
        format!("worker-{}-{}", self.label(), uuid::Uuid::new_v4())
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TopicKind {
    type Err = String;

    /// Accepts the label (`approve`) or the topic name (`store-contract`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(s) || k.default_topic() == s)
            .ok_or_else(|| format!("unknown worker kind '{s}': must be create, approve, or reject"))
    }
}
