use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a tracked container group, as persisted in the `State` column.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub enum InstanceState {
    Creating,
    Running,
    Failed,
    MarkedForDeletion,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A row of the state table. Only the key columns are mandatory, so the same
/// type doubles as the partial body of a merge write.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct StateEntity {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey")]
    pub row_key: String,
    #[serde(rename = "State", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<InstanceState>,
    #[serde(rename = "PublicIP", default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

impl StateEntity {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        StateEntity {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: InstanceState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_public_ip(mut self, ip: impl Into<String>) -> Self {
        self.public_ip = Some(ip.into());
        self
    }

    // rows written by the provisioning workflow before we ever saw them may lack a State
    pub fn current_state(&self) -> InstanceState {
        self.state.unwrap_or(InstanceState::Creating)
    }
}

/// An entity as read back from the table, with the version tag needed for
/// conditional writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntity {
    pub entity: StateEntity,
    pub etag: Option<String>,
}
