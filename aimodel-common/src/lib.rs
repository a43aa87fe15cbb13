use serde::{Deserialize, Serialize};
use std::fmt;

pub mod alarm;
pub mod lifecycle;
pub mod naming;
pub mod params;
pub mod payload;

/// Device path the data volume is attached at.
pub const DATA_VOLUME_DEVICE: &str = "/dev/sdh";

/// Environment variable carrying the target instance id on the stop function.
pub const INSTANCE_ID_ENV: &str = "INSTANCE_ID";

// --- Enums ---

/// Provider-managed lifecycle state of a compute instance.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown(String),
}

impl InstanceState {
    /// Parse a provider state name (`pending`, `running`, `shutting-down`, ...).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            other => InstanceState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Unknown(s) => s.as_str(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, InstanceState::Running)
    }

    /// False once the instance is on its way down; waiting any longer is pointless.
    /// Unknown states keep the benefit of the doubt.
    pub fn can_still_become_running(&self) -> bool {
        !matches!(
            self,
            InstanceState::ShuttingDown
                | InstanceState::Terminated
                | InstanceState::Stopping
                | InstanceState::Stopped
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
