use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Status values
// -----------------------------------------------------------------------------

pub const STATUS_VOLUME_ATTACHED: &str = "volume_attached";
pub const STATUS_ENVIRONMENT_UPDATED: &str = "Environment variable updated";

pub const STATUS_CODE_OK: u16 = 200;
pub const STATUS_CODE_FAILED: u16 = 500;

// -----------------------------------------------------------------------------
// Step inputs
// -----------------------------------------------------------------------------

/// Input of every step that acts on an already launched instance.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InstanceEvent {
    pub instance_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UpdateStopTargetEvent {
    pub instance_id: String,
    /// Function name or ARN. Falls back to the stop-lambda-arn parameter when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
}

// -----------------------------------------------------------------------------
// Step outputs
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LaunchOutput {
    pub instance_id: String,
    pub key_pair_name: String,
    pub launch_template_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AttachVolumeOutput {
    pub status: String,
    pub instance_id: String,
    pub volume_id: String,
    pub device: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AlarmOutput {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
    pub instance_id: String,
    pub alarm_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UpdateStopTargetOutput {
    pub status: String,
    pub instance_id: String,
    pub function_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TerminateOutput {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
    pub instance_id: String,
    pub alarm_name: String,
    pub cleanup: Vec<CleanupOutcome>,
}

impl TerminateOutput {
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_CODE_OK
    }

    pub fn outcome(&self, action: CleanupAction) -> Option<&CleanupOutcome> {
        self.cleanup.iter().find(|c| c.action == action)
    }
}

// -----------------------------------------------------------------------------
// Teardown report
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleanupAction {
    TerminateInstance,
    DeleteAlarm,
    DeleteAlarmParameter,
    DeleteKeyPair,
    DeleteKeySecret,
    RevokeAlarmPermission,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub action: CleanupAction,
    pub target: String,
    pub status: CleanupStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanupOutcome {
    pub fn succeeded(action: CleanupAction, target: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            status: CleanupStatus::Succeeded,
            error: None,
        }
    }

    pub fn failed(action: CleanupAction, target: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            status: CleanupStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn skipped(action: CleanupAction, target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            status: CleanupStatus::Skipped,
            error: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == CleanupStatus::Failed
    }
}
