use serde::{Deserialize, Serialize};

/// Instance lifecycle as a sequence of orchestrator tasks.
///
/// Launch → AttachVolume → ConfigureAlarm → UpdateStopTarget run back to back.
/// Terminate is fired later by the alarm action, outside the provisioning run.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStep {
    Launch,
    AttachVolume,
    ConfigureAlarm,
    UpdateStopTarget,
    Terminate,
}

/// Steps driven by the orchestrator, in order.
pub const PROVISIONING_SEQUENCE: [LifecycleStep; 4] = [
    LifecycleStep::Launch,
    LifecycleStep::AttachVolume,
    LifecycleStep::ConfigureAlarm,
    LifecycleStep::UpdateStopTarget,
];

impl LifecycleStep {
    /// Task/state name used in the workflow definition and in logs.
    pub fn task_name(&self) -> &'static str {
        match self {
            LifecycleStep::Launch => "LaunchInstance",
            LifecycleStep::AttachVolume => "AttachVolume",
            LifecycleStep::ConfigureAlarm => "ConfigureAlarm",
            LifecycleStep::UpdateStopTarget => "UpdateStopTarget",
            LifecycleStep::Terminate => "TerminateInstance",
        }
    }

    /// CLI subcommand that runs this step.
    pub fn command(&self) -> &'static str {
        match self {
            LifecycleStep::Launch => "launch",
            LifecycleStep::AttachVolume => "attach-volume",
            LifecycleStep::ConfigureAlarm => "configure-alarm",
            LifecycleStep::UpdateStopTarget => "update-stop-target",
            LifecycleStep::Terminate => "terminate",
        }
    }

    /// Step named by its CLI command or its task name.
    pub fn parse(name: &str) -> Option<LifecycleStep> {
        let name = name.trim();
        [
            LifecycleStep::Launch,
            LifecycleStep::AttachVolume,
            LifecycleStep::ConfigureAlarm,
            LifecycleStep::UpdateStopTarget,
            LifecycleStep::Terminate,
        ]
        .into_iter()
        .find(|step| step.command() == name || step.task_name() == name)
    }

    /// Next orchestrator-driven step. `None` at the end of provisioning and after teardown.
    pub fn next(&self) -> Option<LifecycleStep> {
        match self {
            LifecycleStep::Launch => Some(LifecycleStep::AttachVolume),
            LifecycleStep::AttachVolume => Some(LifecycleStep::ConfigureAlarm),
            LifecycleStep::ConfigureAlarm => Some(LifecycleStep::UpdateStopTarget),
            LifecycleStep::UpdateStopTarget => None,
            LifecycleStep::Terminate => None,
        }
    }

    /// True for the step invoked by the alarm action instead of the orchestrator.
    pub fn is_alarm_triggered(&self) -> bool {
        matches!(self, LifecycleStep::Terminate)
    }

    /// Whether the step needs `instance_id` in its input payload.
    pub fn requires_instance_id(&self) -> bool {
        matches!(
            self,
            LifecycleStep::AttachVolume
                | LifecycleStep::ConfigureAlarm
                | LifecycleStep::UpdateStopTarget
        )
    }
}
