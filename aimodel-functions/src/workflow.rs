//! Provisioning as an explicit sequence of steps.
//!
//! `run_provisioning` drives the steps in-process, threading each output into the next
//! input. `state_machine_definition` renders the same sequence for the orchestrator.

use crate::alarm_configurator::configure_alarm;
use crate::error::{StepError, StepResult};
use crate::launcher::launch;
use crate::settings::Settings;
use crate::stop_target_updater::update_stop_target;
use crate::volume_attacher::attach_volume;
use aimodel_common::lifecycle::{LifecycleStep, PROVISIONING_SEQUENCE};
use aimodel_common::payload::{
    AlarmOutput, AttachVolumeOutput, InstanceEvent, LaunchOutput, UpdateStopTargetEvent,
    UpdateStopTargetOutput,
};
use aimodel_providers::CloudClients;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};

/// Lambda invoke integration of the orchestrator.
pub const LAMBDA_INVOKE_RESOURCE: &str = "arn:aws:states:::lambda:invoke";

#[derive(Debug, thiserror::Error)]
#[error("{} failed: {source}", .step.task_name())]
pub struct WorkflowError {
    pub step: LifecycleStep,
    #[source]
    pub source: StepError,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "step", content = "output", rename_all = "snake_case")]
pub enum StepOutput {
    Launch(LaunchOutput),
    AttachVolume(AttachVolumeOutput),
    ConfigureAlarm(AlarmOutput),
    UpdateStopTarget(UpdateStopTargetOutput),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProvisioningRun {
    pub instance_id: String,
    pub steps: Vec<StepOutput>,
}

/// Run launch → attach volume → configure alarm → update stop target.
///
/// Stops at the first failing step. Nothing already done is rolled back.
pub async fn run_provisioning(
    clients: &CloudClients,
    settings: &Settings,
    stop_function: Option<&str>,
) -> Result<ProvisioningRun, WorkflowError> {
    let mut instance_id: Option<String> = None;
    let mut steps = Vec::with_capacity(PROVISIONING_SEQUENCE.len());
    let mut current = Some(PROVISIONING_SEQUENCE[0]);

    while let Some(step) = current {
        info!(step = step.task_name(), instance_id = instance_id.as_deref(), "running step");
        let output = run_step(step, clients, settings, instance_id.as_deref(), stop_function)
            .await
            .map_err(|source| {
                error!(step = step.task_name(), error = %source, "step failed");
                WorkflowError { step, source }
            })?;
        if let StepOutput::Launch(launched) = &output {
            instance_id = Some(launched.instance_id.clone());
        }
        steps.push(output);
        current = step.next();
    }

    let instance_id = instance_id.ok_or(WorkflowError {
        step: LifecycleStep::Launch,
        source: StepError::MissingInput("instance_id"),
    })?;
    Ok(ProvisioningRun { instance_id, steps })
}

async fn run_step(
    step: LifecycleStep,
    clients: &CloudClients,
    settings: &Settings,
    instance_id: Option<&str>,
    stop_function: Option<&str>,
) -> StepResult<StepOutput> {
    if step == LifecycleStep::Launch {
        return Ok(StepOutput::Launch(launch(clients, settings).await?));
    }
    let instance_id = instance_id
        .ok_or(StepError::MissingInput("instance_id"))?
        .to_string();
    let event = InstanceEvent {
        instance_id: instance_id.clone(),
    };
    match step {
        LifecycleStep::AttachVolume => Ok(StepOutput::AttachVolume(
            attach_volume(clients, settings, &event).await?,
        )),
        LifecycleStep::ConfigureAlarm => Ok(StepOutput::ConfigureAlarm(
            configure_alarm(clients, settings, &event).await?,
        )),
        LifecycleStep::UpdateStopTarget => {
            let event = UpdateStopTargetEvent {
                instance_id,
                function_name: stop_function.map(str::to_string),
            };
            Ok(StepOutput::UpdateStopTarget(
                update_stop_target(clients, settings, &event).await?,
            ))
        }
        LifecycleStep::Launch | LifecycleStep::Terminate => Err(StepError::InvalidEvent(format!(
            "{} is not part of a provisioning run",
            step.task_name()
        ))),
    }
}

/// Function ARNs backing each task of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTargets {
    pub launch: String,
    pub attach_volume: String,
    pub configure_alarm: String,
    pub update_stop_target: String,
    /// Function whose environment the last task rewrites; the alarm's action.
    pub stop_function: String,
    /// Upper bound for the attach task, covering its wait for `running`.
    pub attach_timeout_secs: Option<u64>,
}

impl TaskTargets {
    fn function_for(&self, step: LifecycleStep) -> Option<&str> {
        match step {
            LifecycleStep::Launch => Some(self.launch.as_str()),
            LifecycleStep::AttachVolume => Some(self.attach_volume.as_str()),
            LifecycleStep::ConfigureAlarm => Some(self.configure_alarm.as_str()),
            LifecycleStep::UpdateStopTarget => Some(self.update_stop_target.as_str()),
            LifecycleStep::Terminate => None,
        }
    }
}

/// Amazon States Language definition of the provisioning sequence.
///
/// Every task after launch receives `instance_id` from the previous result; the update
/// task also receives the stop function as `function_name`.
pub fn state_machine_definition(targets: &TaskTargets) -> Value {
    let mut states = Map::new();
    for step in PROVISIONING_SEQUENCE {
        let payload = match step {
            LifecycleStep::Launch => json!({}),
            LifecycleStep::UpdateStopTarget => json!({
                "instance_id.$": "$.instance_id",
                "function_name": targets.stop_function,
            }),
            _ => json!({ "instance_id.$": "$.instance_id" }),
        };
        let mut state = json!({
            "Type": "Task",
            "Resource": LAMBDA_INVOKE_RESOURCE,
            "Parameters": {
                "FunctionName": targets.function_for(step),
                "Payload": payload,
            },
            "ResultSelector": { "instance_id.$": "$.Payload.instance_id" },
        });
        if let Some(obj) = state.as_object_mut() {
            match step.next() {
                Some(next) => obj.insert("Next".into(), json!(next.task_name())),
                None => obj.insert("End".into(), json!(true)),
            };
            if let (LifecycleStep::AttachVolume, Some(secs)) = (step, targets.attach_timeout_secs) {
                obj.insert("TimeoutSeconds".into(), json!(secs));
            }
        }
        states.insert(step.task_name().to_string(), state);
    }

    json!({
        "Comment": "Provision an AI model instance and arm its idle shutdown",
        "StartAt": PROVISIONING_SEQUENCE[0].task_name(),
        "States": Value::Object(states),
    })
}
