//! Function invocation: one deployed function per lifecycle step.
//!
//! The orchestrator invokes the provisioning steps with the previous task's result as
//! payload. The terminator is invoked by the alarm action, whose payload is the alarm
//! event; it ignores it and reads its target from the environment.

use crate::error::StepError;
use crate::settings::Settings;
use crate::{alarm_configurator, launcher, stop_target_updater, terminator, volume_attacher};
use aimodel_common::lifecycle::LifecycleStep;
use aimodel_common::payload::{InstanceEvent, UpdateStopTargetEvent};
use aimodel_providers::CloudClients;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("AIMODEL_STEP is not set; cannot tell which step this function runs")]
    NoStep,
    #[error("invalid {step} payload: {source}")]
    Payload {
        step: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Step(#[from] StepError),
    #[error("failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Run the step configured for this deployment on one invocation payload.
pub async fn handle(
    clients: &CloudClients,
    settings: &Settings,
    payload: Value,
) -> Result<Value, HandlerError> {
    let step = settings.step.ok_or(HandlerError::NoStep)?;
    dispatch(step, clients, settings, payload).await
}

/// Run `step` on `payload` and return its result as JSON.
pub async fn dispatch(
    step: LifecycleStep,
    clients: &CloudClients,
    settings: &Settings,
    payload: Value,
) -> Result<Value, HandlerError> {
    match step {
        LifecycleStep::Launch => encode(&launcher::launch(clients, settings).await?),
        LifecycleStep::AttachVolume => {
            let event: InstanceEvent = decode(step, payload)?;
            encode(&volume_attacher::attach_volume(clients, settings, &event).await?)
        }
        LifecycleStep::ConfigureAlarm => {
            let event: InstanceEvent = decode(step, payload)?;
            encode(&alarm_configurator::configure_alarm(clients, settings, &event).await?)
        }
        LifecycleStep::UpdateStopTarget => {
            let event: UpdateStopTargetEvent = decode(step, payload)?;
            encode(&stop_target_updater::update_stop_target(clients, settings, &event).await?)
        }
        LifecycleStep::Terminate => encode(&terminator::terminate(clients, settings).await?),
    }
}

fn decode<T: DeserializeOwned>(step: LifecycleStep, payload: Value) -> Result<T, HandlerError> {
    serde_json::from_value(payload).map_err(|source| HandlerError::Payload {
        step: step.task_name(),
        source,
    })
}

fn encode<T: Serialize>(value: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(HandlerError::Encode)
}
