use crate::error::{StepError, StepResult};
use crate::logger;
use crate::parameters::require_parameter;
use crate::settings::Settings;
use crate::wait::wait_until_running;
use aimodel_common::payload::{AttachVolumeOutput, InstanceEvent, STATUS_VOLUME_ATTACHED};
use aimodel_common::DATA_VOLUME_DEVICE;
use aimodel_providers::CloudClients;
use tracing::info;

/// Wait for the instance to run, then attach the data volume at `/dev/sdh`.
///
/// Attach errors (volume in use, device taken) are returned as-is.
pub async fn attach_volume(
    clients: &CloudClients,
    settings: &Settings,
    event: &InstanceEvent,
) -> StepResult<AttachVolumeOutput> {
    let instance_id = event.instance_id.trim();
    if instance_id.is_empty() {
        return Err(StepError::MissingInput("instance_id"));
    }
    logger::track(
        "ATTACH_VOLUME",
        Some(instance_id),
        run_attach(clients, settings, instance_id),
    )
    .await
}

async fn run_attach(
    clients: &CloudClients,
    settings: &Settings,
    instance_id: &str,
) -> StepResult<AttachVolumeOutput> {
    let volume_id = require_parameter(&*clients.parameters, &settings.paths.volume_id()).await?;

    let report = wait_until_running(&*clients.compute, instance_id, &settings.wait).await?;
    info!(
        instance_id,
        polls = report.polls,
        waited_ms = logger::duration_ms(report.waited),
        "instance running"
    );

    clients
        .compute
        .attach_volume(&volume_id, instance_id, DATA_VOLUME_DEVICE)
        .await?;
    info!(instance_id, volume_id = %volume_id, device = DATA_VOLUME_DEVICE, "volume attached");

    Ok(AttachVolumeOutput {
        status: STATUS_VOLUME_ATTACHED.to_string(),
        instance_id: instance_id.to_string(),
        volume_id,
        device: DATA_VOLUME_DEVICE.to_string(),
    })
}
