use crate::error::{StepError, StepResult};
use crate::logger;
use crate::parameters::require_parameter;
use crate::settings::Settings;
use aimodel_common::payload::{
    UpdateStopTargetEvent, UpdateStopTargetOutput, STATUS_ENVIRONMENT_UPDATED,
};
use aimodel_common::INSTANCE_ID_ENV;
use aimodel_providers::CloudClients;
use tracing::info;

/// Point the stop function at this instance by setting its `INSTANCE_ID` variable.
///
/// The alarm action carries no payload, so the function's environment is the only way
/// to hand it its target. Other variables are kept.
pub async fn update_stop_target(
    clients: &CloudClients,
    settings: &Settings,
    event: &UpdateStopTargetEvent,
) -> StepResult<UpdateStopTargetOutput> {
    let instance_id = event.instance_id.trim();
    if instance_id.is_empty() {
        return Err(StepError::MissingInput("instance_id"));
    }
    logger::track(
        "UPDATE_STOP_TARGET",
        Some(instance_id),
        run_update(clients, settings, instance_id, event.function_name.as_deref()),
    )
    .await
}

async fn run_update(
    clients: &CloudClients,
    settings: &Settings,
    instance_id: &str,
    function_name: Option<&str>,
) -> StepResult<UpdateStopTargetOutput> {
    let function_name = match function_name.map(str::trim).filter(|f| !f.is_empty()) {
        Some(name) => name.to_string(),
        None => require_parameter(&*clients.parameters, &settings.paths.stop_lambda_arn()).await?,
    };

    let mut variables = clients.functions.get_environment(&function_name).await?;
    let previous = variables.insert(INSTANCE_ID_ENV.to_string(), instance_id.to_string());
    clients
        .functions
        .update_environment(&function_name, &variables)
        .await?;
    info!(
        function_name = %function_name,
        instance_id,
        previous_target = previous.as_deref(),
        "stop target updated"
    );

    Ok(UpdateStopTargetOutput {
        status: STATUS_ENVIRONMENT_UPDATED.to_string(),
        instance_id: instance_id.to_string(),
        function_name,
    })
}
