use crate::error::{StepError, StepResult};
use crate::logger;
use crate::parameters::require_parameter;
use crate::settings::Settings;
use aimodel_common::alarm::AlarmPolicy;
use aimodel_common::naming::{alarm_arn, alarm_name, permission_statement_id};
use aimodel_common::payload::{AlarmOutput, InstanceEvent, STATUS_CODE_OK};
use aimodel_providers::requests::{AlarmSpec, InvokePermission, ALARM_INVOKE_PRINCIPAL};
use aimodel_providers::CloudClients;
use tracing::info;

/// Create the low-CPU alarm that fires the stop function for this instance, and record
/// its name where the stop function will look for it.
pub async fn configure_alarm(
    clients: &CloudClients,
    settings: &Settings,
    event: &InstanceEvent,
) -> StepResult<AlarmOutput> {
    let instance_id = event.instance_id.trim();
    if instance_id.is_empty() {
        return Err(StepError::MissingInput("instance_id"));
    }
    logger::track(
        "CONFIGURE_ALARM",
        Some(instance_id),
        run_configure(clients, settings, instance_id),
    )
    .await
}

async fn run_configure(
    clients: &CloudClients,
    settings: &Settings,
    instance_id: &str,
) -> StepResult<AlarmOutput> {
    let paths = &settings.paths;
    let stop_function_arn =
        require_parameter(&*clients.parameters, &paths.stop_lambda_arn()).await?;
    let name = alarm_name(instance_id);

    // Grant first: an alarm created before its action may invoke the function would
    // fail its first trigger.
    let permission = InvokePermission {
        function_name: stop_function_arn.clone(),
        statement_id: permission_statement_id(instance_id),
        principal: ALARM_INVOKE_PRINCIPAL.to_string(),
        source_arn: alarm_arn(&stop_function_arn, &name)?,
    };
    match clients.functions.add_invoke_permission(&permission).await {
        Ok(()) => info!(statement_id = %permission.statement_id, "invoke permission granted"),
        Err(e) if e.is_conflict() => {
            logger::log_quick(
                "GRANT_ALARM_INVOKE",
                Some(instance_id),
                Some("permission already granted"),
            );
        }
        Err(e) => return Err(e.into()),
    }

    let spec = AlarmSpec {
        alarm_name: name.clone(),
        instance_id: instance_id.to_string(),
        action_arn: stop_function_arn,
        policy: AlarmPolicy::default(),
    };
    clients.monitoring.put_metric_alarm(&spec).await?;

    clients
        .parameters
        .put_parameter(&paths.alarm_name_for(instance_id), &name, true)
        .await?;
    info!(instance_id, alarm_name = %name, "alarm configured");

    Ok(AlarmOutput {
        status_code: STATUS_CODE_OK,
        body: format!(
            "Alarm {} created for instance {} with action to stop it",
            name, instance_id
        ),
        instance_id: instance_id.to_string(),
        alarm_name: name,
    })
}
