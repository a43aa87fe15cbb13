use crate::error::{StepError, StepResult};
use crate::logger;
use crate::settings::Settings;
use aimodel_common::naming::{alarm_name, key_secret_name, permission_statement_id};
use aimodel_common::payload::{
    CleanupAction, CleanupOutcome, CleanupStatus, TerminateOutput, STATUS_CODE_FAILED,
    STATUS_CODE_OK,
};
use aimodel_common::INSTANCE_ID_ENV;
use aimodel_providers::{CloudClients, ProviderError};
use tracing::{info, warn};

/// Terminate the instance named by `INSTANCE_ID`, then clean up what was created for it.
///
/// Termination comes first and its failure is the only error returned; an instance that
/// no longer exists counts as terminated. Every cleanup
/// after it runs independently and is reported in `cleanup`; any failed cleanup turns
/// the result into a 500 payload, never an error.
pub async fn terminate(clients: &CloudClients, settings: &Settings) -> StepResult<TerminateOutput> {
    let instance_id = settings
        .instance_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(StepError::MissingEnvironment(INSTANCE_ID_ENV))?;
    logger::track(
        "TERMINATE_INSTANCE",
        Some(instance_id),
        run_terminate(clients, settings, instance_id),
    )
    .await
}

async fn run_terminate(
    clients: &CloudClients,
    settings: &Settings,
    instance_id: &str,
) -> StepResult<TerminateOutput> {
    let paths = &settings.paths;
    let alarm_param = paths.alarm_name_for(instance_id);

    // A failed lookup must not block termination; the name is derivable.
    let recorded_alarm = match clients.parameters.get_parameter(&alarm_param).await {
        Ok(value) => value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
        Err(e) => {
            warn!(instance_id, parameter = %alarm_param, error = %e, "alarm name lookup failed");
            None
        }
    };
    let alarm = recorded_alarm
        .clone()
        .unwrap_or_else(|| alarm_name(instance_id));

    // An instance that is already gone still leaves its alarm and grants behind.
    let terminated = match clients.compute.terminate_instance(instance_id).await {
        Ok(()) => {
            info!(instance_id, "instance terminating");
            CleanupOutcome::succeeded(CleanupAction::TerminateInstance, instance_id)
        }
        Err(e) if e.is_not_found() => {
            CleanupOutcome::skipped(CleanupAction::TerminateInstance, instance_id, "already gone")
        }
        Err(e) => return Err(e.into()),
    };
    let mut cleanup = vec![terminated];

    let alarm_outcome = delete_alarm(clients, &alarm).await;
    let alarm_failed = alarm_outcome.is_failed();
    cleanup.push(alarm_outcome);

    cleanup.push(if alarm_failed {
        // Keep the record so a retry can still find the alarm.
        CleanupOutcome::skipped(
            CleanupAction::DeleteAlarmParameter,
            &alarm_param,
            "alarm still present",
        )
    } else if recorded_alarm.is_none() {
        CleanupOutcome::skipped(
            CleanupAction::DeleteAlarmParameter,
            &alarm_param,
            "alarm name was not recorded",
        )
    } else {
        delete_parameter(clients, &alarm_param).await
    });

    cleanup.push(revoke_alarm_permission(clients, settings, instance_id).await);

    if settings.delete_key_pair_on_terminate {
        cleanup.extend(delete_key_pair(clients, settings).await);
    }

    for outcome in &cleanup {
        if outcome.status == CleanupStatus::Skipped {
            logger::log_quick(
                "CLEANUP_SKIPPED",
                Some(instance_id),
                outcome.error.as_deref(),
            );
        }
    }

    Ok(report(instance_id, alarm, cleanup))
}

async fn delete_alarm(clients: &CloudClients, alarm: &str) -> CleanupOutcome {
    match clients.monitoring.delete_alarm(alarm).await {
        Ok(()) => CleanupOutcome::succeeded(CleanupAction::DeleteAlarm, alarm),
        Err(e) if e.is_not_found() => {
            CleanupOutcome::skipped(CleanupAction::DeleteAlarm, alarm, "already absent")
        }
        Err(e) => failed(CleanupAction::DeleteAlarm, alarm, e),
    }
}

async fn delete_parameter(clients: &CloudClients, name: &str) -> CleanupOutcome {
    match clients.parameters.delete_parameter(name).await {
        Ok(()) => CleanupOutcome::succeeded(CleanupAction::DeleteAlarmParameter, name),
        Err(e) if e.is_not_found() => {
            CleanupOutcome::skipped(CleanupAction::DeleteAlarmParameter, name, "already absent")
        }
        Err(e) => failed(CleanupAction::DeleteAlarmParameter, name, e),
    }
}

/// Drop the statement that let this instance's alarm invoke the stop function.
async fn revoke_alarm_permission(
    clients: &CloudClients,
    settings: &Settings,
    instance_id: &str,
) -> CleanupOutcome {
    let statement_id = permission_statement_id(instance_id);
    let arn_param = settings.paths.stop_lambda_arn();
    let function_name = match clients.parameters.get_parameter(&arn_param).await {
        Ok(Some(arn)) if !arn.trim().is_empty() => arn.trim().to_string(),
        Ok(_) => {
            return CleanupOutcome::skipped(
                CleanupAction::RevokeAlarmPermission,
                &statement_id,
                "no stop function recorded",
            )
        }
        Err(e) => return failed(CleanupAction::RevokeAlarmPermission, &statement_id, e),
    };
    match clients
        .functions
        .remove_invoke_permission(&function_name, &statement_id)
        .await
    {
        Ok(()) => CleanupOutcome::succeeded(CleanupAction::RevokeAlarmPermission, &statement_id),
        Err(e) if e.is_not_found() => CleanupOutcome::skipped(
            CleanupAction::RevokeAlarmPermission,
            &statement_id,
            "already absent",
        ),
        Err(e) => failed(CleanupAction::RevokeAlarmPermission, &statement_id, e),
    }
}

/// Delete the recorded key pair and the secret holding its material.
async fn delete_key_pair(clients: &CloudClients, settings: &Settings) -> Vec<CleanupOutcome> {
    let key_param = settings.paths.key_pair_name();
    let key_name = match clients.parameters.get_parameter(&key_param).await {
        Ok(Some(name)) if !name.trim().is_empty() => name.trim().to_string(),
        Ok(_) => {
            return vec![CleanupOutcome::skipped(
                CleanupAction::DeleteKeyPair,
                &key_param,
                "no key pair recorded",
            )]
        }
        Err(e) => return vec![failed(CleanupAction::DeleteKeyPair, &key_param, e)],
    };

    let key_outcome = match clients.compute.delete_key_pair(&key_name).await {
        Ok(()) => CleanupOutcome::succeeded(CleanupAction::DeleteKeyPair, &key_name),
        Err(e) => failed(CleanupAction::DeleteKeyPair, &key_name, e),
    };

    let secret = key_secret_name(&key_name);
    let secret_outcome = match clients.secrets.delete_secret(&secret).await {
        Ok(()) => CleanupOutcome::succeeded(CleanupAction::DeleteKeySecret, &secret),
        Err(e) if e.is_not_found() => {
            CleanupOutcome::skipped(CleanupAction::DeleteKeySecret, &secret, "already absent")
        }
        Err(e) => failed(CleanupAction::DeleteKeySecret, &secret, e),
    };

    vec![key_outcome, secret_outcome]
}

fn failed(action: CleanupAction, target: &str, err: ProviderError) -> CleanupOutcome {
    warn!(?action, resource = target, error = %err, "cleanup failed");
    CleanupOutcome::failed(action, target, err.to_string())
}

fn report(instance_id: &str, alarm: String, cleanup: Vec<CleanupOutcome>) -> TerminateOutput {
    let alarm_error = cleanup
        .iter()
        .find(|c| c.action == CleanupAction::DeleteAlarm && c.is_failed())
        .and_then(|c| c.error.clone());
    let other_failures: Vec<&str> = cleanup
        .iter()
        .filter(|c| c.is_failed() && c.action != CleanupAction::DeleteAlarm)
        .map(|c| c.target.as_str())
        .collect();

    let (status_code, body) = if let Some(err) = alarm_error {
        (
            STATUS_CODE_FAILED,
            format!(
                "Terminated EC2 instance {} but failed to delete CloudWatch alarm {}: {}",
                instance_id, alarm, err
            ),
        )
    } else if !other_failures.is_empty() {
        (
            STATUS_CODE_FAILED,
            format!(
                "Terminated EC2 instance {}, deleted CloudWatch alarm {}; cleanup failed for {}",
                instance_id,
                alarm,
                other_failures.join(", ")
            ),
        )
    } else {
        (
            STATUS_CODE_OK,
            format!(
                "Terminated EC2 instance {}, deleted CloudWatch alarm {}",
                instance_id, alarm
            ),
        )
    };

    TerminateOutput {
        status_code,
        body,
        instance_id: instance_id.to_string(),
        alarm_name: alarm,
        cleanup,
    }
}
