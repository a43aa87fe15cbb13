mod common;

use aimodel_common::payload::{CleanupAction, CleanupStatus, InstanceEvent, UpdateStopTargetEvent};
use aimodel_functions::alarm_configurator::configure_alarm;
use aimodel_functions::stop_target_updater::update_stop_target;
use aimodel_functions::terminator::terminate;
use aimodel_functions::StepError;
use aimodel_providers::mock::MockOperation;
use aimodel_providers::requests::ALARM_INVOKE_PRINCIPAL;
use aimodel_common::InstanceState;
use common::*;

const FIRST: &str = "i-0aaaaaaaaaaaaaaa1";
const SECOND: &str = "i-0bbbbbbbbbbbbbbb2";

fn event(instance_id: &str) -> InstanceEvent {
    InstanceEvent {
        instance_id: instance_id.to_string(),
    }
}

fn retarget(instance_id: &str) -> UpdateStopTargetEvent {
    UpdateStopTargetEvent {
        instance_id: instance_id.to_string(),
        function_name: Some(STOP_FUNCTION_ARN.to_string()),
    }
}

#[tokio::test]
async fn alarm_is_created_with_the_idle_policy() {
    let t = TestCloud::new().with_running_instance(FIRST);

    let out = configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();

    assert_eq!(out.status_code, 200);
    assert_eq!(out.alarm_name, format!("LowCpuAlarm-{}", FIRST));
    let alarm = t.cloud.alarm(&out.alarm_name).unwrap();
    assert_eq!(alarm.instance_id, FIRST);
    assert_eq!(alarm.action_arn, STOP_FUNCTION_ARN);
    assert_eq!(alarm.policy.metric_name, "CPUUtilization");
    assert_eq!(alarm.policy.period_secs, 300);
    assert_eq!(alarm.policy.evaluation_periods, 6);
    assert_eq!(alarm.policy.threshold_percent, 5.0);
    assert_eq!(
        t.cloud
            .parameter(&format!("/ai-model/cloudwatch-alarm-name/{}", FIRST))
            .as_deref(),
        Some(out.alarm_name.as_str())
    );
    // The shared, un-namespaced key is never written.
    assert_eq!(t.cloud.parameter("/ai-model/cloudwatch-alarm-name"), None);
}

#[tokio::test]
async fn permission_is_granted_before_the_alarm_and_scoped_to_it() {
    let t = TestCloud::new();

    configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();

    let ops: Vec<MockOperation> = t.cloud.calls().into_iter().map(|c| c.operation).collect();
    let grant = ops
        .iter()
        .position(|op| *op == MockOperation::AddInvokePermission)
        .unwrap();
    let alarm = ops
        .iter()
        .position(|op| *op == MockOperation::PutMetricAlarm)
        .unwrap();
    assert!(grant < alarm);

    let permissions = t.cloud.permissions();
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].principal, ALARM_INVOKE_PRINCIPAL);
    assert_eq!(
        permissions[0].source_arn,
        format!(
            "arn:aws:cloudwatch:eu-west-1:123456789012:alarm:LowCpuAlarm-{}",
            FIRST
        )
    );
}

#[tokio::test]
async fn reconfiguring_is_idempotent() {
    let t = TestCloud::new();

    configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();
    let again = configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();

    assert_eq!(again.status_code, 200);
    assert_eq!(t.cloud.permissions().len(), 1);
    assert_eq!(t.cloud.alarm_names().len(), 1);
}

#[tokio::test]
async fn concurrent_configurations_keep_separate_bookkeeping() {
    let t = TestCloud::new();

    let (a, b) = tokio::join!(
        configure_alarm(&t.clients, &t.settings, &event(FIRST)),
        configure_alarm(&t.clients, &t.settings, &event(SECOND)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.alarm_name, b.alarm_name);
    assert_eq!(t.cloud.alarm_names().len(), 2);
    assert_eq!(
        t.cloud
            .parameter(&format!("/ai-model/cloudwatch-alarm-name/{}", FIRST)),
        Some(a.alarm_name)
    );
    assert_eq!(
        t.cloud
            .parameter(&format!("/ai-model/cloudwatch-alarm-name/{}", SECOND)),
        Some(b.alarm_name)
    );
}

#[tokio::test]
async fn malformed_stop_function_arn_fails_before_any_write() {
    let t = TestCloud::new();
    t.cloud
        .set_parameter("/ai-model/stop-lambda-arn", "ai-model-stop-instance");

    let err = configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap_err();

    assert!(matches!(err, StepError::Naming(_)));
    assert!(t.cloud.alarm_names().is_empty());
    assert!(t.cloud.permissions().is_empty());
}

#[tokio::test]
async fn updater_sets_instance_id_and_keeps_other_variables() {
    let t = TestCloud::new();

    let out = update_stop_target(&t.clients, &t.settings, &retarget(FIRST))
        .await
        .unwrap();

    assert_eq!(out.status, "Environment variable updated");
    assert_eq!(out.instance_id, FIRST);
    let env = t.cloud.environment(STOP_FUNCTION_ARN).unwrap();
    assert_eq!(env.get("INSTANCE_ID").map(String::as_str), Some(FIRST));
    assert_eq!(env.get("LOG_LEVEL").map(String::as_str), Some("info"));
}

#[tokio::test]
async fn updater_falls_back_to_the_configured_stop_function() {
    let t = TestCloud::new();
    let event = UpdateStopTargetEvent {
        instance_id: FIRST.to_string(),
        function_name: None,
    };

    let out = update_stop_target(&t.clients, &t.settings, &event)
        .await
        .unwrap();

    assert_eq!(out.function_name, STOP_FUNCTION_ARN);
}

#[tokio::test]
async fn updater_reports_unknown_function() {
    let t = TestCloud::new();
    let event = UpdateStopTargetEvent {
        instance_id: FIRST.to_string(),
        function_name: Some("no-such-function".to_string()),
    };

    let err = update_stop_target(&t.clients, &t.settings, &event)
        .await
        .unwrap_err();

    assert!(matches!(err, StepError::Provider(ref e) if e.is_not_found()));
}

#[tokio::test]
async fn terminator_deletes_the_alarm_configured_for_its_instance() {
    let t = TestCloud::new()
        .with_running_instance(FIRST)
        .with_running_instance(SECOND);
    let first = configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();
    let second = configure_alarm(&t.clients, &t.settings, &event(SECOND))
        .await
        .unwrap();
    update_stop_target(&t.clients, &t.settings, &retarget(FIRST))
        .await
        .unwrap();

    let out = terminate(&t.clients, &t.stop_function_settings())
        .await
        .unwrap();

    assert!(out.is_success(), "{}", out.body);
    assert_eq!(out.instance_id, FIRST);
    assert_eq!(out.alarm_name, first.alarm_name);
    assert_eq!(t.cloud.alarm_names(), vec![second.alarm_name]);
    assert_eq!(
        t.cloud.instance(FIRST).unwrap().state,
        InstanceState::Terminated
    );
    assert_eq!(t.cloud.instance(SECOND).unwrap().state, InstanceState::Running);
    assert_eq!(
        t.cloud
            .parameter(&format!("/ai-model/cloudwatch-alarm-name/{}", FIRST)),
        None
    );
    assert!(t
        .cloud
        .parameter(&format!("/ai-model/cloudwatch-alarm-name/{}", SECOND))
        .is_some());
}

#[tokio::test]
async fn alarm_deletion_failure_is_a_500_payload_after_termination() {
    let t = TestCloud::new().with_running_instance(FIRST);
    let configured = configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();
    update_stop_target(&t.clients, &t.settings, &retarget(FIRST))
        .await
        .unwrap();
    t.cloud.fail(MockOperation::DeleteAlarm, "AccessDenied");

    let out = terminate(&t.clients, &t.stop_function_settings())
        .await
        .unwrap();

    assert_eq!(out.status_code, 500);
    assert!(out.body.contains(FIRST));
    assert!(out.body.contains(&configured.alarm_name));
    assert_eq!(
        t.cloud.instance(FIRST).unwrap().state,
        InstanceState::Terminated
    );
    let alarm = out.outcome(CleanupAction::DeleteAlarm).unwrap();
    assert_eq!(alarm.status, CleanupStatus::Failed);
    // Bookkeeping survives so a retry can still find the alarm.
    let param = out.outcome(CleanupAction::DeleteAlarmParameter).unwrap();
    assert_eq!(param.status, CleanupStatus::Skipped);
    assert!(t
        .cloud
        .parameter(&format!("/ai-model/cloudwatch-alarm-name/{}", FIRST))
        .is_some());
}

#[tokio::test]
async fn termination_failure_is_an_error_and_nothing_else_runs() {
    let t = TestCloud::new().with_running_instance(FIRST);
    configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();
    update_stop_target(&t.clients, &t.settings, &retarget(FIRST))
        .await
        .unwrap();
    t.cloud.fail(MockOperation::TerminateInstance, "UnauthorizedOperation");

    let err = terminate(&t.clients, &t.stop_function_settings())
        .await
        .unwrap_err();

    assert!(matches!(err, StepError::Provider(_)));
    assert_eq!(t.cloud.count(MockOperation::DeleteAlarm), 0);
    assert_eq!(t.cloud.alarm_names().len(), 1);
}

#[tokio::test]
async fn terminator_without_instance_id_fails() {
    let t = TestCloud::new();

    let err = terminate(&t.clients, &t.settings).await.unwrap_err();

    assert!(matches!(err, StepError::MissingEnvironment("INSTANCE_ID")));
    assert!(t.cloud.calls().is_empty());
}

#[tokio::test]
async fn unrecorded_alarm_falls_back_to_the_derived_name() {
    let t = TestCloud::new().with_running_instance(FIRST);
    let mut settings = t.settings.clone();
    settings.instance_id = Some(FIRST.to_string());

    let out = terminate(&t.clients, &settings).await.unwrap();

    assert!(out.is_success());
    assert_eq!(out.alarm_name, format!("LowCpuAlarm-{}", FIRST));
    assert_eq!(
        out.outcome(CleanupAction::DeleteAlarm).unwrap().status,
        CleanupStatus::Skipped
    );
}

#[tokio::test]
async fn key_pair_cleanup_is_opt_in() {
    let t = TestCloud::new().with_running_instance(FIRST);
    t.cloud.seed_key_pair(KEY_NAME);
    t.cloud.seed_secret(KEY_SECRET, "material");
    t.cloud.set_parameter("/ai-model/key-pair-name", KEY_NAME);
    let mut settings = t.settings.clone();
    settings.instance_id = Some(FIRST.to_string());

    let out = terminate(&t.clients, &settings).await.unwrap();
    assert!(out.outcome(CleanupAction::DeleteKeyPair).is_none());
    assert_eq!(t.cloud.key_pair_count(), 1);

    settings.delete_key_pair_on_terminate = true;
    let out = terminate(&t.clients, &settings).await.unwrap();
    assert!(out.is_success(), "{}", out.body);
    assert_eq!(
        out.outcome(CleanupAction::DeleteKeyPair).unwrap().status,
        CleanupStatus::Succeeded
    );
    assert_eq!(
        out.outcome(CleanupAction::DeleteKeySecret).unwrap().status,
        CleanupStatus::Succeeded
    );
    assert_eq!(t.cloud.key_pair_count(), 0);
    assert_eq!(t.cloud.secret_count(), 0);
}

#[tokio::test]
async fn key_secret_failure_fails_the_payload_but_not_the_call() {
    let t = TestCloud::new().with_running_instance(FIRST);
    t.cloud.seed_key_pair(KEY_NAME);
    t.cloud.seed_secret(KEY_SECRET, "material");
    t.cloud.set_parameter("/ai-model/key-pair-name", KEY_NAME);
    t.cloud.fail(MockOperation::DeleteSecret, "AccessDenied");
    let mut settings = t.settings.clone();
    settings.instance_id = Some(FIRST.to_string());
    settings.delete_key_pair_on_terminate = true;

    let out = terminate(&t.clients, &settings).await.unwrap();

    assert_eq!(out.status_code, 500);
    assert!(out.body.contains(KEY_SECRET));
    assert_eq!(t.cloud.key_pair_count(), 0);
}

#[tokio::test]
async fn teardown_revokes_the_alarm_invoke_grant() {
    let t = TestCloud::new()
        .with_running_instance(FIRST)
        .with_running_instance(SECOND);
    configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();
    configure_alarm(&t.clients, &t.settings, &event(SECOND))
        .await
        .unwrap();
    update_stop_target(&t.clients, &t.settings, &retarget(FIRST))
        .await
        .unwrap();

    let out = terminate(&t.clients, &t.stop_function_settings())
        .await
        .unwrap();

    assert!(out.is_success(), "{}", out.body);
    assert_eq!(
        out.outcome(CleanupAction::RevokeAlarmPermission).unwrap().status,
        CleanupStatus::Succeeded
    );
    let remaining: Vec<String> = t
        .cloud
        .permissions()
        .into_iter()
        .map(|p| p.statement_id)
        .collect();
    assert_eq!(remaining, vec![format!("AllowAlarmInvoke-{}", SECOND)]);
}

#[tokio::test]
async fn permission_revocation_failure_fails_the_payload() {
    let t = TestCloud::new().with_running_instance(FIRST);
    configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();
    update_stop_target(&t.clients, &t.settings, &retarget(FIRST))
        .await
        .unwrap();
    t.cloud
        .fail(MockOperation::RemoveInvokePermission, "AccessDeniedException");

    let out = terminate(&t.clients, &t.stop_function_settings())
        .await
        .unwrap();

    assert_eq!(out.status_code, 500);
    assert!(out.body.contains(&format!("AllowAlarmInvoke-{}", FIRST)));
    assert!(t.cloud.alarm_names().is_empty());
}

#[tokio::test]
async fn retried_teardown_finishes_the_cleanup() {
    let t = TestCloud::new().with_running_instance(FIRST);
    configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();
    update_stop_target(&t.clients, &t.settings, &retarget(FIRST))
        .await
        .unwrap();
    let settings = t.stop_function_settings();
    t.cloud.fail(MockOperation::DeleteAlarm, "ThrottlingException");

    let first = terminate(&t.clients, &settings).await.unwrap();
    assert_eq!(first.status_code, 500);
    assert_eq!(t.cloud.alarm_names().len(), 1);

    t.cloud.clear_failure(MockOperation::DeleteAlarm);
    let second = terminate(&t.clients, &settings).await.unwrap();

    assert!(second.is_success(), "{}", second.body);
    assert_eq!(
        second.outcome(CleanupAction::DeleteAlarm).unwrap().status,
        CleanupStatus::Succeeded
    );
    assert!(t.cloud.alarm_names().is_empty());
    assert_eq!(
        t.cloud
            .parameter(&format!("/ai-model/cloudwatch-alarm-name/{}", FIRST)),
        None
    );
}

#[tokio::test]
async fn vanished_instance_still_gets_its_cleanup() {
    // The instance is unknown to the cloud, as after EC2 has purged it.
    let t = TestCloud::new();
    configure_alarm(&t.clients, &t.settings, &event(FIRST))
        .await
        .unwrap();
    update_stop_target(&t.clients, &t.settings, &retarget(FIRST))
        .await
        .unwrap();

    let out = terminate(&t.clients, &t.stop_function_settings())
        .await
        .unwrap();

    assert!(out.is_success(), "{}", out.body);
    assert_eq!(
        out.outcome(CleanupAction::TerminateInstance).unwrap().status,
        CleanupStatus::Skipped
    );
    assert!(t.cloud.alarm_names().is_empty());
    assert!(t.cloud.permissions().is_empty());
}
