use crate::error::StepResult;
use crate::settings::LogFormat;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Install the global subscriber. Logs go to stderr; stdout carries the step result.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}

/// Action logger for the functions. Returns the id that ties the completion event to its start.
pub fn log_event(
    action_type: &str,
    status: &str,
    instance_id: Option<&str>,
    error_message: Option<&str>,
) -> Uuid {
    log_event_with_metadata(action_type, status, instance_id, error_message, None)
}

/// Log event with metadata (context info)
pub fn log_event_with_metadata(
    action_type: &str,
    status: &str,
    instance_id: Option<&str>,
    error_message: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Uuid {
    let log_id = Uuid::new_v4();
    let metadata = metadata.map(|m| m.to_string());
    match error_message {
        Some(err) => tracing::warn!(
            %log_id,
            action_type,
            status,
            instance_id,
            metadata,
            error = err,
            "action"
        ),
        None => tracing::info!(%log_id, action_type, status, instance_id, metadata, "action"),
    }
    log_id
}

/// Log event completion with duration
pub fn log_event_complete(
    log_id: Uuid,
    action_type: &str,
    status: &str,
    duration_ms: u64,
    error_message: Option<&str>,
) {
    match error_message {
        Some(err) => tracing::error!(
            %log_id,
            action_type,
            status,
            duration_ms,
            error = err,
            "action completed"
        ),
        None => tracing::info!(%log_id, action_type, status, duration_ms, "action completed"),
    }
}

/// Run one step between an `in_progress` event and its completion event.
pub async fn track<T, F>(action_type: &str, instance_id: Option<&str>, step: F) -> StepResult<T>
where
    F: Future<Output = StepResult<T>>,
{
    let log_id = log_event(action_type, "in_progress", instance_id, None);
    let start = Instant::now();
    let result = step.await;
    let duration_ms = duration_ms(start.elapsed());
    match &result {
        Ok(_) => log_event_complete(log_id, action_type, "success", duration_ms, None),
        Err(e) => log_event_complete(
            log_id,
            action_type,
            e.log_status(),
            duration_ms,
            Some(&e.to_string()),
        ),
    }
    result
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Quick log for one-off events (like cleanup skips)
pub fn log_quick(action_type: &str, instance_id: Option<&str>, details: Option<&str>) {
    let log_id = Uuid::new_v4();
    tracing::info!(%log_id, action_type, status = "success", instance_id, details, "action");
}
