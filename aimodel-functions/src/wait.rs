use crate::error::{StepError, StepResult};
use aimodel_providers::ComputeApi;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

/// Fixed-interval polling with a hard ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl WaitPolicy {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitReport {
    pub polls: u32,
    pub waited: Duration,
}

/// Poll until the instance reports `running`.
///
/// The first poll happens immediately. An instance the compute API does not know yet
/// is treated as still pending; one that is stopping or gone fails at once. The last
/// poll lands on the deadline, after which the wait fails with `WaitTimeout`.
pub async fn wait_until_running(
    compute: &dyn ComputeApi,
    instance_id: &str,
    policy: &WaitPolicy,
) -> StepResult<WaitReport> {
    let start = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        let last_state = match compute.instance_state(instance_id).await {
            Ok(state) if state.is_running() => {
                return Ok(WaitReport {
                    polls,
                    waited: start.elapsed(),
                });
            }
            Ok(state) if !state.can_still_become_running() => {
                return Err(StepError::InstanceNeverRunning {
                    instance_id: instance_id.to_string(),
                    state,
                });
            }
            Ok(state) => state.to_string(),
            Err(e) if e.is_not_found() => "not-found".to_string(),
            Err(e) => return Err(e.into()),
        };

        let waited = start.elapsed();
        if waited >= policy.max_wait {
            return Err(StepError::WaitTimeout {
                instance_id: instance_id.to_string(),
                last_state,
                waited,
            });
        }
        debug!(instance_id, state = %last_state, poll = polls, "instance not running yet");
        sleep(policy.interval.min(policy.max_wait - waited)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aimodel_common::InstanceState;
    use aimodel_providers::mock::{MockCloud, MockOperation};

    const ID: &str = "i-0123456789abcdef0";

    #[tokio::test(start_paused = true)]
    async fn running_instance_returns_on_first_poll() {
        let cloud = MockCloud::new();
        cloud.seed_instance(ID, InstanceState::Running);

        let report = wait_until_running(&*cloud, ID, &WaitPolicy::default())
            .await
            .unwrap();
        assert_eq!(report.polls, 1);
        assert_eq!(report.waited, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_instance_is_polled_at_the_interval() {
        let cloud = MockCloud::new();
        cloud.seed_instance(ID, InstanceState::Pending);
        cloud.script_instance_states(
            ID,
            vec![
                InstanceState::Pending,
                InstanceState::Pending,
                InstanceState::Running,
            ],
        );

        let report = wait_until_running(&*cloud, ID, &WaitPolicy::default())
            .await
            .unwrap();
        assert_eq!(report.polls, 3);
        assert_eq!(report.waited, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_instance_times_out_at_the_deadline() {
        let cloud = MockCloud::new();
        cloud.seed_instance(ID, InstanceState::Pending);
        let policy = WaitPolicy::new(Duration::from_secs(5), Duration::from_secs(12));

        let err = wait_until_running(&*cloud, ID, &policy)
            .await
            .unwrap_err();
        match err {
            StepError::WaitTimeout {
                last_state, waited, ..
            } => {
                assert_eq!(last_state, "pending");
                assert_eq!(waited, Duration::from_secs(12));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // t = 0, 5, 10, 12
        assert_eq!(cloud.count(MockOperation::InstanceState), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn terminated_instance_fails_fast() {
        let cloud = MockCloud::new();
        cloud.seed_instance(ID, InstanceState::Pending);
        cloud.script_instance_states(ID, vec![InstanceState::Pending, InstanceState::Terminated]);

        let err = wait_until_running(&*cloud, ID, &WaitPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StepError::InstanceNeverRunning {
                state: InstanceState::Terminated,
                ..
            }
        ));
        assert_eq!(cloud.count(MockOperation::InstanceState), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_instance_counts_as_pending() {
        let cloud = MockCloud::new();
        let policy = WaitPolicy::new(Duration::from_secs(5), Duration::from_secs(5));

        let err = wait_until_running(&*cloud, "i-missing", &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::WaitTimeout { ref last_state, .. } if last_state == "not-found"));
    }

    #[tokio::test(start_paused = true)]
    async fn api_errors_propagate() {
        let cloud = MockCloud::new();
        cloud.seed_instance(ID, InstanceState::Pending);
        cloud.fail(MockOperation::InstanceState, "UnauthorizedOperation");

        let err = wait_until_running(&*cloud, ID, &WaitPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Provider(_)));
    }
}
