/// Low-utilization alarm shape. Fixed per deployment, never read from configuration.
///
/// Six 5-minute periods below 5 % average CPU (30 minutes idle) fire the stop action.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmPolicy {
    pub metric_name: &'static str,
    pub namespace: &'static str,
    pub dimension_name: &'static str,
    pub statistic: &'static str,
    pub comparison_operator: &'static str,
    pub period_secs: i32,
    pub evaluation_periods: i32,
    pub datapoints_to_alarm: i32,
    pub threshold_percent: f64,
}

pub const LOW_CPU_POLICY: AlarmPolicy = AlarmPolicy {
    metric_name: "CPUUtilization",
    namespace: "AWS/EC2",
    dimension_name: "InstanceId",
    statistic: "Average",
    comparison_operator: "LessThanThreshold",
    period_secs: 300,
    evaluation_periods: 6,
    datapoints_to_alarm: 6,
    threshold_percent: 5.0,
};

impl Default for AlarmPolicy {
    fn default() -> Self {
        LOW_CPU_POLICY
    }
}

impl AlarmPolicy {
    /// How long the metric has to stay below the threshold before the alarm fires.
    pub fn idle_window_secs(&self) -> i64 {
        i64::from(self.period_secs) * i64::from(self.evaluation_periods)
    }
}
