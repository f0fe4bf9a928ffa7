use crate::cloud_watch_metrics_client::{
    INSTANCE_DIMENSION, METRIC_NAME, NAMESPACE, PERIOD_SECONDS, STATISTIC,
};
use crate::config::{AlarmConfig, DashboardConfig};
use crate::error::NotifierError;
use crate::event::InstanceId;
use crate::metric::MetricSample;
use crate::retry::RetryPolicy;
use crate::sleep::Sleep;
use async_trait::async_trait;

use rusoto_cloudwatch::{
    CloudWatch, CloudWatchClient, Dimension, PutDashboardInput, PutMetricAlarmInput,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const COMPARISON_OPERATOR: &str = "GreaterThanOrEqualToThreshold";
pub const EVALUATION_PERIODS: i64 = 1;

#[derive(Debug, PartialEq, Serialize)]
pub struct DashboardBody {
    pub widgets: Vec<Widget>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Widget {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub properties: Value,
}

impl DashboardBody {
    pub fn render(
        config: &DashboardConfig,
        instance_id: &InstanceId,
        sample: &MetricSample,
    ) -> Self {
        let value = sample
            .percent()
            .map_or_else(|| sample.to_string(), |percent| format!("**{:.2}%**", percent));
        let metric = [NAMESPACE, METRIC_NAME, INSTANCE_DIMENSION, instance_id.as_str()];
        DashboardBody {
            widgets: vec![
                Widget {
                    kind: "metric",
                    x: 0,
                    y: 0,
                    width: 12,
                    height: 6,
                    properties: json!({
                        "metrics": [metric],
                        "period": PERIOD_SECONDS,
                        "stat": STATISTIC,
                        "region": config.region,
                        "title": config.title,
                    }),
                },
                Widget {
                    kind: "text",
                    x: 12,
                    y: 0,
                    width: 12,
                    height: 6,
                    properties: json!({
                        "markdown": format!(
                            "## {}\nInstance `{}` average CPU utilization over the last hour: {}",
                            config.title, instance_id, value
                        ),
                    }),
                },
            ],
        }
    }
}

/// Upserts the dashboard and threshold alarms for an instance.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(
        &self,
        instance_id: &InstanceId,
        sample: &MetricSample,
    ) -> Result<(), NotifierError>;
}

pub struct CloudWatchPublisher {
    client: CloudWatchClient,
    dashboard: DashboardConfig,
    alarms: Vec<AlarmConfig>,
    notification_targets: Vec<String>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleep>,
}

#[async_trait]
impl Publish for CloudWatchPublisher {
    async fn publish(
        &self,
        instance_id: &InstanceId,
        sample: &MetricSample,
    ) -> Result<(), NotifierError> {
        let client = &self.client;

        let dashboard = self.dashboard_input(instance_id, sample)?;
        let response = self
            .retry
            .run(&*self.sleeper, "PutDashboard", move || {
                client.put_dashboard(dashboard.clone())
            })
            .await?;
        for message in response.dashboard_validation_messages.unwrap_or_default() {
            warn!(
                dashboard = %self.dashboard.name,
                data_path = ?message.data_path,
                message = ?message.message,
                "dashboard validation message"
            );
        }
        info!(dashboard = %self.dashboard.name, %instance_id, "dashboard updated");

        for alarm in self.alarm_inputs(instance_id) {
            let alarm_name = alarm.alarm_name.clone();
            self.retry
                .run(&*self.sleeper, "PutMetricAlarm", move || {
                    client.put_metric_alarm(alarm.clone())
                })
                .await?;
            info!(alarm = %alarm_name, %instance_id, "alarm updated");
        }
        Ok(())
    }
}

impl CloudWatchPublisher {
    pub fn new(
        client: CloudWatchClient,
        dashboard: DashboardConfig,
        alarms: Vec<AlarmConfig>,
        notification_targets: Vec<String>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleep>,
    ) -> Self {
        CloudWatchPublisher {
            client,
            dashboard,
            alarms,
            notification_targets,
            retry,
            sleeper,
        }
    }

    pub fn dashboard_input(
        &self,
        instance_id: &InstanceId,
        sample: &MetricSample,
    ) -> Result<PutDashboardInput, NotifierError> {
        let body = DashboardBody::render(&self.dashboard, instance_id, sample);
        Ok(PutDashboardInput {
            dashboard_name: self.dashboard.name.clone(),
            dashboard_body: serde_json::to_string(&body)?,
        })
    }

    pub fn alarm_inputs(&self, instance_id: &InstanceId) -> Vec<PutMetricAlarmInput> {
        self.alarms
            .iter()
            .map(|alarm| PutMetricAlarmInput {
                alarm_name: alarm.name.clone(),
                comparison_operator: COMPARISON_OPERATOR.to_string(),
                evaluation_periods: EVALUATION_PERIODS,
                metric_name: Some(METRIC_NAME.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                period: Some(PERIOD_SECONDS),
                statistic: Some(STATISTIC.to_string()),
                threshold: Some(alarm.threshold),
                actions_enabled: Some(!self.notification_targets.is_empty()),
                alarm_actions: Some(self.notification_targets.clone()),
                dimensions: Some(vec![Dimension {
                    name: INSTANCE_DIMENSION.to_string(),
                    value: instance_id.to_string(),
                }]),
                ..Default::default()
            })
            .collect()
    }
}
