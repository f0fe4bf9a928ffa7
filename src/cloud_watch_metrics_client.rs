use crate::error::NotifierError;
use crate::event::InstanceId;
use crate::retry::RetryPolicy;
use crate::sleep::Sleep;
use async_trait::async_trait;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use rusoto_cloudwatch::{
    CloudWatch, CloudWatchClient, Datapoint, Dimension, GetMetricStatisticsInput,
};

use crate::metric::MetricSample;
use crate::time_range::TimeRange;
use std::convert::TryFrom;
use std::ops::{Add, Div};
use std::sync::Arc;

pub const NAMESPACE: &str = "AWS/EC2";
pub const METRIC_NAME: &str = "CPUUtilization";
pub const INSTANCE_DIMENSION: &str = "InstanceId";
pub const PERIOD_SECONDS: i64 = 300;
pub const STATISTIC: &str = "Average";
const UNIT: &str = "Percent";

pub struct CloudWatchMetricsClient {
    client: CloudWatchClient,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleep>,
}

#[async_trait]
pub trait Aggregate: Send + Sync {
    async fn aggregate_cpu_utilization(
        &self,
        instance_id: &InstanceId,
        time_range: &TimeRange,
    ) -> Result<MetricSample, NotifierError>;
}

#[async_trait]
impl Aggregate for CloudWatchMetricsClient {
    async fn aggregate_cpu_utilization(
        &self,
        instance_id: &InstanceId,
        time_range: &TimeRange,
    ) -> Result<MetricSample, NotifierError> {
        let input = Self::statistics_input(instance_id, time_range);
        let client = &self.client;
        let metrics = self
            .retry
            .run(&*self.sleeper, "GetMetricStatistics", move || {
                client.get_metric_statistics(input.clone())
            })
            .await?;
        self.aggregate_data_points(metrics.datapoints)
    }
}

impl CloudWatchMetricsClient {
    pub fn new(client: CloudWatchClient, retry: RetryPolicy, sleeper: Arc<dyn Sleep>) -> Self {
        CloudWatchMetricsClient {
            client,
            retry,
            sleeper,
        }
    }

    fn statistics_input(
        instance_id: &InstanceId,
        time_range: &TimeRange,
    ) -> GetMetricStatisticsInput {
        GetMetricStatisticsInput {
            start_time: time_range.start_timestamp(),
            end_time: time_range.end_timestamp(),
            metric_name: METRIC_NAME.to_string(),
            namespace: NAMESPACE.to_string(),
            period: PERIOD_SECONDS,
            dimensions: Some(vec![Dimension {
                name: INSTANCE_DIMENSION.to_string(),
                value: instance_id.to_string(),
            }]),
            statistics: Some(vec![STATISTIC.to_string()]),
            unit: Some(UNIT.to_string()),
            ..Default::default()
        }
    }

    /// Mean of the per-period averages in the window.
    fn aggregate_data_points(
        &self,
        data_points: Option<Vec<Datapoint>>,
    ) -> Result<MetricSample, NotifierError> {
        let data_points = data_points.unwrap_or_default();
        if data_points.is_empty() {
            return Ok(MetricSample::NoData);
        }
        let mut total = BigDecimal::from(0);
        let length = u32::try_from(data_points.len())?;
        let count = BigDecimal::from(length);
        for data_point in data_points {
            let average = data_point
                .average
                .map(|average| {
                    BigDecimal::from_f64(average).map_or(BigDecimal::from(0), |average| average)
                })
                .ok_or(NotifierError::NoneValue)?;
            total = total.add(average);
        }

        let decimal_average = total.div(count);
        let average = decimal_average
            .to_f64()
            .ok_or(NotifierError::ToPrimitive)?;
        Ok(MetricSample::Percent(average))
    }
}
