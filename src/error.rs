use std::num::TryFromIntError;

use rusoto_cloudwatch::{GetMetricStatisticsError, PutDashboardError, PutMetricAlarmError};
use rusoto_core::RusotoError;
use rusoto_elbv2::DescribeTargetHealthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Value is None")]
    NoneValue,
    #[error("Failed to convert bigDecimal to primitive")]
    ToPrimitive,
    #[error("Failed to convert int")]
    TryFromIntError,
    #[error("Failed to render dashboard body: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    GetMetricsError(#[from] RusotoError<GetMetricStatisticsError>),
    #[error(transparent)]
    DescribeTargetHealthError(#[from] RusotoError<DescribeTargetHealthError>),
    #[error(transparent)]
    PutDashboardError(#[from] RusotoError<PutDashboardError>),
    #[error(transparent)]
    PutMetricAlarmError(#[from] RusotoError<PutMetricAlarmError>),
}

impl From<TryFromIntError> for NotifierError {
    fn from(_: TryFromIntError) -> NotifierError {
        NotifierError::TryFromIntError
    }
}
