use crate::error::NotifierError;
use crate::event::InstanceId;
use crate::retry::RetryPolicy;
use crate::sleep::Sleep;
use async_trait::async_trait;

use rusoto_elbv2::{
    DescribeTargetHealthInput, Elb, ElbClient, TargetDescription, TargetHealthDescription,
};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Target state as reported by the load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
    Initial,
    Healthy,
    Unhealthy,
    UnhealthyDraining,
    Unused,
    Draining,
    Unavailable,
    Unrecognized(String),
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        *self == HealthState::Healthy
    }

    /// States a freshly registered instance passes through on its way to healthy.
    pub fn is_expected_transition(&self) -> bool {
        matches!(self, HealthState::Initial | HealthState::Unhealthy)
    }
}

impl From<&str> for HealthState {
    fn from(state: &str) -> Self {
        match state {
            "initial" => HealthState::Initial,
            "healthy" => HealthState::Healthy,
            "unhealthy" => HealthState::Unhealthy,
            "unhealthy.draining" => HealthState::UnhealthyDraining,
            "unused" => HealthState::Unused,
            "draining" => HealthState::Draining,
            "unavailable" => HealthState::Unavailable,
            other => HealthState::Unrecognized(other.to_string()),
        }
    }
}

impl Display for HealthState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let state = match self {
            HealthState::Initial => "initial",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
            HealthState::UnhealthyDraining => "unhealthy.draining",
            HealthState::Unused => "unused",
            HealthState::Draining => "draining",
            HealthState::Unavailable => "unavailable",
            HealthState::Unrecognized(state) => state,
        };
        f.write_str(state)
    }
}

#[async_trait]
pub trait DescribeHealth: Send + Sync {
    /// Current state of the instance, or `None` when the target group does
    /// not report it.
    async fn describe_health(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<HealthState>, NotifierError>;
}

pub struct TargetHealthClient {
    client: ElbClient,
    target_group_arn: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleep>,
}

#[async_trait]
impl DescribeHealth for TargetHealthClient {
    async fn describe_health(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<HealthState>, NotifierError> {
        let input = DescribeTargetHealthInput {
            target_group_arn: self.target_group_arn.clone(),
            targets: Some(vec![TargetDescription {
                id: instance_id.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let client = &self.client;
        let output = self
            .retry
            .run(&*self.sleeper, "DescribeTargetHealth", move || {
                client.describe_target_health(input.clone())
            })
            .await?;
        Ok(Self::find_state(
            output.target_health_descriptions,
            instance_id,
        ))
    }
}

impl TargetHealthClient {
    pub fn new(
        client: ElbClient,
        target_group_arn: String,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleep>,
    ) -> Self {
        TargetHealthClient {
            client,
            target_group_arn,
            retry,
            sleeper,
        }
    }

    fn find_state(
        descriptions: Option<Vec<TargetHealthDescription>>,
        instance_id: &InstanceId,
    ) -> Option<HealthState> {
        descriptions
            .unwrap_or_default()
            .into_iter()
            .find(|description| {
                description
                    .target
                    .as_ref()
                    .map_or(false, |target| target.id == instance_id.as_str())
            })
            .map(|description| {
                description
                    .target_health
                    .and_then(|health| health.state)
                    .map_or(HealthState::Unavailable, |state| {
                        HealthState::from(state.as_str())
                    })
            })
    }
}
