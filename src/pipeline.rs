use crate::cloud_watch_metrics_client::Aggregate;
use crate::dashboard::Publish;
use crate::error::NotifierError;
use crate::event::{HandlerResponse, InstanceId, InstanceStateChangeEvent};
use crate::health_gate::{GateOutcome, HealthGate};
use crate::metric::MetricSample;
use crate::time_range::TimeRange;

use chrono::{DateTime, Utc};
use std::convert::TryFrom;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Published {
        instance_id: InstanceId,
        sample: MetricSample,
        gated: bool,
    },
    Skipped {
        instance_id: InstanceId,
        gate: GateOutcome,
    },
}

impl From<PipelineOutcome> for HandlerResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        match outcome {
            PipelineOutcome::Published { gated, .. } => HandlerResponse::published(gated),
            PipelineOutcome::Skipped { .. } => HandlerResponse::skipped(),
        }
    }
}

/// Optional health gate, then metric retrieval, then dashboard and alarm upserts.
pub struct Notifier {
    gate: Option<HealthGate>,
    metrics: Box<dyn Aggregate>,
    publisher: Box<dyn Publish>,
}

impl Notifier {
    pub fn new(
        gate: Option<HealthGate>,
        metrics: Box<dyn Aggregate>,
        publisher: Box<dyn Publish>,
    ) -> Self {
        Notifier {
            gate,
            metrics,
            publisher,
        }
    }

    /// Warns when the gate may outlive the invocation. `remaining` is the
    /// time left before the host aborts the invocation.
    pub fn check_deadline(&self, remaining: Duration) -> bool {
        match &self.gate {
            Some(gate) if gate.budget().worst_case_wait() >= remaining => {
                warn!(
                    worst_case_wait_secs = gate.budget().worst_case_wait().as_secs(),
                    remaining_secs = remaining.as_secs(),
                    "health check budget exceeds the remaining invocation time"
                );
                false
            }
            _ => true,
        }
    }

    pub async fn handle(
        &self,
        event: &InstanceStateChangeEvent,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, NotifierError> {
        let instance_id = event.instance_id();
        info!(
            %instance_id,
            state = ?event.detail.state,
            gated = self.gate.is_some(),
            "received instance state change"
        );

        if let Some(gate) = &self.gate {
            let outcome = gate.wait_until_healthy(instance_id).await?;
            if !outcome.is_healthy() {
                info!(
                    %instance_id,
                    attempts = outcome.attempts(),
                    minutes = gate.budget().total().as_secs_f64() / 60.0,
                    "instance did not reach a healthy state, skipping dashboard update"
                );
                return Ok(PipelineOutcome::Skipped {
                    instance_id: instance_id.clone(),
                    gate: outcome,
                });
            }
        }

        let time_range = TimeRange::try_from(now)?;
        let sample = self
            .metrics
            .aggregate_cpu_utilization(instance_id, &time_range)
            .await?;
        info!(%instance_id, cpu_utilization = %sample, "CPU utilization");

        self.publisher.publish(instance_id, &sample).await?;

        Ok(PipelineOutcome::Published {
            instance_id: instance_id.clone(),
            sample,
            gated: self.gate.is_some(),
        })
    }
}
