//! Bounded, fixed-interval poll of the load balancer until an instance
//! reports `healthy`.
//!
//! ```text
//! Polling { attempts: 0 }
//!   ├── healthy                    -> Succeeded
//!   ├── initial / unhealthy        -> Polling { attempts + 1 }  (sleep T)
//!   ├── not registered yet         -> Polling { attempts + 1 }  (sleep T)
//!   ├── other state, keep-polling  -> Polling { attempts + 1 }  (sleep T)
//!   ├── other state, fail-fast     -> Abandoned
//!   └── attempts == N              -> Exhausted
//! ```
//!
//! The gate sleeps only between attempts: an exhausted gate has issued N
//! queries and N - 1 sleeps.

use crate::error::NotifierError;
use crate::event::InstanceId;
use crate::health::{DescribeHealth, HealthState};
use crate::sleep::Sleep;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBudget {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        RetryBudget {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Upper bound on time spent sleeping before the gate gives up.
    /// Saturates at `Duration::MAX`.
    pub fn worst_case_wait(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts.saturating_sub(1))
            .unwrap_or(Duration::MAX)
    }

    pub fn total(&self) -> Duration {
        self.checked_total().unwrap_or(Duration::MAX)
    }

    pub fn checked_total(&self) -> Option<Duration> {
        self.interval.checked_mul(self.max_attempts)
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        RetryBudget::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INTERVAL)
    }
}

/// What to do with states other than `healthy`, `initial` and `unhealthy`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnexpectedStatePolicy {
    KeepPolling,
    FailFast,
}

impl Default for UnexpectedStatePolicy {
    fn default() -> Self {
        UnexpectedStatePolicy::KeepPolling
    }
}

impl FromStr for UnexpectedStatePolicy {
    type Err = String;

    fn from_str(policy: &str) -> Result<Self, Self::Err> {
        match policy {
            "keep-polling" => Ok(UnexpectedStatePolicy::KeepPolling),
            "fail-fast" => Ok(UnexpectedStatePolicy::FailFast),
            other => Err(format!(
                "unknown policy {:?}, expected keep-polling or fail-fast",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Healthy { attempts: u32 },
    Exhausted { attempts: u32 },
    Abandoned { attempts: u32, state: HealthState },
}

impl GateOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, GateOutcome::Healthy { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            GateOutcome::Healthy { attempts }
            | GateOutcome::Exhausted { attempts }
            | GateOutcome::Abandoned { attempts, .. } => attempts,
        }
    }
}

#[derive(Debug, PartialEq)]
enum GateState {
    Polling { attempts: u32 },
    Done(GateOutcome),
}

impl GateState {
    /// Folds one observation into the state. `attempts` counts the query
    /// that produced `observed`.
    fn observe(
        attempts: u32,
        observed: Option<HealthState>,
        budget: &RetryBudget,
        policy: UnexpectedStatePolicy,
    ) -> GateState {
        match observed {
            Some(HealthState::Healthy) => {
                return GateState::Done(GateOutcome::Healthy { attempts });
            }
            Some(state)
                if !state.is_expected_transition()
                    && policy == UnexpectedStatePolicy::FailFast =>
            {
                return GateState::Done(GateOutcome::Abandoned { attempts, state });
            }
            _ => {}
        }
        if attempts >= budget.max_attempts {
            GateState::Done(GateOutcome::Exhausted { attempts })
        } else {
            GateState::Polling { attempts }
        }
    }
}

pub struct HealthGate {
    health: Box<dyn DescribeHealth>,
    sleeper: Arc<dyn Sleep>,
    budget: RetryBudget,
    policy: UnexpectedStatePolicy,
}

impl HealthGate {
    pub fn new(
        health: Box<dyn DescribeHealth>,
        sleeper: Arc<dyn Sleep>,
        budget: RetryBudget,
        policy: UnexpectedStatePolicy,
    ) -> Self {
        HealthGate {
            health,
            sleeper,
            budget,
            policy,
        }
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    pub async fn wait_until_healthy(
        &self,
        instance_id: &InstanceId,
    ) -> Result<GateOutcome, NotifierError> {
        let mut state = GateState::Polling { attempts: 0 };
        loop {
            let attempts = match state {
                GateState::Done(outcome) => return Ok(outcome),
                GateState::Polling { attempts } => attempts,
            };
            if attempts > 0 {
                self.sleeper.sleep(self.budget.interval).await;
            }
            let attempt = attempts + 1;
            let observed = self.health.describe_health(instance_id).await?;
            self.log_observation(instance_id, attempt, observed.as_ref());
            state = GateState::observe(attempt, observed, &self.budget, self.policy);
        }
    }

    fn log_observation(
        &self,
        instance_id: &InstanceId,
        attempt: u32,
        observed: Option<&HealthState>,
    ) {
        let max_attempts = self.budget.max_attempts;
        match observed {
            Some(state) if state.is_healthy() => {
                info!(%instance_id, attempt, max_attempts, %state, "health check state")
            }
            Some(state) if state.is_expected_transition() => info!(
                %instance_id,
                attempt,
                max_attempts,
                %state,
                "instance is not healthy yet, retrying"
            ),
            Some(state) => warn!(
                %instance_id,
                attempt,
                max_attempts,
                %state,
                policy = ?self.policy,
                "unexpected health check state"
            ),
            None => info!(
                %instance_id,
                attempt,
                max_attempts,
                "instance not registered in target group yet"
            ),
        }
    }
}
