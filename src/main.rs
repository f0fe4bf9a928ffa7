mod cloud_watch_metrics_client;
mod config;
mod dashboard;
mod error;
mod event;
mod health;
mod health_gate;
mod metric;
mod pipeline;
mod retry;
mod sleep;
mod time_range;

use crate::cloud_watch_metrics_client::CloudWatchMetricsClient;
use crate::config::NotifierConfig;
use crate::dashboard::CloudWatchPublisher;
use crate::event::{HandlerResponse, InstanceStateChangeEvent};
use crate::health::TargetHealthClient;
use crate::health_gate::HealthGate;
use crate::pipeline::Notifier;
use crate::sleep::{Sleep, TokioSleep};

use anyhow::Context as _;
use chrono::Utc;
use lambda_runtime::{handler_fn, Context, Error};
use once_cell::sync::OnceCell;
use rusoto_cloudwatch::CloudWatchClient;
use rusoto_elbv2::ElbClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

static NOTIFIER: OnceCell<Notifier> = OnceCell::new();

#[tokio::main]
async fn main() -> Result<(), Error> {
    // CloudWatch Logs stamps ingestion time itself.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    let config = NotifierConfig::from_env().context("failed to load configuration")?;
    info!(
        region = config.region.name(),
        dashboard = %config.dashboard.name,
        alarms = config.alarms.len(),
        gated = config.health_gate.is_some(),
        "configuration loaded"
    );
    if NOTIFIER.set(build_notifier(config)).is_err() {
        return Err("notifier initialised twice".into());
    }

    lambda_runtime::run(handler_fn(notify_handler)).await?;
    Ok(())
}

fn build_notifier(config: NotifierConfig) -> Notifier {
    let NotifierConfig {
        region,
        dashboard,
        alarms,
        notification_targets,
        health_gate,
        api_retry,
    } = config;
    let sleeper: Arc<dyn Sleep> = Arc::new(TokioSleep);

    let gate = health_gate.map(|gate| {
        let health = TargetHealthClient::new(
            ElbClient::new(region.clone()),
            gate.target_group_arn,
            api_retry,
            sleeper.clone(),
        );
        HealthGate::new(
            Box::new(health),
            sleeper.clone(),
            gate.budget,
            gate.unexpected_state,
        )
    });
    let metrics = CloudWatchMetricsClient::new(
        CloudWatchClient::new(region.clone()),
        api_retry,
        sleeper.clone(),
    );
    let publisher = CloudWatchPublisher::new(
        CloudWatchClient::new(region),
        dashboard,
        alarms,
        notification_targets,
        api_retry,
        sleeper,
    );
    Notifier::new(gate, Box::new(metrics), Box::new(publisher))
}

async fn notify_handler(
    event: InstanceStateChangeEvent,
    context: Context,
) -> Result<HandlerResponse, Error> {
    let notifier = NOTIFIER.get().ok_or("notifier is not initialised")?;

    let now = Utc::now();
    let remaining = context
        .deadline
        .saturating_sub(now.timestamp_millis().max(0) as u64);
    notifier.check_deadline(Duration::from_millis(remaining));

    let outcome = notifier.handle(&event, now).await.map_err(|err| {
        error!(
            request_id = %context.request_id,
            instance_id = %event.instance_id(),
            error = %err,
            "failed to update dashboard"
        );
        err
    })?;
    Ok(HandlerResponse::from(outcome))
}
