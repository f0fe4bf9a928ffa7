use crate::health_gate::{
    RetryBudget, UnexpectedStatePolicy, DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS,
};
use crate::retry::RetryPolicy;

use anyhow::{anyhow, bail, Context};
use rusoto_core::Region;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REGION: Region = Region::ApSouth1;
pub const DEFAULT_DASHBOARD_TITLE: &str = "EC2 Instance CPU Utilization";

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub name: String,
    pub title: String,
    pub region: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            name: String::new(),
            title: DEFAULT_DASHBOARD_TITLE.to_string(),
            region: DEFAULT_REGION.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmConfig {
    pub name: String,
    pub threshold: f64,
}

impl AlarmConfig {
    pub fn new(name: impl Into<String>, threshold: f64) -> Self {
        AlarmConfig {
            name: name.into(),
            threshold,
        }
    }

    pub fn metric_only_defaults() -> Vec<AlarmConfig> {
        vec![AlarmConfig::new("CPUUtilizationAlarm", 75.0)]
    }

    pub fn health_gated_defaults() -> Vec<AlarmConfig> {
        vec![
            AlarmConfig::new("CPUUtilizationAlarm75", 75.0),
            AlarmConfig::new("CPUUtilizationAlarm100", 100.0),
        ]
    }
}

impl FromStr for AlarmConfig {
    type Err = anyhow::Error;

    /// Parses `name=threshold`.
    fn from_str(pair: &str) -> Result<Self, Self::Err> {
        let (name, threshold) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("alarm {:?} is not of the form name=threshold", pair))?;
        let name = name.trim();
        if name.is_empty() {
            bail!("alarm {:?} has an empty name", pair);
        }
        let threshold = threshold
            .trim()
            .parse::<f64>()
            .with_context(|| format!("alarm {:?} has an invalid threshold", pair))?;
        if !threshold.is_finite() {
            bail!("alarm {:?} threshold must be a finite number", pair);
        }
        Ok(AlarmConfig::new(name, threshold))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthGateConfig {
    pub target_group_arn: String,
    pub budget: RetryBudget,
    pub unexpected_state: UnexpectedStatePolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifierConfig {
    pub region: Region,
    pub dashboard: DashboardConfig,
    pub alarms: Vec<AlarmConfig>,
    pub notification_targets: Vec<String>,
    pub health_gate: Option<HealthGateConfig>,
    pub api_retry: RetryPolicy,
}

impl NotifierConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let variables: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|key| variables.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let region = match lookup("AWS_REGION") {
            Some(region) => Region::from_str(region.trim())
                .with_context(|| format!("AWS_REGION {:?} is not a known region", region))?,
            None => DEFAULT_REGION,
        };

        let dashboard = DashboardConfig {
            name: lookup("DASHBOARD_NAME").context("DASHBOARD_NAME must be set")?,
            title: lookup("DASHBOARD_TITLE")
                .unwrap_or_else(|| DEFAULT_DASHBOARD_TITLE.to_string()),
            region: region.name().to_string(),
        };

        let notification_targets = lookup("ALARM_NOTIFICATION_TARGETS")
            .map(|targets| split_list(&targets))
            .unwrap_or_default();

        let health_gate = match lookup("TARGET_GROUP_ARN") {
            Some(target_group_arn) => {
                let max_attempts =
                    parse_or(&lookup, "HEALTH_CHECK_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
                if max_attempts == 0 {
                    bail!("HEALTH_CHECK_MAX_ATTEMPTS must be at least 1");
                }
                let interval = parse_or(
                    &lookup,
                    "HEALTH_CHECK_INTERVAL_SECS",
                    DEFAULT_INTERVAL.as_secs(),
                )?;
                let budget = RetryBudget::new(max_attempts, Duration::from_secs(interval));
                if budget.checked_total().is_none() {
                    bail!(
                        "HEALTH_CHECK_INTERVAL_SECS {} times HEALTH_CHECK_MAX_ATTEMPTS {} \
                         is too long",
                        interval,
                        max_attempts
                    );
                }
                let unexpected_state = match lookup("HEALTH_CHECK_UNEXPECTED_STATE") {
                    Some(policy) => policy
                        .trim()
                        .parse::<UnexpectedStatePolicy>()
                        .map_err(|error| anyhow!("HEALTH_CHECK_UNEXPECTED_STATE: {}", error))?,
                    None => UnexpectedStatePolicy::default(),
                };
                Some(HealthGateConfig {
                    target_group_arn: target_group_arn.trim().to_string(),
                    budget,
                    unexpected_state,
                })
            }
            None => None,
        };

        let alarms = match lookup("ALARMS") {
            Some(alarms) => split_list(&alarms)
                .iter()
                .map(|pair| pair.parse::<AlarmConfig>())
                .collect::<anyhow::Result<Vec<_>>>()
                .context("ALARMS is invalid")?,
            None if health_gate.is_some() => AlarmConfig::health_gated_defaults(),
            None => AlarmConfig::metric_only_defaults(),
        };

        let defaults = RetryPolicy::default();
        let api_retry = RetryPolicy::new(
            parse_or(&lookup, "API_RETRY_MAX_ATTEMPTS", defaults.max_attempts())?,
            Duration::from_millis(parse_or(
                &lookup,
                "API_RETRY_BASE_DELAY_MS",
                defaults.base_delay().as_millis() as u64,
            )?),
        );
        if api_retry.checked_longest_delay().is_none() {
            bail!("API_RETRY_BASE_DELAY_MS {:?} is too long", api_retry.base_delay());
        }

        Ok(NotifierConfig {
            region,
            dashboard,
            alarms,
            notification_targets,
            health_gate,
            api_retry,
        })
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} {:?} is not a valid number", key, value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{AlarmConfig, NotifierConfig};
    use crate::health_gate::{RetryBudget, UnexpectedStatePolicy};
    use crate::retry::RetryPolicy;
    use rusoto_core::Region;
    use std::collections::HashMap;
    use std::time::Duration;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<NotifierConfig> {
        let variables: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        NotifierConfig::from_lookup(|key| variables.get(key).cloned())
    }

    #[test]
    fn test_metric_only_defaults() {
        let config = load(&[("DASHBOARD_NAME", "web-servers")]).unwrap();

        assert_eq!(config.region, Region::ApSouth1);
        assert_eq!(config.dashboard.name, "web-servers");
        assert_eq!(config.dashboard.title, "EC2 Instance CPU Utilization");
        assert_eq!(config.dashboard.region, "ap-south-1");
        assert_eq!(
            config.alarms,
            vec![AlarmConfig::new("CPUUtilizationAlarm", 75.0)]
        );
        assert!(config.notification_targets.is_empty());
        assert_eq!(config.health_gate, None);
        assert_eq!(config.api_retry, RetryPolicy::default());
    }

    #[test]
    fn test_health_gated_defaults() {
        let config = load(&[
            ("DASHBOARD_NAME", "web-servers"),
            (
                "TARGET_GROUP_ARN",
                "arn:aws:elasticloadbalancing:ap-south-1:123456789012:targetgroup/web/1",
            ),
            (
                "ALARM_NOTIFICATION_TARGETS",
                "arn:aws:sns:ap-south-1:123456789012:a, arn:aws:sns:ap-south-1:123456789012:b",
            ),
        ])
        .unwrap();

        let gate = config.health_gate.unwrap();
        assert_eq!(gate.budget, RetryBudget::new(16, Duration::from_secs(30)));
        assert_eq!(gate.unexpected_state, UnexpectedStatePolicy::KeepPolling);
        assert_eq!(
            config.alarms,
            vec![
                AlarmConfig::new("CPUUtilizationAlarm75", 75.0),
                AlarmConfig::new("CPUUtilizationAlarm100", 100.0),
            ]
        );
        assert_eq!(config.notification_targets.len(), 2);
        assert_eq!(
            config.notification_targets[1],
            "arn:aws:sns:ap-south-1:123456789012:b"
        );
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("AWS_REGION", "us-east-1"),
            ("DASHBOARD_NAME", "web-servers"),
            ("DASHBOARD_TITLE", "web"),
            ("TARGET_GROUP_ARN", "arn"),
            ("HEALTH_CHECK_MAX_ATTEMPTS", "4"),
            ("HEALTH_CHECK_INTERVAL_SECS", "5"),
            ("HEALTH_CHECK_UNEXPECTED_STATE", "fail-fast"),
            ("ALARMS", "warn=60, critical=90.5"),
            ("API_RETRY_MAX_ATTEMPTS", "5"),
            ("API_RETRY_BASE_DELAY_MS", "50"),
        ])
        .unwrap();

        assert_eq!(config.region, Region::UsEast1);
        assert_eq!(config.dashboard.region, "us-east-1");
        assert_eq!(config.dashboard.title, "web");
        let gate = config.health_gate.unwrap();
        assert_eq!(gate.budget, RetryBudget::new(4, Duration::from_secs(5)));
        assert_eq!(gate.unexpected_state, UnexpectedStatePolicy::FailFast);
        assert_eq!(
            config.alarms,
            vec![
                AlarmConfig::new("warn", 60.0),
                AlarmConfig::new("critical", 90.5)
            ]
        );
        assert_eq!(
            config.api_retry,
            RetryPolicy::new(5, Duration::from_millis(50))
        );
    }

    #[test]
    fn test_dashboard_name_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DASHBOARD_NAME", "  ")]).is_err());
    }

    #[test]
    fn test_invalid_values() {
        let base = ("DASHBOARD_NAME", "web-servers");
        assert!(load(&[base, ("AWS_REGION", "moon-1")]).is_err());
        assert!(load(&[base, ("ALARMS", "missing-threshold")]).is_err());
        assert!(load(&[base, ("ALARMS", "=75")]).is_err());
        assert!(load(&[base, ("ALARMS", "high=lots")]).is_err());
        assert!(load(&[base, ("ALARMS", "high=NaN,low=inf")]).is_err());
        assert!(load(&[base, ("ALARMS", "high=NaN")]).is_err());
        assert!(load(&[base, ("ALARMS", "low=-inf")]).is_err());

        let gated = ("TARGET_GROUP_ARN", "arn");
        assert!(load(&[base, gated, ("HEALTH_CHECK_MAX_ATTEMPTS", "0")]).is_err());
        assert!(load(&[base, gated, ("HEALTH_CHECK_INTERVAL_SECS", "-1")]).is_err());
        assert!(load(&[base, gated, ("HEALTH_CHECK_UNEXPECTED_STATE", "panic")]).is_err());
    }

    #[test]
    fn test_interval_overflow_is_rejected() {
        let base = ("DASHBOARD_NAME", "web-servers");
        let gated = ("TARGET_GROUP_ARN", "arn");

        let error = load(&[
            base,
            gated,
            ("HEALTH_CHECK_INTERVAL_SECS", "2000000000000000000"),
        ])
        .unwrap_err();
        assert!(error.to_string().contains("HEALTH_CHECK_INTERVAL_SECS"));

        let largest = ("HEALTH_CHECK_INTERVAL_SECS", "18446744073709551615");
        assert!(load(&[base, gated, largest]).is_err());
        assert!(load(&[base, gated, ("HEALTH_CHECK_INTERVAL_SECS", "3600")]).is_ok());
    }

    #[test]
    fn test_retry_delay_overflow_is_rejected() {
        let base = ("DASHBOARD_NAME", "web-servers");

        let error = load(&[
            base,
            ("API_RETRY_MAX_ATTEMPTS", "20"),
            ("API_RETRY_BASE_DELAY_MS", "18446744073709551615"),
        ])
        .unwrap_err();
        assert!(error.to_string().contains("API_RETRY_BASE_DELAY_MS"));

        // One attempt never backs off.
        assert!(load(&[
            base,
            ("API_RETRY_MAX_ATTEMPTS", "1"),
            ("API_RETRY_BASE_DELAY_MS", "18446744073709551615"),
        ])
        .is_ok());
    }

    #[test]
    fn test_gate_settings_ignored_without_target_group() {
        let config = load(&[
            ("DASHBOARD_NAME", "web-servers"),
            ("HEALTH_CHECK_MAX_ATTEMPTS", "0"),
        ])
        .unwrap();
        assert_eq!(config.health_gate, None);
    }
}
