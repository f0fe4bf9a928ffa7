use std::fmt;
use std::fmt::{Display, Formatter};

pub const NO_DATA_AVAILABLE: &str = "No data available";

/// Averaged CPU utilization of an instance over the look-back window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricSample {
    Percent(f64),
    NoData,
}

impl MetricSample {
    pub fn percent(&self) -> Option<f64> {
        match *self {
            MetricSample::Percent(value) => Some(value),
            MetricSample::NoData => None,
        }
    }
}

impl Default for MetricSample {
    fn default() -> Self {
        MetricSample::NoData
    }
}

impl Display for MetricSample {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            MetricSample::Percent(value) => write!(f, "{}", value),
            MetricSample::NoData => f.write_str(NO_DATA_AVAILABLE),
        }
    }
}
