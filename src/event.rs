use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

pub const STATUS_OK: u16 = 200;

const PUBLISHED: &str = "Successfully retrieved CPU utilization and updated CloudWatch Dashboard!";
const PUBLISHED_GATED: &str =
    "Successfully retrieved CPU utilization, updated CloudWatch Dashboard, and added alarms!";
const SKIPPED: &str = "Instance is not healthy, dashboard update skipped.";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        InstanceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// EventBridge "EC2 Instance State-change Notification".
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstanceStateChangeEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub detail_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    pub detail: InstanceStateChangeDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstanceStateChangeDetail {
    pub instance_id: InstanceId,
    #[serde(default)]
    pub state: Option<String>,
}

impl InstanceStateChangeEvent {
    pub fn instance_id(&self) -> &InstanceId {
        &self.detail.instance_id
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub body: String,
}

impl HandlerResponse {
    fn ok(body: impl Into<String>) -> Self {
        HandlerResponse {
            status_code: STATUS_OK,
            body: body.into(),
        }
    }

    /// `gated` selects the health-gated wording, which also reports the alarms.
    pub fn published(gated: bool) -> Self {
        if gated {
            HandlerResponse::ok(PUBLISHED_GATED)
        } else {
            HandlerResponse::ok(PUBLISHED)
        }
    }

    pub fn skipped() -> Self {
        HandlerResponse::ok(SKIPPED)
    }
}
