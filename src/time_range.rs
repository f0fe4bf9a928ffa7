use crate::error::NotifierError;
use chrono::{DateTime, Duration, Utc};
use std::convert::TryFrom;

pub const LOOK_BACK_HOURS: i64 = 1;

#[derive(Debug, PartialEq)]
pub struct TimeRange {
    pub start: chrono::DateTime<Utc>,
    pub end: chrono::DateTime<Utc>,
}

/// Trailing window of `LOOK_BACK_HOURS` ending at the given instant.
impl TryFrom<DateTime<Utc>> for TimeRange {
    type Error = NotifierError;

    fn try_from(date_time: DateTime<Utc>) -> Result<Self, Self::Error> {
        Self::trailing(date_time, Duration::hours(LOOK_BACK_HOURS))
    }
}

impl TimeRange {
    pub fn trailing(end: DateTime<Utc>, look_back: Duration) -> Result<Self, NotifierError> {
        let start = end
            .checked_sub_signed(look_back)
            .ok_or(NotifierError::NoneValue)?;
        Ok(TimeRange { start, end })
    }

    pub fn start_timestamp(&self) -> String {
        Self::format(&self.start)
    }

    pub fn end_timestamp(&self) -> String {
        Self::format(&self.end)
    }

    fn format(date_time: &DateTime<Utc>) -> String {
        date_time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}
