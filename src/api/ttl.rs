use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::str::FromStr;

/// Unit of a requested time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl FromStr for TtlUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "days" => Ok(TtlUnit::Days),
            "hours" => Ok(TtlUnit::Hours),
            "minutes" => Ok(TtlUnit::Minutes),
            "seconds" => Ok(TtlUnit::Seconds),
            other => Err(format!("invalid unit '{other}'")),
        }
    }
}

impl TtlUnit {
    /// The absolute instant `amount` units after `now`, or `None` on overflow.
    pub fn expiry_after(self, amount: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let delta = match self {
            TtlUnit::Days => TimeDelta::try_days(amount),
            TtlUnit::Hours => TimeDelta::try_hours(amount),
            TtlUnit::Minutes => TimeDelta::try_minutes(amount),
            TtlUnit::Seconds => TimeDelta::try_seconds(amount),
        }?;
        now.checked_add_signed(delta)
    }
}
