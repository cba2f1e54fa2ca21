use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Supported time bucket intervals for bar data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1wk")]
    OneWeek,
    #[serde(rename = "1mo")]
    OneMonth,
}

impl Default for Interval {
    fn default() -> Self {
        Self::OneDay
    }
}

impl Interval {
    pub const ALL: [Self; 7] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::OneHour,
        Self::OneDay,
        Self::OneWeek,
        Self::OneMonth,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
            Self::OneWeek => "1wk",
            Self::OneMonth => "1mo",
        }
    }

    /// Nominal bucket length; a month counts as 30 days.
    pub fn duration(self) -> time::Duration {
        match self {
            Self::OneMinute => time::Duration::minutes(1),
            Self::FiveMinutes => time::Duration::minutes(5),
            Self::FifteenMinutes => time::Duration::minutes(15),
            Self::OneHour => time::Duration::hours(1),
            Self::OneDay => time::Duration::days(1),
            Self::OneWeek => time::Duration::weeks(1),
            Self::OneMonth => time::Duration::days(30),
        }
    }

    pub const fn is_intraday(self) -> bool {
        matches!(
            self,
            Self::OneMinute | Self::FiveMinutes | Self::FifteenMinutes | Self::OneHour
        )
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "1h" | "60m" => Ok(Self::OneHour),
            "1d" => Ok(Self::OneDay),
            "1wk" | "1w" => Ok(Self::OneWeek),
            "1mo" => Ok(Self::OneMonth),
            other => Err(ValidationError::InvalidInterval {
                value: other.to_owned(),
            }),
        }
    }
}

/// Look-back range requested for a history series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
}

impl Default for Period {
    fn default() -> Self {
        Self::OneMonth
    }
}

impl Period {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
        }
    }

    pub fn duration(self) -> time::Duration {
        match self {
            Self::OneDay => time::Duration::days(1),
            Self::FiveDays => time::Duration::days(5),
            Self::OneMonth => time::Duration::days(30),
            Self::ThreeMonths => time::Duration::days(91),
            Self::SixMonths => time::Duration::days(182),
            Self::OneYear => time::Duration::days(365),
            Self::TwoYears => time::Duration::days(730),
            Self::FiveYears => time::Duration::days(1826),
        }
    }

    /// Number of `interval` buckets covering this period, at least one.
    pub fn bar_count(self, interval: Interval) -> usize {
        let period = self.duration().whole_seconds().max(1);
        let step = interval.duration().whole_seconds().max(1);
        usize::try_from(period / step).unwrap_or(usize::MAX).max(1)
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Self::OneDay),
            "5d" => Ok(Self::FiveDays),
            "1mo" => Ok(Self::OneMonth),
            "3mo" => Ok(Self::ThreeMonths),
            "6mo" => Ok(Self::SixMonths),
            "1y" => Ok(Self::OneYear),
            "2y" => Ok(Self::TwoYears),
            "5y" => Ok(Self::FiveYears),
            other => Err(ValidationError::InvalidPeriod {
                value: other.to_owned(),
            }),
        }
    }
}
