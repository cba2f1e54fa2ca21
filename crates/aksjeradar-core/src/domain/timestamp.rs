use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::ValidationError;

/// Wall-clock instant carried on quotes, bars and reports. Always stored in
/// UTC and rendered as RFC3339 with a `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parses any RFC3339 timestamp; non-UTC offsets are converted.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        OffsetDateTime::parse(input.trim(), &Rfc3339)
            .map(|value| Self(value.to_offset(UtcOffset::UTC)))
            .map_err(|_| ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            })
    }

    /// Reads a zone-less exchange timestamp as UTC.
    pub fn from_primitive(value: PrimitiveDateTime) -> Self {
        Self(value.assume_utc())
    }

    pub fn from_unix_timestamp(seconds: i64) -> Result<Self, ValidationError> {
        match OffsetDateTime::from_unix_timestamp(seconds) {
            Ok(value) => Ok(Self(value)),
            Err(_) => Err(ValidationError::InvalidTimestamp {
                value: seconds.to_string(),
            }),
        }
    }

    pub fn unix_timestamp(self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Steps back by `duration`, staying put if that would leave the
    /// representable range.
    pub fn saturating_sub(self, duration: time::Duration) -> Self {
        match self.0.checked_sub(duration) {
            Some(earlier) => Self(earlier),
            None => self,
        }
    }

    pub fn format_rfc3339(self) -> String {
        match self.0.format(&Rfc3339) {
            Ok(text) => text,
            Err(_) => self.0.unix_timestamp().to_string(),
        }
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(DeError::custom)
    }
}
