use std::fmt::{Display, Formatter};

use aksjeradar_core::{DataOrigin, ProviderAttempt, UtcDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Request identifier (UUID v4) for correlating output with logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Command metadata emitted alongside every payload.
///
/// Field order is fixed to keep JSON output stable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub request_id: RequestId,
    pub generated_at: UtcDateTime,
    /// Origin of each returned record, deduplicated in first-seen order.
    pub origins: Vec<DataOrigin>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Metadata {
    pub fn new(origins: Vec<DataOrigin>, latency_ms: u64, cache_hit: bool) -> Self {
        let mut unique = Vec::with_capacity(origins.len());
        for origin in origins {
            if !unique.contains(&origin) {
                unique.push(origin);
            }
        }

        Self {
            request_id: RequestId::new_v4(),
            generated_at: UtcDateTime::now(),
            origins: unique,
            latency_ms,
            cache_hit,
            warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Top-level JSON document written to stdout.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub meta: Metadata,
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<ProviderAttempt>,
}
