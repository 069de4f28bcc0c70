//! Message definitions for the relay
//!
//! `RelayMessage` is both the queue payload and the item returned by
//! `GET /messages`. Its JSON shape is `{"message": "...", "timestamp": "..."}`.
//!
//! Notes on fields:
//! - `message`: caller-supplied body, never empty on publish
//! - `timestamp`: assigned by the gateway at publish time; serialized as
//!   ISO-8601 in UTC with millisecond precision (`2024-05-01T12:00:00.000Z`)

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub message: String,
    #[serde(with = "iso8601_millis")]
    pub timestamp: DateTime<Utc>,
}

impl RelayMessage {
    /// Stamp `body` with the current server time.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            message: body.into(),
            timestamp: Utc::now(),
        }
    }
}

mod iso8601_millis {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
