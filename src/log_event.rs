// Diagnostic event record shared by the facade, the buffer and the collector

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::errors::CodecError;

/// Severity of a logged event. Serialized as its integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    #[default]
    Unknown = 0,
    Info = 1,
    Error = 2,
    Crash = 3,
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity as u8
    }
}

impl TryFrom<u8> for Severity {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Severity::Unknown),
            1 => Ok(Severity::Info),
            2 => Ok(Severity::Error),
            3 => Ok(Severity::Crash),
            other => Err(CodecError::UnknownSeverity(other)),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(input: &str) -> Result<Severity, Self::Err> {
        match input.to_lowercase().as_str() {
            "unknown" => Ok(Severity::Unknown),
            "info" => Ok(Severity::Info),
            "error" => Ok(Severity::Error),
            "crash" => Ok(Severity::Crash),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One diagnostic record.
///
/// Field names on the wire match what the collector already ingests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "EventUID")]
    pub event_id: String,
    #[serde(rename = "TimeStamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Severity")]
    pub severity: Severity,
    #[serde(rename = "Tag")]
    pub tag: String,
    #[serde(rename = "Summary")]
    pub summary: String,
    #[serde(rename = "Detail")]
    pub detail: Option<String>,
    #[serde(rename = "Source")]
    pub source: Option<String>,
    #[serde(rename = "UserUID")]
    pub user_id: Option<String>,
    #[serde(rename = "DeviceUID")]
    pub device_id: Option<String>,
    #[serde(rename = "Properties", default, deserialize_with = "null_as_empty")]
    pub properties: HashMap<String, String>,
}

impl LogEvent {
    /// New event with a fresh id and the current UTC time
    pub fn new(severity: Severity, tag: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            severity,
            tag: tag.into(),
            summary: summary.into(),
            detail: None,
            source: None,
            user_id: None,
            device_id: None,
            properties: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    /// Copies identity into the event; later identity changes do not affect it
    pub fn with_identity(mut self, user_id: Option<String>, device_id: Option<String>) -> Self {
        self.user_id = user_id;
        self.device_id = device_id;
        self
    }

    /// Inserts properties in iteration order. Colliding keys keep the last value.
    pub fn with_properties<I, K, V>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in properties {
            self.properties.insert(key.into(), value.into());
        }
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_events_get_distinct_ids() {
        let a = LogEvent::new(Severity::Info, "boot", "started");
        let b = LogEvent::new(Severity::Info, "boot", "started");
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn later_properties_win_on_collision() {
        let event = LogEvent::new(Severity::Error, "IoError", "disk full")
            .with_properties([("path", "/var/data"), ("attempt", "1")])
            .with_properties([("attempt", "2")]);

        assert_eq!(event.properties.len(), 2);
        assert_eq!(event.properties["attempt"], "2");
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("CRASH".parse::<Severity>().unwrap(), Severity::Crash);
        assert!("fatal".parse::<Severity>().is_err());
        assert!(Severity::try_from(9u8).is_err());
    }
}
