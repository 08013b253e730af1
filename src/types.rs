use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Severity category attached to every security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::High, Severity::Medium, Severity::Low];

    /// Exact, case-sensitive match of the wire labels.
    pub fn parse(s: &str) -> Option<Severity> {
        match s {
            "High" => Some(Severity::High),
            "Medium" => Some(Severity::Medium),
            "Low" => Some(Severity::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

/// One security event as pushed by the backend.
///
/// Fields are read leniently: a missing or `null` field becomes an empty
/// string, and numbers or booleans (e.g. an integer ethertype in `protocol`)
/// keep their textual form, so a partial event still renders.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_ip: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub target_ip: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub protocol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub severity: String,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub packet_info: Option<String>,
}

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(value_text(Value::deserialize(de)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(value_text(Value::deserialize(de)?))
}

impl SecurityEvent {
    /// `None` when the severity label is missing or not one of the three categories.
    pub fn severity(&self) -> Option<Severity> {
        Severity::parse(&self.severity)
    }
}

/// Aggregate counters served by `GET /api/stats`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_events: u64,
    pub high_severity: u64,
    pub unique_sources: u64,
}

/// File names served by `GET /api/files`, newest first.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FileListing {
    #[serde(default)]
    pub pcap_files: Vec<String>,
    #[serde(default)]
    pub report_files: Vec<String>,
}

/// Scanning state, both the toggle response and the out-of-band push.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanStatus {
    pub scanning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ScanStatus {
    pub fn new(scanning: bool) -> Self {
        let status = if scanning { "running" } else { "stopped" };
        Self {
            scanning,
            status: Some(status.into()),
        }
    }
}

/// Response of `POST /api/control/shutdown`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownAck {
    #[serde(default)]
    pub status: String,
}
