//! Normalized records shared by the scanners, sinks and health queries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a finding. Ordering follows rank: `Critical < Warning < Info`,
/// so "more severe" sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Numeric rank, lower is more severe.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
        }
    }

    /// True when `self` is at least as severe as `threshold`.
    pub fn meets(self, threshold: Severity) -> bool {
        self.rank() <= threshold.rank()
    }

    /// Critical and warning findings are forwarded to notifiers.
    pub fn is_significant(self) -> bool {
        self.meets(Severity::Warning)
    }

    /// Map an alarm status color. Unknown colors (gray) fall back to info.
    pub fn from_alarm_color(color: &str) -> Self {
        match color.to_ascii_lowercase().as_str() {
            "red" => Severity::Critical,
            "yellow" => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(format!(
                "unknown severity '{other}', expected critical, warning or info"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// Where an issue came from. Serialized as a plain string
/// (`alarm`, `event`, `host_log:<key>`, `connection`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum IssueSource {
    Alarm,
    Event,
    HostLog(String),
    Connection,
    Other(String),
}

impl fmt::Display for IssueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSource::Alarm => f.write_str("alarm"),
            IssueSource::Event => f.write_str("event"),
            IssueSource::HostLog(key) => write!(f, "host_log:{key}"),
            IssueSource::Connection => f.write_str("connection"),
            IssueSource::Other(s) => f.write_str(s),
        }
    }
}

impl From<IssueSource> for String {
    fn from(source: IssueSource) -> Self {
        source.to_string()
    }
}

impl From<String> for IssueSource {
    fn from(s: String) -> Self {
        match s.as_str() {
            "alarm" => IssueSource::Alarm,
            "event" => IssueSource::Event,
            "connection" => IssueSource::Connection,
            _ => match s.strip_prefix("host_log:") {
                Some(key) => IssueSource::HostLog(key.to_string()),
                None => IssueSource::Other(s),
            },
        }
    }
}

/// The unified signal record produced by every scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub source: IssueSource,
    pub message: String,
    pub time: DateTime<Utc>,
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl Issue {
    /// Synthetic issue recorded when a target cannot be reached.
    pub fn connection_failure(target: &str, error: &dyn fmt::Display) -> Self {
        Self {
            severity: Severity::Critical,
            source: IssueSource::Connection,
            message: format!("Failed to connect to {target}: {error}"),
            time: Utc::now(),
            entity: target.to_string(),
            event_type: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Alarm / Event
// ---------------------------------------------------------------------------

/// A triggered alarm, as seen by the health query path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub severity: Severity,
    pub alarm_name: String,
    pub entity_name: String,
    pub entity_type: String,
    pub time: DateTime<Utc>,
    pub acknowledged: bool,
}

impl Alarm {
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.alarm_name, &self.entity_name)
    }

    pub fn to_issue(&self) -> Issue {
        Issue {
            severity: self.severity,
            source: IssueSource::Alarm,
            message: format!(
                "[{}:{}] {}",
                self.entity_type, self.entity_name, self.alarm_name
            ),
            time: self.time,
            entity: self.entity_name.clone(),
            event_type: None,
        }
    }
}

/// A classified event from the endpoint's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub severity: Severity,
    pub event_type: String,
    pub message: String,
    pub time: DateTime<Utc>,
    pub actor: String,
    pub entity: String,
}

impl EventRecord {
    pub fn to_issue(&self) -> Issue {
        Issue {
            severity: self.severity,
            source: IssueSource::Event,
            message: self.message.clone(),
            time: self.time,
            entity: self.entity.clone(),
            event_type: Some(self.event_type.clone()),
        }
    }
}
