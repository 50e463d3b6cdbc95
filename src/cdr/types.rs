//! CDR type definitions.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Session action recorded in a CDR.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum CdrAction {
    /// Session admitted
    Created,
    /// Session expired by the TTL sweep
    Timeout,
    /// Session removed by the graceful drain
    Offload,
    /// Attach refused by the blacklist
    Rejected,
    /// Session removed on request, with the caller's reason
    Removed(String),
}

impl CdrAction {
    pub fn as_str(&self) -> &str {
        match self {
            CdrAction::Created => "created",
            CdrAction::Timeout => "timeout",
            CdrAction::Offload => "offload",
            CdrAction::Rejected => "rejected",
            CdrAction::Removed(reason) => reason,
        }
    }
}

impl From<&str> for CdrAction {
    fn from(s: &str) -> Self {
        match s {
            "created" => CdrAction::Created,
            "timeout" => CdrAction::Timeout,
            "offload" => CdrAction::Offload,
            "rejected" => CdrAction::Rejected,
            other => CdrAction::Removed(other.to_string()),
        }
    }
}

impl From<String> for CdrAction {
    fn from(s: String) -> Self {
        CdrAction::from(s.as_str())
    }
}

impl fmt::Display for CdrAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CdrAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Call Detail Record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cdr {
    /// RFC 3339 UTC timestamp, second precision
    pub timestamp: String,

    /// Subscriber IMSI
    pub imsi: String,

    /// What happened to the session
    pub action: CdrAction,
}

impl Cdr {
    /// Create a record stamped with the current UTC time.
    pub fn new(imsi: impl Into<String>, action: CdrAction) -> Self {
        Self::at(Utc::now(), imsi, action)
    }

    /// Create a record with an explicit timestamp.
    pub fn at(time: DateTime<Utc>, imsi: impl Into<String>, action: CdrAction) -> Self {
        Self {
            timestamp: time.to_rfc3339_opts(SecondsFormat::Secs, true),
            imsi: imsi.into(),
            action,
        }
    }

    pub fn created(imsi: impl Into<String>) -> Self {
        Self::new(imsi, CdrAction::Created)
    }

    pub fn timeout(imsi: impl Into<String>) -> Self {
        Self::new(imsi, CdrAction::Timeout)
    }

    pub fn offload(imsi: impl Into<String>) -> Self {
        Self::new(imsi, CdrAction::Offload)
    }

    pub fn rejected(imsi: impl Into<String>) -> Self {
        Self::new(imsi, CdrAction::Rejected)
    }

    pub fn removed(imsi: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(imsi, CdrAction::Removed(reason.into()))
    }

    /// Parse the timestamp back into a `DateTime`.
    pub fn timestamp_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// `timestamp, imsi, action`
    pub fn to_csv_line(&self) -> String {
        format!("{}, {}, {}", self.timestamp, self.imsi, self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_csv_line() {
        let time = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 5).unwrap();
        let cdr = Cdr::at(time, "250991234567890", CdrAction::Created);

        assert_eq!(cdr.to_csv_line(), "2025-03-01T12:30:05Z, 250991234567890, created");
    }

    #[test]
    fn test_removed_reason_is_action_tag() {
        let cdr = Cdr::removed("250991234567890", "manual");
        assert_eq!(cdr.action.as_str(), "manual");
        assert!(cdr.to_csv_line().ends_with(", manual"));
    }

    #[test]
    fn test_json_round_trip_keeps_action() {
        let cdr = Cdr::offload("250991234567890");
        let json = serde_json::to_string(&cdr).unwrap();
        assert!(json.contains("\"action\":\"offload\""));

        let parsed: Cdr = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cdr);
    }

    #[test]
    fn test_timestamp_parses() {
        let cdr = Cdr::timeout("250991234567890");
        assert!(cdr.timestamp_datetime().is_some());
    }
}
