//! Reading files written by the first, untyped version of the format
//!
//! Those files store log lines as plain strings (`"[2006-01-02 15:04:05]
//! message"`, or `"[Pipeline Created.]"` with no time at all), mark unset
//! times with the zero time `0001-01-01T00:00:00Z`, and describe the script
//! with a `script_type`/`script_path` pair.

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::domain::log::{LOG_TIME_FORMAT, LogEntry, LogLevel};
use crate::domain::pipeline::ScriptKind;

/// `script_type` value of a user-supplied script
const CUSTOM_SCRIPT_TYPE: &str = "byod";

/// A stored log line in either format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredLog {
    Entry(LogEntry),
    Line(String),
}

impl From<LogEntry> for StoredLog {
    fn from(entry: LogEntry) -> Self {
        Self::Entry(entry)
    }
}

/// Converts stored lines to entries
///
/// Lines without a readable time take the first time found among the
/// other lines, then `fallback`, then the Unix epoch.
pub fn into_entries(logs: Vec<StoredLog>, fallback: Option<DateTime<Utc>>) -> Vec<LogEntry> {
    let parsed: Vec<Result<LogEntry, String>> = logs
        .into_iter()
        .map(|log| match log {
            StoredLog::Entry(entry) => Ok(entry),
            StoredLog::Line(line) => parse_dated_line(&line).ok_or(line),
        })
        .collect();

    let undated_time = parsed
        .iter()
        .find_map(|p| p.as_ref().ok().map(|e| e.timestamp))
        .or(fallback)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    parsed
        .into_iter()
        .map(|p| p.unwrap_or_else(|line| undated_line(&line, undated_time)))
        .collect()
}

fn parse_dated_line(line: &str) -> Option<LogEntry> {
    let (stamp, message) = split_bracket(line)?;
    let naive = NaiveDateTime::parse_from_str(stamp, LOG_TIME_FORMAT).ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(LogEntry::at(local.with_timezone(&Utc), level_of(message), message))
}

fn undated_line(line: &str, timestamp: DateTime<Utc>) -> LogEntry {
    let message = match split_bracket(line) {
        Some((inner, "")) => inner,
        _ => line,
    };
    LogEntry::at(timestamp, level_of(message), message)
}

/// `"[head] rest"` to `("head", "rest")`
fn split_bracket(line: &str) -> Option<(&str, &str)> {
    let inner = line.strip_prefix('[')?;
    let close = inner.find(']')?;
    Some((&inner[..close], inner[close + 1..].trim_start()))
}

fn level_of(message: &str) -> LogLevel {
    if message.to_ascii_lowercase().contains("failed") {
        LogLevel::Error
    } else {
        LogLevel::Info
    }
}

/// Script described by the old `script_type`/`script_path` pair
pub fn script_kind(script_type: Option<&str>, script_path: Option<&str>) -> Option<ScriptKind> {
    match (script_type?, script_path) {
        (CUSTOM_SCRIPT_TYPE, Some(path)) if !path.trim().is_empty() => Some(ScriptKind::Custom {
            path: PathBuf::from(path.trim()),
        }),
        _ => Some(ScriptKind::Builtin),
    }
}

/// Optional time where the year-1 zero time also means unset
pub fn optional_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let time = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(time.filter(|t| t.year() > 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(stamp: &str) -> DateTime<Utc> {
        let naive = NaiveDateTime::parse_from_str(stamp, LOG_TIME_FORMAT).unwrap();
        Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_dated_lines_keep_their_time() {
        let entries = into_entries(
            vec![
                StoredLog::Line("[Pipeline Created.]".into()),
                StoredLog::Line("[2024-05-01 12:00:00] Pipeline executed successfully".into()),
                StoredLog::Line(
                    "[2024-05-01 12:05:00] Cron execution failed: exit status 1\nOutput: boom"
                        .into(),
                ),
            ],
            None,
        );

        assert_eq!(entries[0].message, "Pipeline Created.");
        assert_eq!(entries[0].timestamp, local("2024-05-01 12:00:00"));
        assert_eq!(entries[0].level, LogLevel::Info);

        assert_eq!(entries[1].message, "Pipeline executed successfully");
        assert_eq!(entries[1].timestamp, local("2024-05-01 12:00:00"));

        assert_eq!(
            entries[2].message,
            "Cron execution failed: exit status 1\nOutput: boom"
        );
        assert_eq!(entries[2].level, LogLevel::Error);
    }

    #[test]
    fn test_undated_lines_fall_back() {
        let last_run = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let entries = into_entries(
            vec![
                StoredLog::Line("[Pipeline Created.]".into()),
                StoredLog::Line("no brackets at all".into()),
            ],
            Some(last_run),
        );
        assert_eq!(entries[0].timestamp, last_run);
        assert_eq!(entries[1].message, "no brackets at all");

        let entries = into_entries(vec![StoredLog::Line("[x]".into())], None);
        assert_eq!(entries[0].timestamp, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_typed_entries_pass_through() {
        let entry = LogEntry::error("boom");
        let entries = into_entries(vec![StoredLog::from(entry.clone())], None);
        assert_eq!(entries, vec![entry]);
    }

    #[test]
    fn test_script_kind_from_pair() {
        assert_eq!(
            script_kind(Some("byod"), Some("/data/load.py")),
            Some(ScriptKind::Custom {
                path: "/data/load.py".into()
            })
        );
        assert_eq!(script_kind(Some("byod"), Some("")), Some(ScriptKind::Builtin));
        assert_eq!(script_kind(Some(""), None), Some(ScriptKind::Builtin));
        assert_eq!(script_kind(None, Some("/data/load.py")), None);
    }
}
