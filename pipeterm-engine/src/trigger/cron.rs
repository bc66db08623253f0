//! Cron expressions
//!
//! Accepts the classic 5-field form (`minute hour day-of-month month
//! day-of-week`), a 6-field form with a leading seconds field, and the
//! `@hourly` style descriptors. Field matching and fire-time search are
//! done by `croner`, which follows Vixie cron: when both day-of-month and
//! day-of-week are restricted, a day matches if either does.
//!
//! Stored expressions are always 5 fields. The engine prefixes `"0 "` to
//! feed the 6-field parser and strips it again for display, see
//! [`to_internal`] and [`to_display`].

use chrono::{DateTime, TimeZone};
use croner::Cron;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("empty cron expression")]
    Empty,

    #[error("expected 5 or 6 fields, found {0}")]
    FieldCount(usize),

    #[error("unknown descriptor '{0}'")]
    UnknownDescriptor(String),

    #[error("{0}")]
    Invalid(String),
}

/// A parsed cron expression
#[derive(Debug, Clone)]
pub struct CronSchedule {
    source: String,
    cron: Cron,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let source = canonical(expression);
        if source.is_empty() {
            return Err(CronError::Empty);
        }

        let expanded = if source.starts_with('@') {
            descriptor(&source)?.to_string()
        } else {
            source.clone()
        };

        let fields = expanded.split(' ').count();
        if !(5..=6).contains(&fields) {
            return Err(CronError::FieldCount(fields));
        }

        let cron = Cron::new(&expanded)
            .with_seconds_optional()
            .parse()
            .map_err(|e| CronError::Invalid(e.to_string()))?;

        Ok(Self { source, cron })
    }

    /// The expression this schedule was parsed from, whitespace collapsed
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Earliest fire time strictly after `after`, in `after`'s zone
    ///
    /// Returns `None` if nothing ever matches (e.g. `0 0 30 2 *`).
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.cron.find_next_occurrence(after, false).ok()
    }

    /// The next `count` fire times after `after`
    pub fn upcoming<Tz: TimeZone>(&self, after: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = after.clone();
        while times.len() < count {
            match self.next_after(&cursor) {
                Some(next) => {
                    cursor = next.clone();
                    times.push(next);
                }
                None => break,
            }
        }
        times
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Collapses runs of whitespace to single spaces
pub fn canonical(expression: &str) -> String {
    expression.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Form handed to the trigger registry: 5-field expressions gain a leading
/// `0` seconds field; anything else is only canonicalized
pub fn to_internal(expression: &str) -> String {
    let canonical = canonical(expression);
    if canonical.split(' ').count() == 5 && !canonical.starts_with('@') {
        format!("0 {}", canonical)
    } else {
        canonical
    }
}

/// Form stored and shown to users: a leading `0` seconds field is dropped
///
/// 6-field expressions with any other seconds value are kept whole, since
/// dropping the field would change when they fire.
pub fn to_display(expression: &str) -> String {
    let canonical = canonical(expression);
    let fields: Vec<&str> = canonical.split(' ').collect();
    if fields.len() == 6 && fields[0] == "0" {
        fields[1..].join(" ")
    } else {
        canonical
    }
}

fn descriptor(expression: &str) -> Result<&'static str, CronError> {
    match expression.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Ok("0 0 0 1 1 *"),
        "@monthly" => Ok("0 0 0 1 * *"),
        "@weekly" => Ok("0 0 0 * * 0"),
        "@daily" | "@midnight" => Ok("0 0 0 * * *"),
        "@hourly" => Ok("0 0 * * * *"),
        _ => Err(CronError::UnknownDescriptor(expression.to_string())),
    }
}
