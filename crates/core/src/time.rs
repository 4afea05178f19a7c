use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{PipelineError, Result};

/// Drops the sub-second part, matching the whole-second resolution of point end times.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0).single().unwrap_or(ts)
}

pub fn rfc3339_seconds(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Keeps whatever sub-second precision the value carries (none, millis, micros or nanos).
pub fn rfc3339_precise(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses an epoch-seconds value as rendered by BigQuery (`"1.7E9"`, `"1700000000.5"`).
pub fn parse_epoch_seconds(input: &str) -> Result<DateTime<Utc>> {
    let secs: f64 = input
        .trim()
        .parse()
        .map_err(|e| PipelineError::InvalidArgument(format!("bad epoch seconds {input}: {e}")))?;
    if !secs.is_finite() {
        return Err(PipelineError::InvalidArgument(format!(
            "bad epoch seconds {input}: not finite"
        )));
    }
    let micros = (secs * 1_000_000.0).round() as i64;
    Utc.timestamp_micros(micros)
        .single()
        .ok_or_else(|| PipelineError::InvalidArgument(format!("epoch seconds out of range: {input}")))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| PipelineError::Config(format!("invalid duration {input}: {e}")))
}
