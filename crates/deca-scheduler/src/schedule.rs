//! Next-run computation for the three schedule kinds.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Result, SchedulerError};
use crate::types::Schedule;

/// Compute the next UTC fire time (in Unix ms) for `schedule` strictly after
/// `now_ms`.
///
/// Returns `Ok(None)` when the schedule is exhausted: an `At` whose instant
/// has passed (still eligible for a manual `run_job`), or a cron expression
/// with no future occurrence.
pub fn compute_next_run(schedule: &Schedule, now_ms: i64) -> Result<Option<i64>> {
    match schedule {
        Schedule::At { at_ms } => Ok(if *at_ms > now_ms { Some(*at_ms) } else { None }),

        Schedule::Every { every_ms } => Ok(Some(now_ms + (*every_ms).max(1))),

        Schedule::Cron { expr } => {
            let parsed = parse_cron(expr)?;
            let from: DateTime<Utc> = Utc
                .timestamp_millis_opt(now_ms)
                .single()
                .ok_or(SchedulerError::InvalidCron)?;
            Ok(parsed.after(&from).next().map(|dt| dt.timestamp_millis()))
        }
    }
}

/// Validate a schedule without computing anything. Used by `add_job` so an
/// invalid expression is rejected before the job is persisted.
pub fn validate(schedule: &Schedule) -> Result<()> {
    if let Schedule::Cron { expr } = schedule {
        parse_cron(expr)?;
    }
    Ok(())
}

/// Parse a cron expression. The public dialect is standard five-field
/// (minute hour dom month dow); the `cron` crate wants a seconds column, so
/// five-field input is normalized by prepending `0`. Six- or seven-field
/// strings pass through untouched.
fn parse_cron(expr: &str) -> Result<cron::Schedule> {
    let fields = expr.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    cron::Schedule::from_str(&normalized).map_err(|_| SchedulerError::InvalidCron)
}
