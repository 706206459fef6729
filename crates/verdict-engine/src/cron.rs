//! Lightweight cron cadence for the dispatch trigger.
//!
//! Supports the 5-field form "MIN HOUR DOM MON DOW" with `*`, `*/N`, and
//! comma lists on the minute and hour fields; day fields accept only `*`.
//! That covers every dispatch cadence this system runs ("*/5 * * * *",
//! "0 9 * * *") without a cron crate.

use chrono::{DateTime, Duration, Timelike, Utc};

/// A parsed cron cadence.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minutes: Vec<u32>,
    hours: Vec<u32>,
}

impl CronSchedule {
    /// Parse a 5-field expression. Returns `None` for anything outside
    /// the supported subset.
    pub fn parse(expression: &str) -> Option<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return None;
        }
        // Day-of-month, month, and day-of-week are dispatch-cadence
        // irrelevant here; only the wildcard is accepted.
        if fields[2..].iter().any(|f| *f != "*") {
            return None;
        }

        Some(Self {
            minutes: parse_field(fields[0], 0, 59)?,
            hours: parse_field(fields[1], 0, 23)?,
        })
    }

    /// The next matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = (after + Duration::minutes(1)).with_second(0)?;
        // A valid minute/hour pair recurs within 24h; scan two days to be
        // generous with edge alignment
        for _ in 0..(48 * 60) {
            if self.minutes.contains(&candidate.minute()) && self.hours.contains(&candidate.hour())
            {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    if field.contains(',') {
        let values: std::result::Result<Vec<u32>, _> =
            field.split(',').map(|s| s.trim().parse()).collect();
        return values
            .ok()
            .filter(|v| v.iter().all(|x| *x >= min && *x <= max));
    }

    let n: u32 = field.parse().ok()?;
    (n >= min && n <= max).then(|| vec![n])
}
