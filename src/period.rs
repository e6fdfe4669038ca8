// src/period.rs
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::info;

/// The (year, month) pair targeted for submission in one batch run.
///
/// Resolved once per run from the current date and shared read-only across
/// every per-user task; never recomputed mid-batch, even if the run crosses
/// a date boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportingPeriod {
    pub year: i32,
    pub month: u32,
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Resolves the reporting target: the calendar month preceding `today`.
/// January rolls over to December of the prior year.
pub fn previous_month(today: NaiveDate) -> ReportingPeriod {
    let period = if today.month() == 1 {
        ReportingPeriod {
            year: today.year() - 1,
            month: 12,
        }
    } else {
        ReportingPeriod {
            year: today.year(),
            month: today.month() - 1,
        }
    };
    info!(
        "Today's date: {}. Target year: {}, target month: {}",
        today, period.year, period.month
    );
    period
}
