// Due date selection

use crate::domain::error::{DomainError, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use std::str::FromStr;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Preset windows offered for a realistic due date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueWindow {
    Days7,
    Days30,
    Days60,
    Days90,
    Days180,
    Days365,
}

impl DueWindow {
    pub const ALL: [DueWindow; 6] = [
        DueWindow::Days7,
        DueWindow::Days30,
        DueWindow::Days60,
        DueWindow::Days90,
        DueWindow::Days180,
        DueWindow::Days365,
    ];

    pub fn days(self) -> i64 {
        match self {
            DueWindow::Days7 => 7,
            DueWindow::Days30 => 30,
            DueWindow::Days60 => 60,
            DueWindow::Days90 => 90,
            DueWindow::Days180 => 180,
            DueWindow::Days365 => 365,
        }
    }

    /// Due date (epoch ms) counted from `now_millis`
    pub fn due_at(self, now_millis: i64) -> i64 {
        now_millis + self.days() * DAY_MS
    }
}

impl std::fmt::Display for DueWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d", self.days())
    }
}

impl FromStr for DueWindow {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        DueWindow::ALL
            .into_iter()
            .find(|w| w.to_string() == s.trim())
            .ok_or_else(|| {
                DomainError::ValidationError(format!(
                    "unknown due window '{}', expected one of 7d, 30d, 60d, 90d, 180d, 365d",
                    s
                ))
            })
    }
}

/// Parse an explicit `MM-DD-YYYY` due date into epoch ms (midnight UTC)
pub fn parse_due_date(s: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s.trim(), "%m-%d-%Y")
        .map_err(|_| DomainError::InvalidDueDate(s.to_string()))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| DomainError::InvalidDueDate(s.to_string()))?;
    Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
}
