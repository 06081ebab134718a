// Open maintenance report

use crate::application::lifecycle::MaintenanceLifecycleManager;
use crate::domain::{FindingStatus, TargetEntity, FINDING_TYPE};
use crate::error::Result;
use serde_json::Value;
use std::collections::HashSet;

/// One open maintenance item as shown in a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceSummary {
    pub maintenance_id: String,
    pub short_description: String,
    /// Epoch ms
    pub due_date: Option<i64>,
    pub web_link: String,
}

/// Query for open Findings attached to the code repo named `repo`
pub fn open_for_repo_query(repo: &str) -> String {
    format!(
        "FIND {} WITH closed = false THAT HAS CodeRepo WITH name = \"{}\"",
        FINDING_TYPE,
        escape(repo)
    )
}

/// Query for open Findings created by `email`
pub fn open_created_by_query(email: &str) -> String {
    format!(
        "FIND {} WITH closed = false AND createdBy = \"{}\"",
        FINDING_TYPE,
        escape(email)
    )
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Open maintenance on a code repo, soonest due first
pub async fn open_for_repo(
    manager: &MaintenanceLifecycleManager,
    repo: &str,
) -> Result<Vec<MaintenanceSummary>> {
    let entities = manager.gather_entities(&open_for_repo_query(repo)).await?;
    Ok(summarize(&entities))
}

/// Open maintenance created by a user, soonest due first
pub async fn open_created_by(
    manager: &MaintenanceLifecycleManager,
    email: &str,
) -> Result<Vec<MaintenanceSummary>> {
    let entities = manager.gather_entities(&open_created_by_query(email)).await?;
    Ok(summarize(&entities))
}

/// Reduce query results to unique open Findings sorted by due date
///
/// The same maintenance applied to several repos yields one Finding per
/// repo; the report lists it once.
pub fn summarize(entities: &[TargetEntity]) -> Vec<MaintenanceSummary> {
    let mut seen = HashSet::new();
    let mut rows: Vec<MaintenanceSummary> = entities
        .iter()
        .filter(|e| e.entity_type == FINDING_TYPE)
        .filter(|e| FindingStatus::of(e) != Some(FindingStatus::Closed))
        .filter_map(|e| {
            let maintenance_id = e.property_str("maintenanceId")?.to_string();
            seen.insert(maintenance_id.clone()).then(|| MaintenanceSummary {
                maintenance_id,
                short_description: e.property_str("shortDescription").unwrap_or_default().to_string(),
                due_date: e.property("dueDate").and_then(Value::as_i64),
                web_link: e.property_str("webLink").unwrap_or_default().to_string(),
            })
        })
        .collect();

    rows.sort_by_key(|r| r.due_date.unwrap_or(i64::MAX));
    rows
}

/// Relative description of a due date, e.g. "in 7 days" or "3 months ago"
pub fn humanize_due(due_millis: i64, now_millis: i64) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;
    const MONTH: i64 = 30 * DAY;
    const YEAR: i64 = 365 * DAY;

    let delta = due_millis.saturating_sub(now_millis) / 1000;
    let secs = delta.abs();

    let (count, unit) = if secs < 45 {
        return if delta >= 0 {
            "in a few seconds".to_string()
        } else {
            "a few seconds ago".to_string()
        };
    } else if secs < HOUR {
        ((secs + MINUTE / 2) / MINUTE, "minute")
    } else if secs < DAY {
        ((secs + HOUR / 2) / HOUR, "hour")
    } else if secs < MONTH {
        ((secs + DAY / 2) / DAY, "day")
    } else if secs < YEAR {
        ((secs + MONTH / 2) / MONTH, "month")
    } else {
        ((secs + YEAR / 2) / YEAR, "year")
    };

    let amount = if count == 1 {
        format!("a{} {}", if unit == "hour" { "n" } else { "" }, unit)
    } else {
        format!("{} {}s", count, unit)
    };

    if delta >= 0 {
        format!("in {}", amount)
    } else {
        format!("{} ago", amount)
    }
}
