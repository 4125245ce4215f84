//! Activity feed and dashboard statistic records.

use super::account::UserId;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ActivityId = Uuid;

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    NotebookCreated,
    EntryAdded,
    PriceAlert,
    GoalUpdated,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotebookCreated => "NOTEBOOK_CREATED",
            Self::EntryAdded => "ENTRY_ADDED",
            Self::PriceAlert => "PRICE_ALERT",
            Self::GoalUpdated => "GOAL_UPDATED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NOTEBOOK_CREATED" => Some(Self::NotebookCreated),
            "ENTRY_ADDED" => Some(Self::EntryAdded),
            "PRICE_ALERT" => Some(Self::PriceAlert),
            "GOAL_UPDATED" => Some(Self::GoalUpdated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentActivity {
    pub id: ActivityId,
    pub user_id: UserId,
    pub activity_type: ActivityType,
    pub title: String,
    pub description: String,
    pub related_object_id: Option<String>,
    pub created_at: i64,
}

/// New activity row, written in the same transaction as the change it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub activity_type: ActivityType,
    pub title: String,
    pub description: String,
    pub related_object_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub active_notebooks: i64,
    pub monthly_entries: i64,
    pub total_entries: i64,
    pub goal_achievement_rate: f64,
    pub updated_at: i64,
}

/// Japanese relative-time label: `たった今`, `N分前`, `N時間前`, `N日前`,
/// or `YYYY/MM/DD` beyond a week.
pub fn relative_time_label(timestamp_ms: i64, now_ms: i64) -> String {
    let elapsed = (now_ms - timestamp_ms).max(0);
    if elapsed > 7 * DAY_MS {
        return Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .map(|at| at.format("%Y/%m/%d").to_string())
            .unwrap_or_default();
    }
    if elapsed >= DAY_MS {
        format!("{}日前", elapsed / DAY_MS)
    } else if elapsed >= HOUR_MS {
        format!("{}時間前", elapsed / HOUR_MS)
    } else if elapsed >= MINUTE_MS {
        format!("{}分前", elapsed / MINUTE_MS)
    } else {
        "たった今".to_string()
    }
}
