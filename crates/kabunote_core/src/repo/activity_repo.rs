//! Activity feed and dashboard statistics persistence.
//!
//! # Invariants
//! - Activities for notebook/entry creation are inserted by the creating
//!   transaction via [`insert_activity`].
//! - `dashboard_stats` holds at most one row per user (upsert on refresh).

use super::{ensure_schema, invalid_enum, parse_uuid, RepoResult};
use crate::db::{month_start_ms, now_ms};
use crate::model::account::UserId;
use crate::model::activity::{ActivityType, DashboardStats, NewActivity, RecentActivity};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub trait DashboardRepository {
    fn record_activity(&self, user_id: UserId, activity: &NewActivity)
        -> RepoResult<RecentActivity>;
    /// Newest first.
    fn recent_activities(&self, user_id: UserId, limit: u32) -> RepoResult<Vec<RecentActivity>>;
    /// Recomputes the user's statistics and stores them.
    fn refresh_stats(&self, user_id: UserId) -> RepoResult<DashboardStats>;
    fn get_stats(&self, user_id: UserId) -> RepoResult<Option<DashboardStats>>;
}

pub struct SqliteDashboardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDashboardRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(
            conn,
            &[
                ("recent_activities", &["id", "user_id", "activity_type"]),
                ("dashboard_stats", &["user_id", "goal_achievement_rate"]),
                ("entries", &["entry_type", "content", "created_at"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl DashboardRepository for SqliteDashboardRepository<'_> {
    fn record_activity(
        &self,
        user_id: UserId,
        activity: &NewActivity,
    ) -> RepoResult<RecentActivity> {
        insert_activity(self.conn, user_id, activity)
    }

    fn recent_activities(&self, user_id: UserId, limit: u32) -> RepoResult<Vec<RecentActivity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, activity_type, title, description, related_object_id, created_at
             FROM recent_activities
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![user_id.to_string(), i64::from(limit)])?;
        let mut activities = Vec::new();
        while let Some(row) = rows.next()? {
            activities.push(activity_from_row(row)?);
        }
        Ok(activities)
    }

    fn refresh_stats(&self, user_id: UserId) -> RepoResult<DashboardStats> {
        let now = now_ms();
        let user_text = user_id.to_string();
        let (active_notebooks, monthly_entries, total_entries, goals, achieved): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM notebooks WHERE user_id = ?1 AND status = 'ACTIVE'),
                (SELECT COUNT(*)
                   FROM entries e INNER JOIN notebooks n ON n.id = e.notebook_id
                  WHERE n.user_id = ?1 AND e.created_at >= ?2),
                (SELECT COUNT(*)
                   FROM entries e INNER JOIN notebooks n ON n.id = e.notebook_id
                  WHERE n.user_id = ?1),
                (SELECT COUNT(*)
                   FROM entries e INNER JOIN notebooks n ON n.id = e.notebook_id
                  WHERE n.user_id = ?1 AND e.entry_type = 'GOAL'),
                (SELECT COUNT(*)
                   FROM entries e INNER JOIN notebooks n ON n.id = e.notebook_id
                  WHERE n.user_id = ?1
                    AND e.entry_type = 'GOAL'
                    AND CASE WHEN json_valid(e.content)
                             THEN json_type(e.content, '$.achieved') END = 'true');",
            params![user_text, month_start_ms(now)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        let goal_achievement_rate = if goals == 0 {
            0.0
        } else {
            ((achieved as f64 / goals as f64) * 1000.0).round() / 10.0
        };

        self.conn.execute(
            "INSERT INTO dashboard_stats (
                user_id, active_notebooks, monthly_entries, total_entries,
                goal_achievement_rate, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                active_notebooks = excluded.active_notebooks,
                monthly_entries = excluded.monthly_entries,
                total_entries = excluded.total_entries,
                goal_achievement_rate = excluded.goal_achievement_rate,
                updated_at = excluded.updated_at;",
            params![
                user_text,
                active_notebooks,
                monthly_entries,
                total_entries,
                goal_achievement_rate,
                now
            ],
        )?;

        Ok(DashboardStats {
            active_notebooks,
            monthly_entries,
            total_entries,
            goal_achievement_rate,
            updated_at: now,
        })
    }

    fn get_stats(&self, user_id: UserId) -> RepoResult<Option<DashboardStats>> {
        Ok(self
            .conn
            .query_row(
                "SELECT active_notebooks, monthly_entries, total_entries, goal_achievement_rate, updated_at
                 FROM dashboard_stats
                 WHERE user_id = ?1;",
                [user_id.to_string()],
                |row| {
                    Ok(DashboardStats {
                        active_notebooks: row.get(0)?,
                        monthly_entries: row.get(1)?,
                        total_entries: row.get(2)?,
                        goal_achievement_rate: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }
}

/// Inserts one activity row on `conn` (a connection or an open transaction).
pub(crate) fn insert_activity(
    conn: &Connection,
    user_id: UserId,
    activity: &NewActivity,
) -> RepoResult<RecentActivity> {
    let record = RecentActivity {
        id: Uuid::new_v4(),
        user_id,
        activity_type: activity.activity_type,
        title: activity.title.clone(),
        description: activity.description.clone(),
        related_object_id: activity.related_object_id.clone(),
        created_at: now_ms(),
    };
    conn.execute(
        "INSERT INTO recent_activities (
            id, user_id, activity_type, title, description, related_object_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            record.id.to_string(),
            user_id.to_string(),
            record.activity_type.as_str(),
            record.title.as_str(),
            record.description.as_str(),
            record.related_object_id.as_deref(),
            record.created_at
        ],
    )?;
    Ok(record)
}

fn activity_from_row(row: &Row<'_>) -> RepoResult<RecentActivity> {
    let id_text: String = row.get("id")?;
    let user_text: String = row.get("user_id")?;
    let kind: String = row.get("activity_type")?;
    Ok(RecentActivity {
        id: parse_uuid(&id_text, "recent_activities.id")?,
        user_id: parse_uuid(&user_text, "recent_activities.user_id")?,
        activity_type: ActivityType::parse(&kind)
            .ok_or_else(|| invalid_enum("recent_activities.activity_type", &kind))?,
        title: row.get("title")?,
        description: row.get("description")?,
        related_object_id: row.get("related_object_id")?,
        created_at: row.get("created_at")?,
    })
}
