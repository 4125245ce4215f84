//! Operator maintenance: profile repair, counter recount, admin overview.
//!
//! # Responsibility
//! - Repair databases where a user ended up with zero or several
//!   profile/settings rows.
//! - Recompute every denormalized counter from the rows it summarizes.
//!
//! # Invariants
//! - Each operation runs in one `IMMEDIATE` transaction; a dry run rolls it
//!   back after counting.
//! - After a non-dry repair the unique `user_id` indexes exist again.

use crate::db::{now_ms, DbError};
use crate::model::account::default_display_name;
use crate::repo::account_repo::provision_user_rows;
use crate::repo::{parse_uuid, RepoError};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MaintenanceResult<T> = Result<T, MaintenanceError>;

/// Error for operator commands that touch storage and files.
#[derive(Debug)]
pub enum MaintenanceError {
    Repo(RepoError),
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    /// Operator input that cannot be applied (unknown user, bad file shape).
    Invalid(String),
}

impl Display for MaintenanceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Csv(err) => write!(f, "csv error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::Invalid(message) => write!(f, "{message}"),
        }
    }
}

impl Error for MaintenanceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<RepoError> for MaintenanceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for MaintenanceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::Db(DbError::Sqlite(value)))
    }
}

impl From<std::io::Error> for MaintenanceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for MaintenanceError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<serde_json::Error> for MaintenanceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileRepairReport {
    pub dry_run: bool,
    pub users_checked: i64,
    pub duplicate_profiles: usize,
    pub duplicate_settings: usize,
    pub missing_profiles: usize,
    pub missing_settings: usize,
}

impl ProfileRepairReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_profiles == 0
            && self.duplicate_settings == 0
            && self.missing_profiles == 0
            && self.missing_settings == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecountReport {
    pub notebooks: usize,
    pub sub_notebooks: usize,
    pub tags: usize,
    pub profiles: usize,
}

/// Row counts for the staff overview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdminOverview {
    pub users: i64,
    pub staff_users: i64,
    pub notebooks: i64,
    pub entries: i64,
    pub tags: i64,
    pub active_sessions: i64,
    pub activities: i64,
}

/// Removes duplicate profile/settings rows (keeping the oldest) and
/// provisions missing ones.
pub fn fix_duplicate_profiles(
    conn: &Connection,
    dry_run: bool,
) -> MaintenanceResult<ProfileRepairReport> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let mut report = ProfileRepairReport {
        dry_run,
        users_checked: tx.query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))?,
        ..ProfileRepairReport::default()
    };

    report.duplicate_profiles = count_duplicates(&tx, "user_profiles")?;
    report.duplicate_settings = count_duplicates(&tx, "user_settings")?;
    let missing = users_missing_rows(&tx)?;
    report.missing_profiles = missing.iter().filter(|row| !row.has_profile).count();
    report.missing_settings = missing.iter().filter(|row| !row.has_settings).count();

    if dry_run {
        // Dropping the transaction rolls back; nothing was written anyway.
        log::info!(
            "event=profile_repair module=maintenance status=ok dry_run=true duplicates={} missing={}",
            report.duplicate_profiles + report.duplicate_settings,
            report.missing_profiles + report.missing_settings
        );
        return Ok(report);
    }

    for table in ["user_profiles", "user_settings"] {
        tx.execute(
            &format!(
                "DELETE FROM {table}
                 WHERE id NOT IN (SELECT MIN(id) FROM {table} GROUP BY user_id);"
            ),
            [],
        )?;
    }
    for row in &missing {
        let user_id = parse_uuid(&row.user_id, "users.id")?;
        provision_user_rows(
            &tx,
            user_id,
            &default_display_name(&row.first_name, &row.username),
        )?;
    }
    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_user_profiles_user_id ON user_profiles(user_id);
         CREATE UNIQUE INDEX IF NOT EXISTS idx_user_settings_user_id ON user_settings(user_id);",
    )?;
    tx.commit()?;

    log::info!(
        "event=profile_repair module=maintenance status=ok dry_run=false duplicates={} missing={}",
        report.duplicate_profiles + report.duplicate_settings,
        report.missing_profiles + report.missing_settings
    );
    Ok(report)
}

/// Recomputes entry counts, tag usage and profile totals for every row.
pub fn recount_all(conn: &Connection) -> MaintenanceResult<RecountReport> {
    let now = now_ms();
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let notebooks = tx.execute(
        "UPDATE notebooks
         SET entry_count = (SELECT COUNT(*) FROM entries WHERE entries.notebook_id = notebooks.id)
         WHERE entry_count <> (SELECT COUNT(*) FROM entries WHERE entries.notebook_id = notebooks.id);",
        [],
    )?;
    let sub_notebooks = tx.execute(
        "UPDATE sub_notebooks
         SET entry_count = (
            SELECT COUNT(*) FROM entries WHERE entries.sub_notebook_id = sub_notebooks.id
         )
         WHERE entry_count <> (
            SELECT COUNT(*) FROM entries WHERE entries.sub_notebook_id = sub_notebooks.id
         );",
        [],
    )?;
    let tags = recount_tag_usage(&tx, None, true)?;
    let profiles = tx.execute(
        "UPDATE user_profiles
         SET
            total_notebooks = (SELECT COUNT(*) FROM notebooks WHERE notebooks.user_id = user_profiles.user_id),
            total_entries = (
                SELECT COUNT(*)
                FROM entries e
                INNER JOIN notebooks n ON n.id = e.notebook_id
                WHERE n.user_id = user_profiles.user_id
            ),
            updated_at = ?1;",
        [now],
    )?;
    tx.commit()?;

    let report = RecountReport {
        notebooks,
        sub_notebooks,
        tags,
        profiles,
    };
    log::info!(
        "event=recount module=maintenance status=ok notebooks={} sub_notebooks={} tags={} profiles={}",
        report.notebooks,
        report.sub_notebooks,
        report.tags,
        report.profiles
    );
    Ok(report)
}

/// Sets `usage_count` to the real link count; returns how many tags changed.
///
/// Without `all` only tags currently at zero are considered. `user_filter`
/// is a user id string.
pub(crate) fn recount_tag_usage(
    conn: &Connection,
    user_filter: Option<&str>,
    all: bool,
) -> MaintenanceResult<usize> {
    let real_count = "(SELECT COUNT(*) FROM notebook_tags WHERE notebook_tags.tag_id = tags.id)
                    + (SELECT COUNT(*) FROM entry_tags WHERE entry_tags.tag_id = tags.id)";
    let mut sql = format!(
        "UPDATE tags SET usage_count = {real_count}, updated_at = ?1
         WHERE usage_count <> {real_count}
           AND (?2 IS NULL OR user_id = ?2)"
    );
    if !all {
        sql.push_str(" AND usage_count = 0");
    }
    Ok(conn.execute(&sql, rusqlite::params![now_ms(), user_filter])?)
}

/// Row counts shown to staff users.
pub fn admin_overview(conn: &Connection) -> MaintenanceResult<AdminOverview> {
    Ok(conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM users),
            (SELECT COUNT(*) FROM users WHERE is_staff = 1),
            (SELECT COUNT(*) FROM notebooks),
            (SELECT COUNT(*) FROM entries),
            (SELECT COUNT(*) FROM tags),
            (SELECT COUNT(*) FROM sessions WHERE expires_at > ?1),
            (SELECT COUNT(*) FROM recent_activities);",
        [now_ms()],
        |row| {
            Ok(AdminOverview {
                users: row.get(0)?,
                staff_users: row.get(1)?,
                notebooks: row.get(2)?,
                entries: row.get(3)?,
                tags: row.get(4)?,
                active_sessions: row.get(5)?,
                activities: row.get(6)?,
            })
        },
    )?)
}

struct MissingRows {
    user_id: String,
    username: String,
    first_name: String,
    has_profile: bool,
    has_settings: bool,
}

fn count_duplicates(conn: &Connection, table: &str) -> MaintenanceResult<usize> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {table}
             WHERE id NOT IN (SELECT MIN(id) FROM {table} GROUP BY user_id);"
        ),
        [],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn users_missing_rows(conn: &Connection) -> MaintenanceResult<Vec<MissingRows>> {
    let mut stmt = conn.prepare(
        "SELECT
            u.id,
            u.username,
            u.first_name,
            EXISTS(SELECT 1 FROM user_profiles p WHERE p.user_id = u.id),
            EXISTS(SELECT 1 FROM user_settings s WHERE s.user_id = u.id)
         FROM users u
         WHERE NOT EXISTS(SELECT 1 FROM user_profiles p WHERE p.user_id = u.id)
            OR NOT EXISTS(SELECT 1 FROM user_settings s WHERE s.user_id = u.id)
         ORDER BY u.created_at ASC, u.id ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut missing = Vec::new();
    while let Some(row) = rows.next()? {
        missing.push(MissingRows {
            user_id: row.get(0)?,
            username: row.get(1)?,
            first_name: row.get(2)?,
            has_profile: row.get::<_, i64>(3)? == 1,
            has_settings: row.get::<_, i64>(4)? == 1,
        });
    }
    Ok(missing)
}
