//! Ordered schema migrations.
//!
//! # Responsibility
//! - List the SQL files that build the kabunote schema.
//! - Bring a connection from its stored version up to [`latest_version`] in
//!   one transaction.
//!
//! # Invariants
//! - Versions start at 1 and increase by exactly one per file.
//! - `PRAGMA user_version` always equals the last applied version.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

/// `(version, name, sql)` in apply order.
const MIGRATIONS: [(u32, &str, &str); 4] = [
    (1, "accounts", include_str!("0001_accounts.sql")),
    (2, "tags", include_str!("0002_tags.sql")),
    (3, "notes", include_str!("0003_notes.sql")),
    (4, "dashboard", include_str!("0004_dashboard.sql")),
];

/// What a migration run changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<&'static str>,
}

pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Applies every migration newer than the stored schema version.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationReport> {
    let from_version = current_user_version(conn)?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::SchemaTooNew {
            found: from_version,
            supported: latest,
        });
    }

    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        applied: Vec::new(),
    };
    let pending: Vec<_> = MIGRATIONS
        .iter()
        .filter(|(version, _, _)| *version > from_version)
        .collect();
    if pending.is_empty() {
        return Ok(report);
    }

    let tx = conn.transaction()?;
    for (version, name, sql) in pending {
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        report.to_version = *version;
        report.applied.push(*name);
    }
    tx.commit()?;

    log::info!(
        "event=db_migrate module=db status=ok from={} to={} applied={}",
        report.from_version,
        report.to_version,
        report.applied.join(",")
    );
    Ok(report)
}

pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, latest_version, MIGRATIONS};
    use rusqlite::Connection;

    #[test]
    fn versions_are_contiguous() {
        for (index, (version, _, _)) in MIGRATIONS.iter().enumerate() {
            assert_eq!(*version as usize, index + 1);
        }
    }

    #[test]
    fn fresh_database_applies_everything_then_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();

        let first = apply_migrations(&mut conn).unwrap();
        assert_eq!(first.from_version, 0);
        assert_eq!(first.to_version, latest_version());
        assert_eq!(first.applied, vec!["accounts", "tags", "notes", "dashboard"]);

        let second = apply_migrations(&mut conn).unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.to_version, latest_version());
    }

    #[test]
    fn partially_migrated_database_resumes() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].2).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        let report = apply_migrations(&mut conn).unwrap();
        assert_eq!(report.from_version, 1);
        assert_eq!(report.applied, vec!["tags", "notes", "dashboard"]);
    }
}
