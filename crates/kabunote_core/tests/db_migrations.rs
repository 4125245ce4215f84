use kabunote_core::db::migrations::latest_version;
use kabunote_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::{params, Connection};

const TABLES: &[&str] = &[
    "users",
    "user_profiles",
    "user_settings",
    "login_history",
    "sessions",
    "tags",
    "notebooks",
    "notebook_tags",
    "sub_notebooks",
    "entries",
    "entry_tags",
    "entry_relations",
    "dashboard_stats",
    "recent_activities",
];

fn insert_user(conn: &Connection, id: &str, username: &str) {
    conn.execute(
        "INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, 'x');",
        params![id, username],
    )
    .unwrap();
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn fresh_database_has_every_table() {
    let conn = open_db_in_memory().unwrap();
    let version: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap();
    assert_eq!(version, latest_version());

    for table in TABLES {
        let exists = count(
            &conn,
            &format!("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '{table}';"),
        );
        assert_eq!(exists, 1, "missing table {table}");
    }
}

#[test]
fn file_database_keeps_rows_across_reopen_in_wal_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("kabunote.sqlite3");

    let conn = open_db(&path).unwrap();
    insert_user(&conn, "u-1", "keeper");
    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_ascii_lowercase(), "wal");
    drop(conn);

    let reopened = open_db(&path).unwrap();
    assert_eq!(count(&reopened, "SELECT COUNT(*) FROM users;"), 1);
}

#[test]
fn newer_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");
    Connection::open(&path)
        .unwrap()
        .pragma_update(None, "user_version", latest_version() + 1)
        .unwrap();

    match open_db(&path).unwrap_err() {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, latest_version() + 1);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn deleting_a_user_removes_their_rows() {
    let conn = open_db_in_memory().unwrap();
    insert_user(&conn, "u-1", "leaver");
    insert_user(&conn, "u-2", "stayer");
    for user in ["u-1", "u-2"] {
        conn.execute(
            "INSERT INTO notebooks (id, user_id, title) VALUES (?1, ?2, 'nb');",
            params![format!("nb-{user}"), user],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tags (user_id, name) VALUES (?1, '#高配当');",
            [user],
        )
        .unwrap();
    }

    conn.execute("DELETE FROM users WHERE id = 'u-1';", []).unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM notebooks;"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tags;"), 1);
}

#[test]
fn tag_names_are_unique_per_user_only() {
    let conn = open_db_in_memory().unwrap();
    insert_user(&conn, "u-1", "first");
    insert_user(&conn, "u-2", "second");
    let insert = "INSERT INTO tags (user_id, name) VALUES (?1, '#自動車');";

    conn.execute(insert, ["u-1"]).unwrap();
    conn.execute(insert, ["u-2"]).unwrap();
    let err = conn.execute(insert, ["u-1"]).unwrap_err();
    assert!(err.to_string().contains("UNIQUE"));

    let orphan = conn
        .execute("INSERT INTO tags (user_id, name) VALUES ('ghost', '#x');", [])
        .unwrap_err();
    assert!(orphan.to_string().contains("FOREIGN KEY"));
}
