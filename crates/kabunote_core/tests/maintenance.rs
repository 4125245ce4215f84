use kabunote_core::db::open_db_in_memory;
use kabunote_core::model::account::Theme;
use kabunote_core::model::entry::EntryDraft;
use kabunote_core::model::notebook::NotebookDraft;
use kabunote_core::model::tag::TagCategory;
use kabunote_core::repo::account_repo::{AccountRepository, NewUser, SqliteAccountRepository};
use kabunote_core::repo::entry_repo::{EntryRepository, SqliteEntryRepository};
use kabunote_core::repo::notebook_repo::{NotebookRepository, SqliteNotebookRepository};
use kabunote_core::repo::tag_repo::{NewTag, SqliteTagRepository, TagRepository};
use kabunote_core::service::demo::{create_demo_users, create_sample_data, DemoOptions};
use kabunote_core::service::maintenance::{admin_overview, fix_duplicate_profiles, recount_all};
use kabunote_core::service::tag_admin::{
    self, ExportFormat, ImportFormat, TagImportRecord, CLEANUP_DEFAULT_DAYS,
};
use kabunote_core::{MaintenanceError, UserId};
use rusqlite::Connection;
use std::fs;

fn create_user(conn: &Connection, username: &str) -> UserId {
    SqliteAccountRepository::try_new(conn)
        .unwrap()
        .create_user(&NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: "unused".to_string(),
            first_name: String::new(),
            is_staff: false,
            is_superuser: false,
        })
        .unwrap()
        .id
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

fn tag_usage(conn: &Connection, user_id: UserId, name: &str) -> i64 {
    SqliteTagRepository::try_new(conn)
        .unwrap()
        .find_tag_by_name(user_id, name)
        .unwrap()
        .unwrap()
        .usage_count
}

#[test]
fn fix_duplicate_profiles_keeps_one_row_per_user() {
    let conn = open_db_in_memory().unwrap();
    let first = create_user(&conn, "first");
    let second = create_user(&conn, "second");

    conn.execute_batch(
        "DROP INDEX idx_user_profiles_user_id;
         DROP INDEX idx_user_settings_user_id;",
    )
    .unwrap();
    for _ in 0..2 {
        conn.execute(
            "INSERT INTO user_profiles (user_id) VALUES (?1);",
            [first.to_string()],
        )
        .unwrap();
    }
    conn.execute(
        "INSERT INTO user_settings (user_id) VALUES (?1);",
        [first.to_string()],
    )
    .unwrap();
    conn.execute(
        "DELETE FROM user_settings WHERE user_id = ?1;",
        [second.to_string()],
    )
    .unwrap();

    let preview = fix_duplicate_profiles(&conn, true).unwrap();
    assert!(preview.dry_run);
    assert_eq!(preview.users_checked, 2);
    assert_eq!(preview.duplicate_profiles, 2);
    assert_eq!(preview.duplicate_settings, 1);
    assert_eq!(preview.missing_profiles, 0);
    assert_eq!(preview.missing_settings, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM user_profiles;"), 4);

    let repaired = fix_duplicate_profiles(&conn, false).unwrap();
    assert!(!repaired.is_clean());
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM user_profiles;"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM user_settings;"), 2);

    // The unique indexes are back, so duplicates can no longer be inserted.
    assert!(conn
        .execute(
            "INSERT INTO user_profiles (user_id) VALUES (?1);",
            [first.to_string()],
        )
        .is_err());
    assert!(fix_duplicate_profiles(&conn, true).unwrap().is_clean());
}

#[test]
fn recount_repairs_drifted_counters() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "drifted");
    let notebook = SqliteNotebookRepository::try_new(&conn)
        .unwrap()
        .create_notebook(
            user_id,
            &NotebookDraft {
                title: "高配当".to_string(),
                tags: vec!["#高配当".to_string()],
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    SqliteEntryRepository::try_new(&conn)
        .unwrap()
        .create_entry(
            user_id,
            notebook.id,
            &EntryDraft {
                title: "メモ".to_string(),
                ..EntryDraft::default()
            },
        )
        .unwrap();

    conn.execute_batch(
        "UPDATE notebooks SET entry_count = 9;
         UPDATE tags SET usage_count = 7;
         UPDATE user_profiles SET total_notebooks = 0, total_entries = 0;",
    )
    .unwrap();

    let report = recount_all(&conn).unwrap();
    assert_eq!(report.notebooks, 1);
    assert_eq!(report.tags, 1);
    assert_eq!(count(&conn, "SELECT entry_count FROM notebooks;"), 1);
    assert_eq!(tag_usage(&conn, user_id, "#高配当"), 1);
    assert_eq!(count(&conn, "SELECT total_entries FROM user_profiles;"), 1);

    let again = recount_all(&conn).unwrap();
    assert_eq!(again.notebooks, 0);
    assert_eq!(again.tags, 0);
}

#[test]
fn update_counts_without_all_only_fixes_zero_usage_tags() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "counts");
    SqliteNotebookRepository::try_new(&conn)
        .unwrap()
        .create_notebook(
            user_id,
            &NotebookDraft {
                title: "二つのタグ".to_string(),
                tags: vec!["#成長株".to_string(), "#割安株".to_string()],
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    conn.execute("UPDATE tags SET usage_count = 0 WHERE name = '#成長株';", [])
        .unwrap();
    conn.execute("UPDATE tags SET usage_count = 5 WHERE name = '#割安株';", [])
        .unwrap();

    let zero_only = tag_admin::update_counts(&conn, Some(user_id), false).unwrap();
    assert_eq!(zero_only.checked, 1);
    assert_eq!(zero_only.updated, 1);
    assert_eq!(tag_usage(&conn, user_id, "#成長株"), 1);
    assert_eq!(tag_usage(&conn, user_id, "#割安株"), 5);

    let all = tag_admin::update_counts(&conn, None, true).unwrap();
    assert_eq!(all.checked, 2);
    assert_eq!(all.updated, 1);
    assert_eq!(tag_usage(&conn, user_id, "#割安株"), 1);
}

#[test]
fn cleanup_deactivates_only_unlinked_tags() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "tidy");
    SqliteNotebookRepository::try_new(&conn)
        .unwrap()
        .create_notebook(
            user_id,
            &NotebookDraft {
                title: "使用中".to_string(),
                tags: vec!["#使用中".to_string()],
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    let tags = SqliteTagRepository::try_new(&conn).unwrap();
    for name in ["#未使用", "#古いタグ"] {
        tags.create_tag(
            user_id,
            &NewTag {
                name: name.to_string(),
                ..NewTag::default()
            },
        )
        .unwrap();
    }
    conn.execute(
        "UPDATE tags SET usage_count = 3, updated_at = 0 WHERE name = '#古いタグ';",
        [],
    )
    .unwrap();
    // Linked tags survive even when stale.
    conn.execute("UPDATE tags SET updated_at = 0 WHERE name = '#使用中';", [])
        .unwrap();

    let preview = tag_admin::cleanup(&conn, Some(user_id), CLEANUP_DEFAULT_DAYS, true).unwrap();
    let names: Vec<&str> = preview.candidates.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(names, vec!["#古いタグ", "#未使用"]);
    assert_eq!(preview.deactivated, 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tags WHERE is_active = 1;"), 3);

    let applied = tag_admin::cleanup(&conn, None, CLEANUP_DEFAULT_DAYS, false).unwrap();
    assert_eq!(applied.deactivated, 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tags WHERE is_active = 1;"), 1);
}

#[test]
fn stats_summarize_by_category() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "stats");
    SqliteNotebookRepository::try_new(&conn)
        .unwrap()
        .create_notebook(
            user_id,
            &NotebookDraft {
                title: "トヨタ".to_string(),
                tags: vec!["#7203トヨタ".to_string(), "#高配当".to_string()],
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    SqliteTagRepository::try_new(&conn)
        .unwrap()
        .create_tag(
            user_id,
            &NewTag {
                name: "#配当株".to_string(),
                ..NewTag::default()
            },
        )
        .unwrap();

    let summary = tag_admin::stats(&conn, Some(user_id), None, true).unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.used, 2);
    assert_eq!(summary.total_usage, 2);
    assert_eq!(summary.by_category["STYLE"].total, 2);
    assert_eq!(summary.by_category["STOCK"].usage, 1);
    assert_eq!(summary.by_category.len(), TagCategory::ALL.len());
    assert_eq!(summary.unused_count, Some(1));
    assert_eq!(summary.top_tags.len(), 2);

    let only_stock = tag_admin::stats(&conn, None, Some(TagCategory::Stock), false).unwrap();
    assert_eq!(only_stock.by_category.len(), 1);
    assert!(only_stock.unused_count.is_none());
}

#[test]
fn duplicate_tags_merge_into_most_used() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "merger");
    let notebooks = SqliteNotebookRepository::try_new(&conn).unwrap();
    notebooks
        .create_notebook(
            user_id,
            &NotebookDraft {
                title: "一".to_string(),
                tags: vec!["#NISA".to_string()],
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    notebooks
        .create_notebook(
            user_id,
            &NotebookDraft {
                title: "二".to_string(),
                tags: vec!["#nisa".to_string()],
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    notebooks
        .create_notebook(
            user_id,
            &NotebookDraft {
                title: "三".to_string(),
                tags: vec!["#nisa".to_string(), "#NISA".to_string()],
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    let lower_id = SqliteTagRepository::try_new(&conn)
        .unwrap()
        .find_tag_by_name(user_id, "#nisa")
        .unwrap()
        .unwrap()
        .id;

    let found = tag_admin::check_duplicates(&conn, Some(user_id), false).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].duplicates.len(), 1);
    assert!(found[0].merged_into.is_none());

    let merged = tag_admin::check_duplicates(&conn, Some(user_id), true).unwrap();
    let keep = merged[0].merged_into.unwrap();
    // Both tags have two links; the lower id wins the tie.
    assert_eq!(keep, found[0].primary.id);
    assert_ne!(keep, lower_id);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tags;"), 1);
    assert_eq!(count(&conn, "SELECT usage_count FROM tags;"), 3);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM notebook_tags;"), 3);
    assert!(tag_admin::check_duplicates(&conn, None, false)
        .unwrap()
        .is_empty());
}

#[test]
fn export_then_import_into_another_user() {
    let conn = open_db_in_memory().unwrap();
    let source = create_user(&conn, "source");
    let target = create_user(&conn, "target");
    let tags = SqliteTagRepository::try_new(&conn).unwrap();
    for (name, description) in [("#高配当", "利回り重視"), ("#決算分析", "四半期ごと")] {
        tags.create_tag(
            source,
            &NewTag {
                name: name.to_string(),
                description: description.to_string(),
                ..NewTag::default()
            },
        )
        .unwrap();
    }
    tags.create_tag(
        target,
        &NewTag {
            name: "#高配当".to_string(),
            category: Some(TagCategory::Other),
            ..NewTag::default()
        },
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    for format in [ExportFormat::Csv, ExportFormat::Json] {
        let path = dir.path().join(format!("tags.{}", format.extension()));
        let (written_path, written) =
            tag_admin::export_to_file(&conn, Some(source), format, false, Some(&path)).unwrap();
        assert_eq!(written_path, path);
        assert_eq!(written, 2);
    }

    let mut xml = Vec::new();
    tag_admin::export_tags(&conn, Some(source), ExportFormat::Xml, false, &mut xml).unwrap();
    let xml = String::from_utf8(xml).unwrap();
    assert!(xml.contains("<name>#決算分析</name>"));
    assert!(xml.contains("<category>ANALYSIS</category>"));

    let records =
        tag_admin::read_import_file(&dir.path().join("tags.csv"), ImportFormat::Csv).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].category.as_deref(), Some("ANALYSIS"));

    let preview = tag_admin::import_tags(&conn, target, &records, true).unwrap();
    assert_eq!((preview.created, preview.updated), (1, 1));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tags;"), 3);

    let applied = tag_admin::import_tags(&conn, target, &records, false).unwrap();
    assert_eq!((applied.created, applied.updated, applied.skipped), (1, 1, 0));
    let updated = tags.find_tag_by_name(target, "#高配当").unwrap().unwrap();
    assert_eq!(updated.category, TagCategory::Style);
    assert_eq!(updated.description, "利回り重視");
    assert_eq!(updated.usage_count, 0);

    let json_records =
        tag_admin::read_import_file(&dir.path().join("tags.json"), ImportFormat::Json).unwrap();
    assert_eq!(json_records.len(), 2);
}

#[test]
fn import_skips_invalid_names_and_requires_user() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "importer");
    let records = vec![
        TagImportRecord {
            name: "#".to_string(),
            ..TagImportRecord::default()
        },
        TagImportRecord {
            name: "長期投資".to_string(),
            is_active: Some(false),
            ..TagImportRecord::default()
        },
    ];

    let report = tag_admin::import_tags(&conn, user_id, &records, false).unwrap();
    assert_eq!((report.read, report.created, report.skipped), (2, 1, 1));
    let created = SqliteTagRepository::try_new(&conn)
        .unwrap()
        .find_tag_by_name(user_id, "#長期投資")
        .unwrap()
        .unwrap();
    assert_eq!(created.category, TagCategory::Strategy);
    assert!(!created.is_active);

    let err = tag_admin::import_tags(&conn, uuid::Uuid::new_v4(), &records, false).unwrap_err();
    assert!(matches!(err, MaintenanceError::Invalid(_)));
}

#[test]
fn malformed_import_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let json_path = dir.path().join("object.json");
    fs::write(&json_path, r##"{"name": "#高配当"}"##).unwrap();
    assert!(matches!(
        tag_admin::read_import_file(&json_path, ImportFormat::Json).unwrap_err(),
        MaintenanceError::Invalid(_)
    ));

    let csv_path = dir.path().join("nameless.csv");
    fs::write(&csv_path, "category,description\nSTYLE,x\n").unwrap();
    assert!(matches!(
        tag_admin::read_import_file(&csv_path, ImportFormat::Csv).unwrap_err(),
        MaintenanceError::Invalid(_)
    ));
}

#[test]
fn backup_writes_all_tags_including_inactive() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "backup");
    let tags = SqliteTagRepository::try_new(&conn).unwrap();
    for name in ["#一", "#二"] {
        tags.create_tag(
            user_id,
            &NewTag {
                name: name.to_string(),
                ..NewTag::default()
            },
        )
        .unwrap();
    }
    conn.execute("UPDATE tags SET is_active = 0 WHERE name = '#二';", [])
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("backups");
    let (path, written) = tag_admin::backup_tags(&conn, None, &output).unwrap();
    assert_eq!(written, 2);
    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("tags_backup_"));
    assert!(file_name.ends_with(".json"));

    let backup: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(backup["total_count"], 2);
    assert_eq!(backup["tags"].as_array().unwrap().len(), 2);
    assert!(backup["timestamp"].is_string());
}

#[test]
fn demo_users_are_created_once_unless_forced() {
    let conn = open_db_in_memory().unwrap();
    let options = DemoOptions {
        users: 2,
        with_admin: true,
        force: false,
    };

    let report = create_demo_users(&conn, &options).unwrap();
    let names: Vec<&str> = report.created.iter().map(|a| a.username.as_str()).collect();
    assert_eq!(names, vec!["admin", "demo_user", "demo_user2"]);
    assert!(report.created[0].is_admin);

    let accounts = SqliteAccountRepository::try_new(&conn).unwrap();
    let admin = accounts.find_user_by_login("admin").unwrap().unwrap();
    assert!(admin.is_staff && admin.is_superuser);
    let second = accounts.find_user_by_login("demo_user2").unwrap().unwrap();
    let settings = accounts.get_settings(second.id).unwrap().unwrap();
    assert_eq!(settings.theme, Theme::Light);
    assert_eq!(settings.items_per_page, 15);

    let first = accounts.find_user_by_login("demo_user").unwrap().unwrap();
    assert_eq!(
        count(
            &conn,
            &format!("SELECT entry_count FROM notebooks WHERE user_id = '{}';", first.id)
        ),
        1
    );

    assert!(create_demo_users(&conn, &options).unwrap().skipped_existing);
    let forced = create_demo_users(
        &conn,
        &DemoOptions {
            force: true,
            ..options
        },
    )
    .unwrap();
    assert!(forced.created.is_empty());
    assert_eq!(forced.existing.len(), 3);
}

#[test]
fn sample_data_is_idempotent() {
    let conn = open_db_in_memory().unwrap();

    let first = create_sample_data(&conn).unwrap();
    assert!(first.user_created);
    assert_eq!(first.tags_created, 9);
    assert_eq!(first.notebooks_created, 2);
    assert_eq!(first.entries_created, 2);

    let user = SqliteAccountRepository::try_new(&conn)
        .unwrap()
        .find_user_by_login("sample_user")
        .unwrap()
        .unwrap();
    assert_eq!(tag_usage(&conn, user.id, "#長期投資"), 4);
    assert_eq!(tag_usage(&conn, user.id, "#7203トヨタ"), 2);

    let second = create_sample_data(&conn).unwrap();
    assert!(!second.user_created);
    assert_eq!(second.tags_created, 0);
    assert_eq!(second.notebooks_created, 0);

    let overview = admin_overview(&conn).unwrap();
    assert_eq!(overview.users, 1);
    assert_eq!(overview.staff_users, 1);
    assert_eq!(overview.notebooks, 2);
    assert_eq!(overview.entries, 2);
    assert_eq!(overview.tags, 9);
}
