use clap::Parser;
use kabunote_cli::{run, Cli};
use kabunote_core::open_db;
use kabunote_core::repo::account_repo::{AccountRepository, NewUser, SqliteAccountRepository};
use kabunote_core::repo::tag_repo::{NewTag, SqliteTagRepository, TagRepository};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

fn kabunote(db: &Path, args: &[&str], answer: &str) -> anyhow::Result<String> {
    let db = db.to_string_lossy().to_string();
    let mut argv = vec!["kabunote", "--db", db.as_str()];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv)?;

    let mut out = Vec::new();
    let mut input = Cursor::new(answer.as_bytes().to_vec());
    run(cli, &mut out, &mut input)?;
    Ok(String::from_utf8(out)?)
}

fn seed_unlinked_tag(db: &Path, username: &str, tag: &str) {
    let conn = open_db(db).unwrap();
    let user_id = SqliteAccountRepository::try_new(&conn)
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
        .id;
    SqliteTagRepository::try_new(&conn)
        .unwrap()
        .create_tag(
            user_id,
            &NewTag {
                name: tag.to_string(),
                ..NewTag::default()
            },
        )
        .unwrap();
}

#[test]
fn demo_users_are_created_once() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("kabunote.sqlite3");

    let output = kabunote(&db, &["create-demo-user", "--with-admin"], "").unwrap();
    assert!(output.contains("Created 2 demo user(s):"), "{output}");
    assert!(output.contains("admin <admin@example.com>"));
    assert!(output.contains("demo_user <demo@example.com>"));

    let again = kabunote(&db, &["create-demo-user"], "").unwrap();
    assert!(again.starts_with("Users already exist"), "{again}");

    assert!(kabunote(&db, &["create-demo-user", "--users", "0"], "").is_err());
}

#[test]
fn sample_data_then_tag_stats_and_recount() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("kabunote.sqlite3");

    let output = kabunote(&db, &["create-sample-data"], "").unwrap();
    assert!(output.contains("Created user sample_user"), "{output}");

    let stats = kabunote(&db, &["manage-tags", "--user", "sample_user", "stats", "--detailed"], "")
        .unwrap();
    assert!(stats.starts_with("Tags: "), "{stats}");
    assert!(stats.contains("Top tags:"));

    let recount = kabunote(&db, &["recount"], "").unwrap();
    assert!(recount.starts_with("Recounted notebooks="), "{recount}");

    let counts = kabunote(&db, &["manage-tags", "update-counts", "--all"], "").unwrap();
    assert!(counts.starts_with("Checked "), "{counts}");
}

#[test]
fn cleanup_asks_before_deactivating() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("kabunote.sqlite3");
    seed_unlinked_tag(&db, "cleaner", "#使わないタグ");

    let dry = kabunote(&db, &["manage-tags", "cleanup", "--dry-run"], "").unwrap();
    assert!(dry.contains("#使わないタグ"), "{dry}");
    assert!(dry.contains("Dry run"));

    let declined = kabunote(&db, &["manage-tags", "cleanup"], "n\n").unwrap();
    assert!(declined.contains("[y/N]"));
    assert!(declined.ends_with("Cancelled.\n"), "{declined}");

    let accepted = kabunote(&db, &["manage-tags", "cleanup"], "y\n").unwrap();
    assert!(accepted.ends_with("Deactivated 1 tag(s).\n"), "{accepted}");

    let nothing = kabunote(&db, &["manage-tags", "cleanup", "--force"], "").unwrap();
    assert_eq!(nothing, "No unused tags to clean up.\n");
}

#[test]
fn export_and_import_between_users() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("kabunote.sqlite3");
    seed_unlinked_tag(&db, "exporter", "#高配当");
    seed_unlinked_tag(&db, "importer", "#自動車");
    let file = dir.path().join("tags.json");
    let file_arg = file.to_string_lossy().to_string();

    let exported = kabunote(
        &db,
        &[
            "manage-tags",
            "--user",
            "exporter",
            "export",
            "--format",
            "json",
            "--output",
            &file_arg,
        ],
        "",
    )
    .unwrap();
    assert!(exported.starts_with("Exported 1 tag(s)"), "{exported}");

    let missing_user = kabunote(&db, &["manage-tags", "import", &file_arg, "--format", "json"], "");
    assert!(missing_user.is_err());

    let imported = kabunote(
        &db,
        &[
            "manage-tags",
            "--user",
            "importer",
            "import",
            &file_arg,
            "--format",
            "json",
        ],
        "",
    )
    .unwrap();
    assert!(imported.contains("1 created"), "{imported}");

    let bad_format = kabunote(&db, &["manage-tags", "export", "--format", "yaml"], "");
    assert!(bad_format.is_err());

    let unknown_user = kabunote(&db, &["manage-tags", "--user", "nobody", "stats"], "");
    assert!(unknown_user.is_err());
}

#[test]
fn duplicate_profile_check_on_clean_database() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("kabunote.sqlite3");
    seed_unlinked_tag(&db, "tidy", "#整理");

    let output = kabunote(&db, &["fix-duplicate-profiles", "--dry-run"], "").unwrap();
    assert!(output.starts_with("Dry run"), "{output}");
    assert!(output.contains("Users checked: 1"));
}

#[test]
fn backup_writes_into_output_dir() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("kabunote.sqlite3");
    seed_unlinked_tag(&db, "keeper", "#保管");
    let backups = dir.path().join("backups");
    let backups_arg = backups.to_string_lossy().to_string();

    let output = kabunote(
        &db,
        &["manage-tags", "backup", "--output-dir", &backups_arg],
        "",
    )
    .unwrap();
    assert!(output.starts_with("Backed up 1 tag(s)"), "{output}");
    assert_eq!(std::fs::read_dir(&backups).unwrap().count(), 1);
}
