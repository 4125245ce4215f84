use kabunote_core::db::open_db_in_memory;
use kabunote_core::model::entry::{EntryDraft, EntryType, RelationType};
use kabunote_core::model::notebook::{NotebookDraft, NotebookStatus, NotebookType};
use kabunote_core::repo::account_repo::{AccountRepository, NewUser, SqliteAccountRepository};
use kabunote_core::repo::entry_repo::{EntryListQuery, EntryRepository, SqliteEntryRepository};
use kabunote_core::repo::notebook_repo::{NotebookRepository, SqliteNotebookRepository};
use kabunote_core::service::entry_service::EntryService;
use kabunote_core::service::notebook_service::{NotebookListParams, NotebookService};
use kabunote_core::{RepoError, ServiceError, UserId};
use rusqlite::Connection;
use serde_json::json;

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

fn notes(conn: &Connection) -> NotebookService<SqliteNotebookRepository<'_>, SqliteEntryRepository<'_>> {
    NotebookService::new(
        SqliteNotebookRepository::try_new(conn).unwrap(),
        SqliteEntryRepository::try_new(conn).unwrap(),
    )
}

fn toyota_draft() -> NotebookDraft {
    NotebookDraft {
        title: " 7203 トヨタ自動車 ".to_string(),
        notebook_type: NotebookType::Stock,
        status: NotebookStatus::Active,
        stock_code: "7203".to_string(),
        company_name: "トヨタ自動車".to_string(),
        key_criteria: vec!["配当性向".to_string(), "  ".to_string()],
        tags: vec!["#7203トヨタ".to_string(), "高配当".to_string()],
        sub_notebooks: vec!["決算".to_string(), "ニュース".to_string()],
        ..NotebookDraft::default()
    }
}

fn memo(title: &str) -> EntryDraft {
    EntryDraft {
        entry_type: EntryType::Memo,
        title: title.to_string(),
        content: json!({"body": "メモ本文"}),
        ..EntryDraft::default()
    }
}

fn stored_entry_count(conn: &Connection, notebook_id: &str) -> (i64, i64) {
    conn.query_row(
        "SELECT n.entry_count, (SELECT COUNT(*) FROM entries WHERE notebook_id = n.id)
         FROM notebooks n WHERE n.id = ?1;",
        [notebook_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .unwrap()
}

#[test]
fn create_notebook_normalizes_and_provisions_children() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "owner");
    let service = notes(&conn);

    let notebook = service.create_notebook(user_id, toyota_draft()).unwrap();
    assert_eq!(notebook.title, "7203 トヨタ自動車");
    assert_eq!(notebook.key_criteria, vec!["配当性向"]);
    assert_eq!(notebook.tags, vec!["#7203トヨタ", "#高配当"]);
    assert_eq!(notebook.entry_count, 0);

    let subs = service.list_sub_notebooks(user_id, notebook.id).unwrap();
    let titles: Vec<&str> = subs.iter().map(|sub| sub.title.as_str()).collect();
    assert_eq!(titles, vec!["決算", "ニュース"]);
    assert_eq!(subs[1].order_index, 1);

    let activity: String = conn
        .query_row(
            "SELECT title FROM recent_activities WHERE user_id = ?1;",
            [user_id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(activity, "7203 トヨタ自動車 - 新規ノート作成");
}

#[test]
fn invalid_notebook_drafts_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "owner");
    let service = notes(&conn);

    let blank = NotebookDraft {
        title: "   ".to_string(),
        ..NotebookDraft::default()
    };
    assert!(matches!(
        service.create_notebook(user_id, blank).unwrap_err(),
        ServiceError::Validation(_)
    ));

    let bad_code = NotebookDraft {
        title: "銘柄".to_string(),
        stock_code: "0123".to_string(),
        ..NotebookDraft::default()
    };
    assert!(service.create_notebook(user_id, bad_code).is_err());
}

#[test]
fn entry_count_tracks_real_entries_through_create_and_delete() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "owner");
    let notebook = notes(&conn).create_notebook(user_id, toyota_draft()).unwrap();
    let notebook_text = notebook.id.to_string();
    let entries = EntryService::new(SqliteEntryRepository::try_new(&conn).unwrap());

    let first = entries.create_entry(user_id, notebook.id, &memo("一つ目")).unwrap();
    let second = entries.create_entry(user_id, notebook.id, &memo("二つ目")).unwrap();
    assert_eq!(stored_entry_count(&conn, &notebook_text), (2, 2));

    entries.delete_entry(user_id, first.id).unwrap();
    assert_eq!(stored_entry_count(&conn, &notebook_text), (1, 1));

    let profile_entries: i64 = conn
        .query_row(
            "SELECT total_entries FROM user_profiles WHERE user_id = ?1;",
            [user_id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(profile_entries, 1);

    entries.delete_entry(user_id, second.id).unwrap();
    assert_eq!(stored_entry_count(&conn, &notebook_text), (0, 0));
}

#[test]
fn sub_notebook_entry_counts_follow_assignment() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "owner");
    let service = notes(&conn);
    let notebook = service.create_notebook(user_id, toyota_draft()).unwrap();
    let sub = service.list_sub_notebooks(user_id, notebook.id).unwrap()[0].clone();
    let repo = SqliteEntryRepository::try_new(&conn).unwrap();

    let entry = repo
        .create_entry(
            user_id,
            notebook.id,
            &EntryDraft {
                sub_notebook_id: Some(sub.id),
                ..memo("決算メモ")
            },
        )
        .unwrap();
    assert_eq!(service.list_sub_notebooks(user_id, notebook.id).unwrap()[0].entry_count, 1);

    let filtered = repo
        .list_entries(
            user_id,
            notebook.id,
            &EntryListQuery {
                sub_notebook_id: Some(sub.id),
                ..EntryListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(filtered.len(), 1);

    repo.update_entry(user_id, entry.id, &memo("決算メモ")).unwrap();
    assert_eq!(service.list_sub_notebooks(user_id, notebook.id).unwrap()[0].entry_count, 0);
}

#[test]
fn entries_from_other_users_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let owner = create_user(&conn, "owner");
    let stranger = create_user(&conn, "stranger");
    let notebook = notes(&conn).create_notebook(owner, toyota_draft()).unwrap();
    let repo = SqliteEntryRepository::try_new(&conn).unwrap();
    let entry = repo.create_entry(owner, notebook.id, &memo("秘密")).unwrap();

    assert!(repo.get_entry(stranger, entry.id).unwrap().is_none());
    assert!(matches!(
        repo.create_entry(stranger, notebook.id, &memo("侵入")).unwrap_err(),
        RepoError::NotFound { .. }
    ));
    assert!(matches!(
        repo.delete_entry(stranger, entry.id).unwrap_err(),
        RepoError::NotFound { .. }
    ));
    assert!(notes(&conn).get_notebook(stranger, notebook.id).is_err());
}

#[test]
fn entry_content_is_shaped_and_summarized() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "owner");
    let notebook = notes(&conn).create_notebook(user_id, toyota_draft()).unwrap();
    let repo = SqliteEntryRepository::try_new(&conn).unwrap();

    let entry = repo
        .create_entry(
            user_id,
            notebook.id,
            &EntryDraft {
                entry_type: EntryType::Analysis,
                title: "決算分析".to_string(),
                content: json!({"summary": "<b>増収</b>   増益", "noise": true}),
                ..EntryDraft::default()
            },
        )
        .unwrap();
    assert_eq!(entry.summary, "増収 増益");
    assert!(entry.content.get("noise").is_none());
    assert_eq!(entry.content["outlook"], json!(""));
}

#[test]
fn bookmark_toggle_and_relations() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "owner");
    let notebook = notes(&conn).create_notebook(user_id, toyota_draft()).unwrap();
    let service = EntryService::new(SqliteEntryRepository::try_new(&conn).unwrap());
    let first = service.create_entry(user_id, notebook.id, &memo("前回")).unwrap();
    let second = service.create_entry(user_id, notebook.id, &memo("続報")).unwrap();

    assert!(service.toggle_bookmark(user_id, first.id).unwrap());
    assert!(!service.toggle_bookmark(user_id, first.id).unwrap());

    let relation = service
        .create_relation(user_id, second.id, first.id, RelationType::FollowUp, "追記")
        .unwrap();
    assert!(matches!(
        service
            .create_relation(user_id, second.id, first.id, RelationType::FollowUp, "")
            .unwrap_err(),
        ServiceError::Conflict(_)
    ));
    assert!(matches!(
        service
            .create_relation(user_id, first.id, first.id, RelationType::Reference, "")
            .unwrap_err(),
        ServiceError::Validation(_)
    ));

    let from_first = service.list_relations(user_id, first.id).unwrap();
    assert_eq!(from_first.len(), 1);
    assert_eq!(from_first[0].id, relation.id);

    service.delete_relation(user_id, relation.id).unwrap();
    assert!(service.list_relations(user_id, first.id).unwrap().is_empty());
}

#[test]
fn deleting_notebook_cascades_and_releases_tags() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "owner");
    let service = notes(&conn);
    let notebook = service.create_notebook(user_id, toyota_draft()).unwrap();
    let repo = SqliteEntryRepository::try_new(&conn).unwrap();
    repo.create_entry(
        user_id,
        notebook.id,
        &EntryDraft {
            tags: vec!["#高配当".to_string()],
            ..memo("配当メモ")
        },
    )
    .unwrap();

    let usage = |name: &str| -> i64 {
        conn.query_row(
            "SELECT usage_count FROM tags WHERE name = ?1;",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    };
    assert_eq!(usage("#高配当"), 2);

    service.delete_notebook(user_id, notebook.id).unwrap();
    assert_eq!(usage("#高配当"), 0);
    assert_eq!(usage("#7203トヨタ"), 0);
    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM entries;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn list_filters_sort_and_paginate() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "owner");
    let service = notes(&conn);
    let toyota = service.create_notebook(user_id, toyota_draft()).unwrap();
    let sony = service
        .create_notebook(
            user_id,
            NotebookDraft {
                title: "6758 ソニー".to_string(),
                status: NotebookStatus::Monitoring,
                stock_code: "6758".to_string(),
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    conn.execute(
        "UPDATE notebooks SET updated_at = 1000 WHERE id = ?1;",
        [toyota.id.to_string()],
    )
    .unwrap();
    conn.execute(
        "UPDATE notebooks SET updated_at = 2000 WHERE id = ?1;",
        [sony.id.to_string()],
    )
    .unwrap();

    let all = service
        .list_notebooks(user_id, &NotebookListParams::default())
        .unwrap();
    assert_eq!(all.total, 2);
    assert_eq!(all.items[0].id, sony.id);
    assert_eq!(all.per_page, 12);
    assert_eq!(all.total_pages, 1);

    let monitoring = service
        .list_notebooks(
            user_id,
            &NotebookListParams {
                status: Some(NotebookStatus::Monitoring),
                ..NotebookListParams::default()
            },
        )
        .unwrap();
    assert_eq!(monitoring.items.len(), 1);
    assert_eq!(monitoring.items[0].id, sony.id);

    let by_tag = service
        .list_notebooks(
            user_id,
            &NotebookListParams {
                tag: Some("高配当".to_string()),
                ..NotebookListParams::default()
            },
        )
        .unwrap();
    assert_eq!(by_tag.items.len(), 1);
    assert_eq!(by_tag.items[0].id, toyota.id);

    let beyond = service
        .list_notebooks(
            user_id,
            &NotebookListParams {
                page: Some(3),
                ..NotebookListParams::default()
            },
        )
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 2);
}

#[test]
fn sub_notebooks_can_be_reordered_and_removed() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "owner");
    let repo = SqliteNotebookRepository::try_new(&conn).unwrap();
    let notebook = repo.create_notebook(user_id, &toyota_draft()).unwrap();
    let third = repo
        .create_sub_notebook(user_id, notebook.id, "リスク", "")
        .unwrap();
    assert_eq!(third.order_index, 2);

    let reordered = repo.move_sub_notebook(user_id, third.id, 0).unwrap();
    let titles: Vec<&str> = reordered.iter().map(|sub| sub.title.as_str()).collect();
    assert_eq!(titles, vec!["リスク", "決算", "ニュース"]);

    repo.delete_sub_notebook(user_id, reordered[1].id).unwrap();
    let remaining = repo.list_sub_notebooks(user_id, notebook.id).unwrap();
    let orders: Vec<i64> = remaining.iter().map(|sub| sub.order_index).collect();
    assert_eq!(orders, vec![0, 1]);
}
