use kabunote_core::db::open_db_in_memory;
use kabunote_core::model::entry::{EntryDraft, EntryType};
use kabunote_core::model::notebook::{NotebookDraft, NotebookType};
use kabunote_core::repo::account_repo::{AccountRepository, NewUser, SqliteAccountRepository};
use kabunote_core::repo::entry_repo::{EntryRepository, SqliteEntryRepository};
use kabunote_core::repo::notebook_repo::{NotebookRepository, SqliteNotebookRepository};
use kabunote_core::{search_all, Notebook, SearchQuery, UserId};
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

fn notebook(conn: &Connection, user_id: UserId, draft: NotebookDraft) -> Notebook {
    SqliteNotebookRepository::try_new(conn)
        .unwrap()
        .create_notebook(user_id, &draft)
        .unwrap()
}

/// Toyota notebook with one coded entry, plus an unrelated notebook with a
/// tagged entry.
fn seed(conn: &Connection, user_id: UserId) -> (Notebook, Notebook) {
    let toyota = notebook(
        conn,
        user_id,
        NotebookDraft {
            title: "トヨタ自動車".to_string(),
            notebook_type: NotebookType::Stock,
            stock_code: "7203".to_string(),
            company_name: "トヨタ自動車".to_string(),
            ..NotebookDraft::default()
        },
    );
    let watch = notebook(
        conn,
        user_id,
        NotebookDraft {
            title: "ウォッチリスト".to_string(),
            description: "気になる銘柄".to_string(),
            ..NotebookDraft::default()
        },
    );

    let entries = SqliteEntryRepository::try_new(conn).unwrap();
    entries
        .create_entry(
            user_id,
            toyota.id,
            &EntryDraft {
                entry_type: EntryType::Analysis,
                title: "第3四半期決算".to_string(),
                content: json!({"summary": "営業利益が大幅増"}),
                stock_code: "7203".to_string(),
                ..EntryDraft::default()
            },
        )
        .unwrap();
    entries
        .create_entry(
            user_id,
            watch.id,
            &EntryDraft {
                title: "自動車セクターの動向".to_string(),
                content: json!({"observation": "EV 需要"}),
                tags: vec!["#7203トヨタ".to_string()],
                is_bookmarked: true,
                ..EntryDraft::default()
            },
        )
        .unwrap();
    (toyota, watch)
}

#[test]
fn stock_code_matches_notebooks_and_entries() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "searcher");
    let (toyota, _) = seed(&conn, user_id);

    let results = search_all(&conn, user_id, &SearchQuery::new("7203")).unwrap();
    assert_eq!(results.terms, vec!["7203"]);
    assert_eq!(results.notebooks.len(), 1);
    assert_eq!(results.notebooks[0].notebook.id, toyota.id);
    assert!(results.notebooks[0].snippet_html.contains("<mark>7203</mark>"));

    // One entry carries the code, the other only through its tag.
    assert_eq!(results.entries.len(), 2);
    let tagged = results
        .entries
        .iter()
        .find(|hit| hit.entry.title == "自動車セクターの動向")
        .unwrap();
    assert_eq!(tagged.matches.tags, 1);
    assert_eq!(tagged.matches.title, 0);
    assert_eq!(results.total(), 3);
}

#[test]
fn terms_are_and_combined() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "searcher");
    seed(&conn, user_id);

    let results = search_all(&conn, user_id, &SearchQuery::new("決算\u{3000}営業利益")).unwrap();
    assert!(results.notebooks.is_empty());
    assert_eq!(results.entries.len(), 1);
    assert_eq!(
        results.entries[0].title_html,
        "第3四半期<mark>決算</mark>"
    );

    let none = search_all(&conn, user_id, &SearchQuery::new("決算 ソニー")).unwrap();
    assert_eq!(none.total(), 0);
}

#[test]
fn entry_filters_skip_notebooks() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "searcher");
    seed(&conn, user_id);

    let bookmarked = search_all(
        &conn,
        user_id,
        &SearchQuery {
            bookmarked_only: true,
            ..SearchQuery::new("7203")
        },
    )
    .unwrap();
    assert!(bookmarked.notebooks.is_empty());
    assert_eq!(bookmarked.entries.len(), 1);
    assert!(bookmarked.entries[0].entry.is_bookmarked);

    let analysis = search_all(
        &conn,
        user_id,
        &SearchQuery {
            entry_type: Some(EntryType::Analysis),
            ..SearchQuery::new("7203")
        },
    )
    .unwrap();
    assert_eq!(analysis.entries.len(), 1);
    assert_eq!(analysis.entries[0].entry.entry_type, EntryType::Analysis);
}

#[test]
fn results_never_include_other_users_rows() {
    let conn = open_db_in_memory().unwrap();
    let owner = create_user(&conn, "owner");
    let stranger = create_user(&conn, "stranger");
    seed(&conn, owner);

    let results = search_all(&conn, stranger, &SearchQuery::new("7203")).unwrap();
    assert_eq!(results.total(), 0);
}

#[test]
fn blank_query_returns_nothing() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "searcher");
    seed(&conn, user_id);

    let results = search_all(&conn, user_id, &SearchQuery::new(" \t ")).unwrap();
    assert!(results.terms.is_empty());
    assert_eq!(results.total(), 0);
}

#[test]
fn user_markup_is_escaped_and_wildcards_are_literal() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "searcher");
    notebook(
        &conn,
        user_id,
        NotebookDraft {
            title: "<b>利回り</b> 5%超".to_string(),
            ..NotebookDraft::default()
        },
    );
    notebook(
        &conn,
        user_id,
        NotebookDraft {
            title: "利回り 50倍".to_string(),
            ..NotebookDraft::default()
        },
    );

    let results = search_all(&conn, user_id, &SearchQuery::new("5%")).unwrap();
    assert_eq!(results.notebooks.len(), 1);
    assert_eq!(
        results.notebooks[0].title_html,
        "&lt;b&gt;利回り&lt;/b&gt; <mark>5%</mark>超"
    );
}
