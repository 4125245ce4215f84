use kabunote_core::db::open_db_in_memory;
use kabunote_core::model::activity::{ActivityType, NewActivity};
use kabunote_core::model::entry::{EntryDraft, EntryType};
use kabunote_core::model::notebook::{NotebookDraft, NotebookStatus};
use kabunote_core::repo::account_repo::{AccountRepository, NewUser, SqliteAccountRepository};
use kabunote_core::repo::activity_repo::{DashboardRepository, SqliteDashboardRepository};
use kabunote_core::repo::entry_repo::{EntryRepository, SqliteEntryRepository};
use kabunote_core::repo::notebook_repo::{NotebookRepository, SqliteNotebookRepository};
use kabunote_core::repo::tag_repo::SqliteTagRepository;
use kabunote_core::service::dashboard_service::{Dashboard, DashboardService};
use kabunote_core::UserId;
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

fn load_dashboard(conn: &Connection, user_id: UserId) -> Dashboard {
    DashboardService::new(
        SqliteAccountRepository::try_new(conn).unwrap(),
        SqliteDashboardRepository::try_new(conn).unwrap(),
        SqliteNotebookRepository::try_new(conn).unwrap(),
        SqliteTagRepository::try_new(conn).unwrap(),
    )
    .dashboard(user_id)
    .unwrap()
}

fn goal(title: &str, achieved: bool) -> EntryDraft {
    EntryDraft {
        entry_type: EntryType::Goal,
        title: title.to_string(),
        content: json!({"target": title, "achieved": achieved}),
        ..EntryDraft::default()
    }
}

#[test]
fn stats_count_active_notebooks_entries_and_goals() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "planner");
    let notebooks = SqliteNotebookRepository::try_new(&conn).unwrap();
    let entries = SqliteEntryRepository::try_new(&conn).unwrap();

    let active = notebooks
        .create_notebook(
            user_id,
            &NotebookDraft {
                title: "目標管理".to_string(),
                tags: vec!["#投資目標".to_string()],
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    notebooks
        .create_notebook(
            user_id,
            &NotebookDraft {
                title: "過去の銘柄".to_string(),
                status: NotebookStatus::Archived,
                ..NotebookDraft::default()
            },
        )
        .unwrap();
    for (title, achieved) in [("配当10万円", true), ("資産1000万円", false), ("NISA枠", true)] {
        entries
            .create_entry(user_id, active.id, &goal(title, achieved))
            .unwrap();
    }
    entries
        .create_entry(
            user_id,
            active.id,
            &EntryDraft {
                title: "メモ".to_string(),
                ..EntryDraft::default()
            },
        )
        .unwrap();

    let dashboard = load_dashboard(&conn, user_id);
    let stats = dashboard.stats.unwrap();
    assert_eq!(stats.active_notebooks, 1);
    assert_eq!(stats.total_entries, 4);
    assert_eq!(stats.monthly_entries, 4);
    assert_eq!(stats.goal_achievement_rate, 66.7);

    let stored = SqliteDashboardRepository::try_new(&conn)
        .unwrap()
        .get_stats(user_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_entries, 4);

    assert_eq!(dashboard.recent_notebooks.len(), 2);
    assert_eq!(dashboard.trending_tags.len(), 1);
    assert_eq!(dashboard.trending_tags[0].name, "#投資目標");
}

#[test]
fn recent_activity_is_newest_first_and_capped() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "busy");
    let repo = SqliteDashboardRepository::try_new(&conn).unwrap();
    for index in 0..7 {
        repo.record_activity(
            user_id,
            &NewActivity {
                activity_type: ActivityType::PriceAlert,
                title: format!("アラート{index}"),
                description: String::new(),
                related_object_id: None,
            },
        )
        .unwrap();
    }

    let dashboard = load_dashboard(&conn, user_id);
    assert_eq!(dashboard.recent_activities.len(), 5);
    assert_eq!(dashboard.recent_activities[0].activity.title, "アラート6");
    assert_eq!(dashboard.recent_activities[0].relative_time, "たった今");
}

#[test]
fn disabled_sections_come_back_empty() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "minimal");
    SqliteNotebookRepository::try_new(&conn)
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

    let accounts = SqliteAccountRepository::try_new(&conn).unwrap();
    let mut settings = accounts.get_settings(user_id).unwrap().unwrap();
    settings.show_statistics = false;
    settings.show_recent_activity = false;
    settings.show_trending_tags = false;
    accounts.update_settings(user_id, &settings).unwrap();

    let dashboard = load_dashboard(&conn, user_id);
    assert!(dashboard.stats.is_none());
    assert!(dashboard.recent_activities.is_empty());
    assert!(dashboard.trending_tags.is_empty());
    assert_eq!(dashboard.recent_notebooks.len(), 1);
}

#[test]
fn empty_account_has_zero_rate() {
    let conn = open_db_in_memory().unwrap();
    let user_id = create_user(&conn, "fresh");

    let stats = load_dashboard(&conn, user_id).stats.unwrap();
    assert_eq!(stats.total_entries, 0);
    assert_eq!(stats.goal_achievement_rate, 0.0);
}
