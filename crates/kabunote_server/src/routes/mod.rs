//! Route table.
//!
//! Handlers lock the connection, build the services they need on the spot
//! and return the JSON success envelope.

mod accounts;
mod admin;
mod dashboard;
mod entries;
mod notebooks;
mod search;
mod tags;

use crate::error::ApiResult;
use crate::AppState;
use axum::routing::{delete, get, post, put};
use axum::Router;
use kabunote_core::repo::account_repo::SqliteAccountRepository;
use kabunote_core::repo::entry_repo::SqliteEntryRepository;
use kabunote_core::repo::notebook_repo::SqliteNotebookRepository;
use kabunote_core::repo::tag_repo::SqliteTagRepository;
use kabunote_core::service::account_service::AccountService;
use kabunote_core::service::entry_service::EntryService;
use kabunote_core::service::notebook_service::NotebookService;
use kabunote_core::service::tag_service::TagService;
use rusqlite::Connection;

/// Routes reachable without a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/accounts/signup", post(accounts::signup))
        .route("/api/accounts/login", post(accounts::login))
        .route("/api/accounts/check-username", get(accounts::check_username))
}

/// Routes behind the bearer-session middleware.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/api/accounts/logout", post(accounts::logout))
        .route(
            "/api/accounts/profile",
            get(accounts::get_profile).post(accounts::update_profile),
        )
        .route(
            "/api/accounts/settings",
            get(accounts::get_settings).put(accounts::update_settings),
        )
        .route("/api/accounts/password", post(accounts::change_password))
        .route("/api/accounts/delete", post(accounts::delete_account))
        .route("/api/accounts/login-history", get(accounts::login_history))
        .route(
            "/api/notebooks",
            get(notebooks::list_notebooks).post(notebooks::create_notebook),
        )
        .route(
            "/api/notebooks/:id",
            get(notebooks::notebook_detail)
                .put(notebooks::update_notebook)
                .delete(notebooks::delete_notebook),
        )
        .route("/api/notebooks/:id/entries", get(notebooks::notebook_entries))
        .route("/api/notebooks/:id/stats", get(notebooks::notebook_stats))
        .route(
            "/api/notebooks/:id/sub-notebooks",
            get(notebooks::list_sub_notebooks).post(notebooks::create_sub_notebook),
        )
        .route(
            "/api/sub-notebooks/:id",
            put(notebooks::update_sub_notebook).delete(notebooks::delete_sub_notebook),
        )
        .route(
            "/api/sub-notebooks/:id/move",
            post(notebooks::move_sub_notebook),
        )
        .route("/api/entries", post(entries::create_entry))
        .route(
            "/api/entries/:id",
            get(entries::get_entry)
                .put(entries::update_entry)
                .delete(entries::delete_entry),
        )
        .route("/api/entries/:id/bookmark", post(entries::toggle_bookmark))
        .route(
            "/api/entries/:id/relations",
            get(entries::list_relations).post(entries::create_relation),
        )
        .route(
            "/api/entry-relations/:id",
            delete(entries::delete_relation),
        )
        .route("/api/search", get(search::search))
        .route("/api/tags", post(tags::create_tag))
        .route("/api/tags/search", get(tags::search_tags))
        .route("/api/tags/popular", get(tags::popular_tags))
        .route("/api/tags/suggestions", get(tags::suggestions))
        .route("/api/tags/bulk", post(tags::bulk_action))
        .route(
            "/api/tags/:id",
            put(tags::update_tag).delete(tags::delete_tag),
        )
        .route("/api/dashboard", get(dashboard::dashboard))
        .route("/api/admin/overview", get(admin::overview))
}

fn account_service<'conn>(
    state: &AppState,
    conn: &'conn Connection,
) -> ApiResult<AccountService<SqliteAccountRepository<'conn>>> {
    Ok(AccountService::with_session_days(
        SqliteAccountRepository::try_new(conn)?,
        state.settings().session_days,
    ))
}

fn notebook_service(
    conn: &Connection,
) -> ApiResult<NotebookService<SqliteNotebookRepository<'_>, SqliteEntryRepository<'_>>> {
    Ok(NotebookService::new(
        SqliteNotebookRepository::try_new(conn)?,
        SqliteEntryRepository::try_new(conn)?,
    ))
}

fn entry_service(conn: &Connection) -> ApiResult<EntryService<SqliteEntryRepository<'_>>> {
    Ok(EntryService::new(SqliteEntryRepository::try_new(conn)?))
}

fn tag_service(conn: &Connection) -> ApiResult<TagService<SqliteTagRepository<'_>>> {
    Ok(TagService::new(SqliteTagRepository::try_new(conn)?))
}

/// Accepts `true`/`1`/`on` style query flags.
fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "on" | "yes")
    )
}

/// Parses an optional enum query value, rejecting unknown spellings.
fn parse_choice<T>(
    field: &str,
    value: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
) -> ApiResult<Option<T>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| crate::ApiError::invalid(field, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_choice, parse_flag};
    use kabunote_core::NotebookStatus;

    #[test]
    fn flags_accept_common_truthy_values() {
        assert!(parse_flag(Some("true")));
        assert!(parse_flag(Some("ON")));
        assert!(!parse_flag(Some("0")));
        assert!(!parse_flag(None));
    }

    #[test]
    fn choices_reject_unknown_values() {
        assert_eq!(
            parse_choice("status", Some("active"), NotebookStatus::parse).unwrap(),
            Some(NotebookStatus::Active)
        );
        assert_eq!(
            parse_choice("status", Some("  "), NotebookStatus::parse).unwrap(),
            None
        );
        assert!(parse_choice("status", Some("sleeping"), NotebookStatus::parse).is_err());
    }
}
