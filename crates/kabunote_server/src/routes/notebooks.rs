use super::{account_service, entry_service, notebook_service, parse_choice, parse_flag};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use kabunote_core::model::notebook::SubNotebookId;
use kabunote_core::repo::entry_repo::EntryListQuery;
use kabunote_core::service::notebook_service::NotebookListParams;
use kabunote_core::{EntryType, NotebookDraft, NotebookId, NotebookStatus, NotebookType};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListQuery {
    q: Option<String>,
    status: Option<String>,
    notebook_type: Option<String>,
    tag: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct EntriesQuery {
    sub_notebook_id: Option<SubNotebookId>,
    entry_type: Option<String>,
    bookmarked: Option<String>,
    important: Option<String>,
    limit: Option<u32>,
    #[serde(default)]
    offset: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct SubNotebookInput {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct MoveInput {
    target_index: i64,
}

pub(super) async fn list_notebooks(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<Value>> {
    let mut params = NotebookListParams {
        q: query.q.filter(|q| !q.trim().is_empty()),
        status: parse_choice("status", query.status.as_deref(), NotebookStatus::parse)?,
        notebook_type: parse_choice(
            "notebook_type",
            query.notebook_type.as_deref(),
            NotebookType::parse,
        )?,
        tag: query.tag.filter(|tag| !tag.trim().is_empty()),
        page: query.page,
        per_page: query.per_page,
    };
    let listing = state.with_conn(|conn| {
        if params.per_page.unwrap_or(0) == 0 {
            let settings = account_service(&state, conn)?.get_settings(current.id())?;
            params.per_page = Some(settings.items_per_page);
        }
        Ok(notebook_service(conn)?.list_notebooks(current.id(), &params)?)
    })?;
    Ok(Json(json!({
        "success": true,
        "notebooks": listing.items,
        "total": listing.total,
        "page": listing.page,
        "per_page": listing.per_page,
        "total_pages": listing.total_pages,
    })))
}

pub(super) async fn create_notebook(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(draft): ApiJson<NotebookDraft>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let notebook = state
        .with_conn(|conn| Ok(notebook_service(conn)?.create_notebook(current.id(), draft)?))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "notebook": notebook })),
    ))
}

pub(super) async fn notebook_detail(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(notebook_id): ApiPath<NotebookId>,
) -> ApiResult<Json<Value>> {
    let detail = state
        .with_conn(|conn| Ok(notebook_service(conn)?.notebook_detail(current.id(), notebook_id)?))?;
    Ok(Json(json!({
        "success": true,
        "notebook": detail.notebook,
        "sub_notebooks": detail.sub_notebooks,
        "recent_entries": detail.recent_entries,
        "stats": detail.stats,
    })))
}

pub(super) async fn update_notebook(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(notebook_id): ApiPath<NotebookId>,
    ApiJson(draft): ApiJson<NotebookDraft>,
) -> ApiResult<Json<Value>> {
    let notebook = state.with_conn(|conn| {
        Ok(notebook_service(conn)?.update_notebook(current.id(), notebook_id, draft)?)
    })?;
    Ok(Json(json!({ "success": true, "notebook": notebook })))
}

pub(super) async fn delete_notebook(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(notebook_id): ApiPath<NotebookId>,
) -> ApiResult<Json<Value>> {
    state.with_conn(|conn| Ok(notebook_service(conn)?.delete_notebook(current.id(), notebook_id)?))?;
    Ok(Json(json!({ "success": true })))
}

pub(super) async fn notebook_entries(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(notebook_id): ApiPath<NotebookId>,
    ApiQuery(query): ApiQuery<EntriesQuery>,
) -> ApiResult<Json<Value>> {
    let list_query = EntryListQuery {
        sub_notebook_id: query.sub_notebook_id,
        entry_type: parse_choice("entry_type", query.entry_type.as_deref(), EntryType::parse)?,
        bookmarked_only: parse_flag(query.bookmarked.as_deref()),
        important_only: parse_flag(query.important.as_deref()),
        limit: query.limit,
        offset: query.offset,
    };
    let entries = state.with_conn(|conn| {
        // Ownership check first so a foreign notebook is a 404, not an empty list.
        notebook_service(conn)?.get_notebook(current.id(), notebook_id)?;
        Ok(entry_service(conn)?.list_entries(current.id(), notebook_id, &list_query)?)
    })?;
    Ok(Json(json!({ "success": true, "entries": entries })))
}

pub(super) async fn notebook_stats(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(notebook_id): ApiPath<NotebookId>,
) -> ApiResult<Json<Value>> {
    let stats = state
        .with_conn(|conn| Ok(notebook_service(conn)?.notebook_stats(current.id(), notebook_id)?))?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

pub(super) async fn list_sub_notebooks(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(notebook_id): ApiPath<NotebookId>,
) -> ApiResult<Json<Value>> {
    let subs = state.with_conn(|conn| {
        Ok(notebook_service(conn)?.list_sub_notebooks(current.id(), notebook_id)?)
    })?;
    Ok(Json(json!({ "success": true, "sub_notebooks": subs })))
}

pub(super) async fn create_sub_notebook(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(notebook_id): ApiPath<NotebookId>,
    ApiJson(input): ApiJson<SubNotebookInput>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let sub = state.with_conn(|conn| {
        Ok(notebook_service(conn)?.create_sub_notebook(
            current.id(),
            notebook_id,
            &input.title,
            &input.description,
        )?)
    })?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "sub_notebook": sub })),
    ))
}

pub(super) async fn update_sub_notebook(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(sub_notebook_id): ApiPath<SubNotebookId>,
    ApiJson(input): ApiJson<SubNotebookInput>,
) -> ApiResult<Json<Value>> {
    let sub = state.with_conn(|conn| {
        Ok(notebook_service(conn)?.update_sub_notebook(
            current.id(),
            sub_notebook_id,
            &input.title,
            &input.description,
        )?)
    })?;
    Ok(Json(json!({ "success": true, "sub_notebook": sub })))
}

/// Moves a sub-notebook and returns the renumbered siblings.
pub(super) async fn move_sub_notebook(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(sub_notebook_id): ApiPath<SubNotebookId>,
    ApiJson(input): ApiJson<MoveInput>,
) -> ApiResult<Json<Value>> {
    let subs = state.with_conn(|conn| {
        Ok(notebook_service(conn)?.move_sub_notebook(
            current.id(),
            sub_notebook_id,
            input.target_index,
        )?)
    })?;
    Ok(Json(json!({ "success": true, "sub_notebooks": subs })))
}

pub(super) async fn delete_sub_notebook(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(sub_notebook_id): ApiPath<SubNotebookId>,
) -> ApiResult<Json<Value>> {
    state.with_conn(|conn| {
        Ok(notebook_service(conn)?.delete_sub_notebook(current.id(), sub_notebook_id)?)
    })?;
    Ok(Json(json!({ "success": true })))
}
