use super::entry_service;
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use kabunote_core::model::entry::{RelationId, RelationType};
use kabunote_core::{EntryDraft, EntryId, NotebookId};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub(super) struct NewEntry {
    notebook_id: NotebookId,
    #[serde(flatten)]
    draft: EntryDraft,
}

#[derive(Debug, Deserialize)]
pub(super) struct NewRelation {
    to_entry_id: EntryId,
    relation_type: RelationType,
    #[serde(default)]
    notes: String,
}

pub(super) async fn create_entry(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(input): ApiJson<NewEntry>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let entry = state.with_conn(|conn| {
        Ok(entry_service(conn)?.create_entry(current.id(), input.notebook_id, &input.draft)?)
    })?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "entry": entry })),
    ))
}

pub(super) async fn get_entry(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(entry_id): ApiPath<EntryId>,
) -> ApiResult<Json<Value>> {
    let entry = state.with_conn(|conn| Ok(entry_service(conn)?.get_entry(current.id(), entry_id)?))?;
    Ok(Json(json!({ "success": true, "entry": entry })))
}

pub(super) async fn update_entry(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(entry_id): ApiPath<EntryId>,
    ApiJson(draft): ApiJson<EntryDraft>,
) -> ApiResult<Json<Value>> {
    let entry = state
        .with_conn(|conn| Ok(entry_service(conn)?.update_entry(current.id(), entry_id, &draft)?))?;
    Ok(Json(json!({ "success": true, "entry": entry })))
}

pub(super) async fn delete_entry(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(entry_id): ApiPath<EntryId>,
) -> ApiResult<Json<Value>> {
    state.with_conn(|conn| Ok(entry_service(conn)?.delete_entry(current.id(), entry_id)?))?;
    Ok(Json(json!({ "success": true })))
}

pub(super) async fn toggle_bookmark(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(entry_id): ApiPath<EntryId>,
) -> ApiResult<Json<Value>> {
    let is_bookmarked = state
        .with_conn(|conn| Ok(entry_service(conn)?.toggle_bookmark(current.id(), entry_id)?))?;
    Ok(Json(json!({ "success": true, "is_bookmarked": is_bookmarked })))
}

/// Relations in both directions.
pub(super) async fn list_relations(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(entry_id): ApiPath<EntryId>,
) -> ApiResult<Json<Value>> {
    let relations = state
        .with_conn(|conn| Ok(entry_service(conn)?.list_relations(current.id(), entry_id)?))?;
    Ok(Json(json!({ "success": true, "relations": relations })))
}

pub(super) async fn create_relation(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(entry_id): ApiPath<EntryId>,
    ApiJson(input): ApiJson<NewRelation>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let relation = state.with_conn(|conn| {
        Ok(entry_service(conn)?.create_relation(
            current.id(),
            entry_id,
            input.to_entry_id,
            input.relation_type,
            &input.notes,
        )?)
    })?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "relation": relation })),
    ))
}

pub(super) async fn delete_relation(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(relation_id): ApiPath<RelationId>,
) -> ApiResult<Json<Value>> {
    state.with_conn(|conn| Ok(entry_service(conn)?.delete_relation(current.id(), relation_id)?))?;
    Ok(Json(json!({ "success": true })))
}
