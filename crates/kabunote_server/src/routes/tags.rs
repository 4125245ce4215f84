use super::{parse_choice, parse_flag, tag_service};
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use kabunote_core::repo::tag_repo::{NewTag, TagBulkAction, TagQuery, TagSort, TagUpdate, UsageFilter};
use kabunote_core::service::tag_service::{parse_tag_string, suggest_tags, SuggestionInput};
use kabunote_core::{NotebookStatus, TagCategory, TagId};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
pub(super) struct SearchParams {
    q: Option<String>,
    category: Option<String>,
    is_active: Option<String>,
    /// `used` or `unused`.
    usage: Option<String>,
    sort: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct PopularParams {
    category: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SuggestionParams {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stock_code: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    investment_reason: String,
    status: Option<String>,
    /// Space- or comma-separated `#tag` tokens.
    #[serde(default)]
    existing_tags: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TagInput {
    name: String,
    category: Option<TagCategory>,
    #[serde(default)]
    description: String,
    color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct TagPatch {
    name: Option<String>,
    category: Option<TagCategory>,
    description: Option<String>,
    /// An empty string clears the custom color.
    color: Option<String>,
    is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BulkRequest {
    action: String,
    tag_ids: Vec<TagId>,
    category: Option<String>,
}

fn parse_usage(value: &str) -> Option<UsageFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "used" => Some(UsageFilter::Used),
        "unused" => Some(UsageFilter::Unused),
        _ => None,
    }
}

fn parse_bulk_action(action: &str, category: Option<&str>) -> ApiResult<TagBulkAction> {
    match action.trim().to_ascii_lowercase().as_str() {
        "activate" => Ok(TagBulkAction::Activate),
        "deactivate" => Ok(TagBulkAction::Deactivate),
        "delete" => Ok(TagBulkAction::Delete),
        "change_category" => parse_choice("category", category, TagCategory::parse)?
            .map(TagBulkAction::ChangeCategory)
            .ok_or_else(|| ApiError::BadRequest("category is required".to_string())),
        other => Err(ApiError::invalid("action", other)),
    }
}

pub(super) async fn search_tags(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> ApiResult<Json<Value>> {
    let query = TagQuery {
        text: params.q.filter(|q| !q.trim().is_empty()),
        category: parse_choice("category", params.category.as_deref(), TagCategory::parse)?,
        is_active: params
            .is_active
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(|v| parse_flag(Some(v))),
        usage: parse_choice("usage", params.usage.as_deref(), parse_usage)?,
        sort: parse_choice("sort", params.sort.as_deref(), TagSort::parse)?.unwrap_or_default(),
        limit: params.limit,
    };
    let tags = state.with_conn(|conn| Ok(tag_service(conn)?.search_tags(current.id(), &query)?))?;
    Ok(Json(json!({ "success": true, "count": tags.len(), "tags": tags })))
}

pub(super) async fn popular_tags(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiQuery(params): ApiQuery<PopularParams>,
) -> ApiResult<Json<Value>> {
    let category = parse_choice("category", params.category.as_deref(), TagCategory::parse)?;
    let tags = state.with_conn(|conn| {
        Ok(tag_service(conn)?.popular_tags(current.id(), category, params.limit)?)
    })?;
    Ok(Json(json!({ "success": true, "tags": tags })))
}

/// Keyword-based suggestions; pure, so the connection is not touched.
pub(super) async fn suggestions(
    ApiQuery(params): ApiQuery<SuggestionParams>,
) -> ApiResult<Json<Value>> {
    let input = SuggestionInput {
        status: parse_choice("status", params.status.as_deref(), NotebookStatus::parse)?,
        existing_tags: parse_tag_string(&params.existing_tags),
        content: params.content,
        stock_code: params.stock_code,
        company_name: params.company_name,
        investment_reason: params.investment_reason,
    };
    Ok(Json(json!({ "success": true, "suggestions": suggest_tags(&input) })))
}

/// Creates a tag, or returns the existing one with `is_existing: true`.
pub(super) async fn create_tag(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(input): ApiJson<TagInput>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let new_tag = NewTag {
        name: input.name,
        category: input.category,
        description: input.description,
        color: input.color.filter(|color| !color.trim().is_empty()),
    };
    let created = state.with_conn(|conn| Ok(tag_service(conn)?.create_tag(current.id(), &new_tag)?))?;
    let status = if created.is_existing {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(json!({
            "success": true,
            "tag": created.tag,
            "is_existing": created.is_existing,
        })),
    ))
}

pub(super) async fn update_tag(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(tag_id): ApiPath<TagId>,
    ApiJson(patch): ApiJson<TagPatch>,
) -> ApiResult<Json<Value>> {
    let update = TagUpdate {
        name: patch.name,
        category: patch.category,
        description: patch.description,
        color: patch
            .color
            .map(|color| Some(color).filter(|value| !value.trim().is_empty())),
        is_active: patch.is_active,
    };
    let tag = state
        .with_conn(|conn| Ok(tag_service(conn)?.update_tag(current.id(), tag_id, &update)?))?;
    Ok(Json(json!({ "success": true, "tag": tag })))
}

pub(super) async fn delete_tag(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(tag_id): ApiPath<TagId>,
) -> ApiResult<Json<Value>> {
    state.with_conn(|conn| Ok(tag_service(conn)?.delete_tag(current.id(), tag_id)?))?;
    Ok(Json(json!({ "success": true })))
}

pub(super) async fn bulk_action(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(request): ApiJson<BulkRequest>,
) -> ApiResult<Json<Value>> {
    let action = parse_bulk_action(&request.action, request.category.as_deref())?;
    let affected = state.with_conn(|conn| {
        Ok(tag_service(conn)?.bulk_action(current.id(), &request.tag_ids, action)?)
    })?;
    Ok(Json(json!({ "success": true, "affected": affected })))
}

#[cfg(test)]
mod tests {
    use super::{parse_bulk_action, parse_usage};
    use kabunote_core::repo::tag_repo::{TagBulkAction, UsageFilter};
    use kabunote_core::TagCategory;

    #[test]
    fn bulk_change_category_needs_a_category() {
        assert_eq!(
            parse_bulk_action("Deactivate", None).unwrap(),
            TagBulkAction::Deactivate
        );
        assert_eq!(
            parse_bulk_action("change_category", Some("sector")).unwrap(),
            TagBulkAction::ChangeCategory(TagCategory::Sector)
        );
        assert!(parse_bulk_action("change_category", None).is_err());
        assert!(parse_bulk_action("archive", None).is_err());
    }

    #[test]
    fn usage_filter_names() {
        assert_eq!(parse_usage("USED"), Some(UsageFilter::Used));
        assert_eq!(parse_usage("unused"), Some(UsageFilter::Unused));
        assert_eq!(parse_usage("sometimes"), None);
    }
}
