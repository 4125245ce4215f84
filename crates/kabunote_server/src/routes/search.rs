use super::{parse_choice, parse_flag};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::ApiQuery;
use crate::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use kabunote_core::{search_all, EntryType, SearchQuery};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
pub(super) struct SearchParams {
    #[serde(default)]
    q: String,
    entry_type: Option<String>,
    bookmarked: Option<String>,
    limit: Option<u32>,
}

/// Unified notebook and entry search.
pub(super) async fn search(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> ApiResult<Json<Value>> {
    let query = SearchQuery {
        entry_type: parse_choice("entry_type", params.entry_type.as_deref(), EntryType::parse)?,
        bookmarked_only: parse_flag(params.bookmarked.as_deref()),
        limit: params.limit,
        ..SearchQuery::new(params.q.as_str())
    };
    let results = state.with_conn(|conn| Ok(search_all(conn, current.id(), &query)?))?;
    Ok(Json(json!({
        "success": true,
        "query": params.q,
        "total": results.total(),
        "results": results,
    })))
}
