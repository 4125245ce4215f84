use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use kabunote_core::repo::account_repo::SqliteAccountRepository;
use kabunote_core::repo::activity_repo::SqliteDashboardRepository;
use kabunote_core::repo::notebook_repo::SqliteNotebookRepository;
use kabunote_core::repo::tag_repo::SqliteTagRepository;
use kabunote_core::service::dashboard_service::DashboardService;
use serde_json::{json, Value};

/// Sections switched off in the user's settings come back empty.
pub(super) async fn dashboard(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Value>> {
    let dashboard = state.with_conn(|conn| {
        let service = DashboardService::new(
            SqliteAccountRepository::try_new(conn)?,
            SqliteDashboardRepository::try_new(conn)?,
            SqliteNotebookRepository::try_new(conn)?,
            SqliteTagRepository::try_new(conn)?,
        );
        Ok(service.dashboard(current.id())?)
    })?;
    Ok(Json(json!({
        "success": true,
        "stats": dashboard.stats,
        "recent_activities": dashboard.recent_activities,
        "recent_notebooks": dashboard.recent_notebooks,
        "trending_tags": dashboard.trending_tags,
    })))
}
