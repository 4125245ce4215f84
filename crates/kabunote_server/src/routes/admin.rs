use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use kabunote_core::service::maintenance::admin_overview;
use serde_json::{json, Value};

/// Staff-only row counts across the whole database.
pub(super) async fn overview(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Value>> {
    current.require_staff()?;
    let overview = state.with_conn(|conn| Ok(admin_overview(conn)?))?;
    log::info!(
        "event=admin_overview module=server status=ok user_id={}",
        current.id()
    );
    Ok(Json(json!({ "success": true, "overview": overview })))
}
