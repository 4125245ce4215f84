use super::account_service;
use crate::auth::{client_ip, user_agent, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use kabunote_core::model::account::ProfilePatch;
use kabunote_core::service::account_service::{LoginOutcome, Registration};
use kabunote_core::UserSettings;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    /// Username or email address.
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct UsernameQuery {
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProfileRequest {
    action: Option<String>,
    #[serde(flatten)]
    patch: ProfilePatch,
}

#[derive(Debug, Deserialize)]
pub(super) struct PasswordChange {
    current_password: String,
    new_password: String,
    new_password_confirm: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteAccount {
    password: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    limit: Option<u32>,
}

fn session_body(outcome: LoginOutcome) -> Value {
    json!({
        "success": true,
        "user": outcome.user,
        "token": outcome.session.token,
        "expires_at": outcome.session.expires_at,
    })
}

/// Registers and immediately logs the new user in.
pub(super) async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<Registration>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let outcome = state.with_conn(|conn| {
        let service = account_service(&state, conn)?;
        let user = service.register(&input)?;
        Ok(service.authenticate(
            &user.username,
            &input.password,
            client_ip(&headers).as_deref(),
            &user_agent(&headers),
        )?)
    })?;
    Ok((StatusCode::CREATED, Json(session_body(outcome))))
}

pub(super) async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<LoginRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = state.with_conn(|conn| {
        Ok(account_service(&state, conn)?.authenticate(
            &input.username,
            &input.password,
            client_ip(&headers).as_deref(),
            &user_agent(&headers),
        )?)
    })?;
    Ok(Json(session_body(outcome)))
}

pub(super) async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Value>> {
    state.with_conn(|conn| Ok(account_service(&state, conn)?.logout(&current.token)?))?;
    Ok(Json(json!({ "success": true })))
}

pub(super) async fn check_username(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UsernameQuery>,
) -> ApiResult<Json<Value>> {
    let check = state.with_conn(|conn| {
        Ok(account_service(&state, conn)?.check_username(query.username.trim())?)
    })?;
    Ok(Json(json!({
        "success": true,
        "available": check.available,
        "message": check.message,
    })))
}

pub(super) async fn get_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Value>> {
    let profile =
        state.with_conn(|conn| Ok(account_service(&state, conn)?.get_profile(current.id())?))?;
    Ok(Json(json!({
        "success": true,
        "user": current.user,
        "profile": profile,
    })))
}

/// Partial profile update, or a totals refresh with `action=update_statistics`.
pub(super) async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(request): ApiJson<ProfileRequest>,
) -> ApiResult<Json<Value>> {
    match request.action.as_deref().map(str::trim) {
        Some("update_statistics") => {
            let profile = state.with_conn(|conn| {
                Ok(account_service(&state, conn)?.update_statistics(current.id())?)
            })?;
            Ok(Json(json!({ "success": true, "profile": profile })))
        }
        None | Some("") | Some("update_profile") => {
            let (profile, fields) = state.with_conn(|conn| {
                Ok(account_service(&state, conn)?.update_profile(current.id(), &request.patch)?)
            })?;
            Ok(Json(json!({
                "success": true,
                "profile": profile,
                "updated_fields": fields,
            })))
        }
        Some(other) => Err(ApiError::invalid("action", other)),
    }
}

pub(super) async fn get_settings(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Value>> {
    let settings =
        state.with_conn(|conn| Ok(account_service(&state, conn)?.get_settings(current.id())?))?;
    Ok(Json(json!({ "success": true, "settings": settings })))
}

pub(super) async fn update_settings(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(settings): ApiJson<UserSettings>,
) -> ApiResult<Json<Value>> {
    let settings = state.with_conn(|conn| {
        Ok(account_service(&state, conn)?.update_settings(current.id(), &settings)?)
    })?;
    Ok(Json(json!({ "success": true, "settings": settings })))
}

pub(super) async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(input): ApiJson<PasswordChange>,
) -> ApiResult<Json<Value>> {
    if let Some(confirm) = input.new_password_confirm.as_deref() {
        if confirm != input.new_password {
            return Err(ApiError::BadRequest(
                "new_password_confirm: passwords do not match".to_string(),
            ));
        }
    }
    state.with_conn(|conn| {
        Ok(account_service(&state, conn)?.change_password(
            current.id(),
            &input.current_password,
            &input.new_password,
        )?)
    })?;
    Ok(Json(json!({ "success": true })))
}

pub(super) async fn delete_account(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(input): ApiJson<DeleteAccount>,
) -> ApiResult<Json<Value>> {
    state.with_conn(|conn| {
        Ok(account_service(&state, conn)?.delete_account(current.id(), &input.password)?)
    })?;
    Ok(Json(json!({ "success": true })))
}

pub(super) async fn login_history(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let records = state.with_conn(|conn| {
        Ok(account_service(&state, conn)?.login_history(current.id(), query.limit)?)
    })?;
    Ok(Json(json!({ "success": true, "history": records })))
}
