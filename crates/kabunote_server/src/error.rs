//! HTTP error mapping.
//!
//! Every failure leaves the server as `{"success": false, "error": "..."}`
//! with a status code chosen by error kind. Storage details are logged and
//! replaced with a generic message.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kabunote_core::{MaintenanceError, RepoError, ServiceError};
use serde_json::json;
use std::fmt::{Display, Formatter};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rejects an unparseable query or body value.
    pub fn invalid(field: &str, value: &str) -> Self {
        Self::BadRequest(format!("invalid {field}: `{value}`"))
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(message)
            | Self::Unauthorized(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::Conflict(message)
            | Self::Internal(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                log::error!("event=http_error module=server status=error detail={detail}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (
            self.status(),
            Json(json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::Validation(err) => Self::BadRequest(err.to_string()),
            ServiceError::NotFound { entity, .. } => Self::NotFound(format!("{entity} not found")),
            ServiceError::Conflict(message) => Self::Conflict(message),
            ServiceError::InvalidCredentials | ServiceError::Unauthorized => {
                Self::Unauthorized(value.to_string())
            }
            ServiceError::Forbidden(_) => Self::Forbidden(value.to_string()),
            ServiceError::Internal(message) => Self::Internal(message),
            ServiceError::Repo(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        ServiceError::from(value).into()
    }
}

impl From<MaintenanceError> for ApiError {
    fn from(value: MaintenanceError) -> Self {
        match value {
            MaintenanceError::Repo(err) => err.into(),
            MaintenanceError::Invalid(message) => Self::BadRequest(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::BadRequest(format!("invalid request body: {}", value.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        Self::BadRequest(format!("invalid query string: {}", value.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(value: PathRejection) -> Self {
        Self::BadRequest(format!("invalid path: {}", value.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::http::StatusCode;
    use kabunote_core::{RepoError, ServiceError, ValidationError};

    #[test]
    fn service_errors_map_to_status_codes() {
        let cases = [
            (
                ServiceError::Validation(ValidationError::new("title", "title is required")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::NotFound {
                    entity: "notebook",
                    id: "x".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (ServiceError::Conflict("dup".to_string()), StatusCode::CONFLICT),
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ServiceError::Forbidden("staff only"), StatusCode::FORBIDDEN),
            (
                ServiceError::Internal("hash".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn repo_not_found_hides_the_id() {
        let err = ApiError::from(RepoError::NotFound {
            entity: "entry",
            id: "secret-id".to_string(),
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "entry not found");
    }
}
