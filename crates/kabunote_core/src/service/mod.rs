//! Use-case services over the repositories.
//!
//! # Responsibility
//! - Orchestrate repository calls into account, note, tag and dashboard
//!   use-cases.
//! - Translate repository failures into one caller-facing error type that
//!   binaries map to HTTP statuses or exit codes.

pub mod account_service;
pub mod dashboard_service;
pub mod demo;
pub mod entry_service;
pub mod maintenance;
pub mod notebook_service;
pub mod tag_admin;
pub mod tag_service;

use crate::model::ValidationError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-layer error.
#[derive(Debug)]
pub enum ServiceError {
    /// Input rejected before or by storage.
    Validation(ValidationError),
    /// Target missing, or owned by another user.
    NotFound { entity: &'static str, id: String },
    /// Uniqueness or state conflict.
    Conflict(String),
    /// Login or password check failed.
    InvalidCredentials,
    /// Missing, unknown or expired session.
    Unauthorized,
    /// Authenticated but not allowed.
    Forbidden(&'static str),
    /// Failure outside storage, such as password hashing.
    Internal(String),
    Repo(RepoError),
}

impl ServiceError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(field, message))
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "{message}"),
            Self::InvalidCredentials => write!(f, "invalid username or password"),
            Self::Unauthorized => write!(f, "authentication required"),
            Self::Forbidden(reason) => write!(f, "forbidden: {reason}"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::Conflict(message) => Self::Conflict(message),
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}
