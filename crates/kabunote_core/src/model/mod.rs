//! Domain models for accounts, notebooks, entries, tags and dashboard data.
//!
//! # Responsibility
//! - Define records shared by repositories, services and the API surface.
//! - Own field-level validation that does not need storage access.
//!
//! # Invariants
//! - Enum values persist as their upper-case wire names (`language` is the
//!   one lower-case exception: `ja`/`en`).
//! - Validation errors name the offending field.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod account;
pub mod activity;
pub mod entry;
pub mod notebook;
pub mod tag;

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Error for ValidationError {}

/// Rejects values longer than `max_chars` (counted in chars, not bytes).
pub(crate) fn check_max_chars(
    field: &'static str,
    value: &str,
    max_chars: usize,
) -> Result<(), ValidationError> {
    if value.chars().count() > max_chars {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max_chars} characters"),
        ));
    }
    Ok(())
}
