//! Accounts, notebooks, entries, tags and dashboards for kabunote.
//!
//! The server and CLI crates only translate requests into calls on
//! [`service`] and [`search`]; every rule about ownership, counters and
//! tag categories lives here.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{ConfigError, Environment, Settings};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::account::{User, UserId, UserProfile, UserSettings};
pub use model::entry::{Entry, EntryDraft, EntryId, EntryType};
pub use model::notebook::{Notebook, NotebookDraft, NotebookId, NotebookStatus, NotebookType};
pub use model::tag::{Tag, TagCategory, TagId};
pub use model::ValidationError;
pub use repo::{RepoError, RepoResult};
pub use search::{search_all, SearchQuery, SearchResults};
pub use service::maintenance::{MaintenanceError, MaintenanceResult};
pub use service::{ServiceError, ServiceResult};

/// Version string reported by `/health`.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
