//! Unified notebook and entry search.
//!
//! # Responsibility
//! - Run the term filter against the user's notebooks and entries.
//! - Shape hits with highlighted snippets and a match summary.
//!
//! # Invariants
//! - Only rows owned by the requesting user are returned.
//! - A blank query returns no hits without touching the database.
//! - Hit ordering is `updated_at DESC, id ASC` for both kinds.

pub mod filter;
pub mod highlight;

use crate::model::account::UserId;
use crate::model::entry::{Entry, EntryType};
use crate::model::notebook::Notebook;
use crate::repo::entry_repo::{
    query_entries, ENTRY_SEARCH_COLUMNS, ENTRY_SELECT_SQL, ENTRY_TAG_EXISTS_SQL,
};
use crate::repo::notebook_repo::{
    query_notebooks, NOTEBOOK_SEARCH_COLUMNS, NOTEBOOK_SELECT_SQL, NOTEBOOK_TAG_EXISTS_SQL,
};
use crate::repo::RepoResult;
use filter::{build_term_filter, split_terms};
use highlight::{count_matches, excerpt, highlight};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;
use std::time::Instant;

pub const SEARCH_DEFAULT_LIMIT: u32 = 20;
pub const SEARCH_LIMIT_MAX: u32 = 100;
const SNIPPET_WIDTH: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub entry_type: Option<EntryType>,
    pub bookmarked_only: bool,
    /// Per-kind cap. `None` uses the default; values are clamped to 1..=100.
    pub limit: Option<u32>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entry_type: None,
            bookmarked_only: false,
            limit: None,
        }
    }
}

/// Where a hit matched, counted per term occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub title: usize,
    pub tags: usize,
    pub content: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotebookHit {
    pub notebook: Notebook,
    pub title_html: String,
    pub snippet_html: String,
    pub matches: MatchSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryHit {
    pub entry: Entry,
    pub title_html: String,
    pub snippet_html: String,
    pub matches: MatchSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub terms: Vec<String>,
    pub notebooks: Vec<NotebookHit>,
    pub entries: Vec<EntryHit>,
}

impl SearchResults {
    pub fn total(&self) -> usize {
        self.notebooks.len() + self.entries.len()
    }
}

pub fn normalize_search_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(SEARCH_DEFAULT_LIMIT)
        .clamp(1, SEARCH_LIMIT_MAX)
}

/// Searches the user's notebooks and entries.
pub fn search_all(
    conn: &Connection,
    user_id: UserId,
    query: &SearchQuery,
) -> RepoResult<SearchResults> {
    let terms = split_terms(&query.text);
    let mut results = SearchResults {
        query: query.text.trim().to_string(),
        terms: terms.clone(),
        ..SearchResults::default()
    };
    if terms.is_empty() {
        return Ok(results);
    }

    let started_at = Instant::now();
    let limit = normalize_search_limit(query.limit);
    // Entry-only filters narrow notebooks out of the result set.
    if query.entry_type.is_none() && !query.bookmarked_only {
        results.notebooks = search_notebooks(conn, user_id, &terms, limit)?
            .into_iter()
            .map(|notebook| notebook_hit(notebook, &terms))
            .collect();
    }
    results.entries = search_entries(conn, user_id, &terms, query, limit)?
        .into_iter()
        .map(|entry| entry_hit(entry, &terms))
        .collect();

    log::debug!(
        "event=search_query module=search status=ok terms={} notebooks={} entries={} elapsed_ms={}",
        terms.len(),
        results.notebooks.len(),
        results.entries.len(),
        started_at.elapsed().as_millis()
    );
    Ok(results)
}

fn search_notebooks(
    conn: &Connection,
    user_id: UserId,
    terms: &[String],
    limit: u32,
) -> RepoResult<Vec<Notebook>> {
    let Some(filter) = build_term_filter(terms, NOTEBOOK_SEARCH_COLUMNS, Some(NOTEBOOK_TAG_EXISTS_SQL))
    else {
        return Ok(Vec::new());
    };
    let sql = format!(
        "{NOTEBOOK_SELECT_SQL} WHERE n.user_id = ? AND {} ORDER BY n.updated_at DESC, n.id ASC LIMIT ?;",
        filter.sql
    );
    let mut bind_values = vec![Value::Text(user_id.to_string())];
    bind_values.extend(filter.values);
    bind_values.push(Value::Integer(i64::from(limit)));
    query_notebooks(conn, &sql, bind_values)
}

fn search_entries(
    conn: &Connection,
    user_id: UserId,
    terms: &[String],
    query: &SearchQuery,
    limit: u32,
) -> RepoResult<Vec<Entry>> {
    let Some(filter) = build_term_filter(terms, ENTRY_SEARCH_COLUMNS, Some(ENTRY_TAG_EXISTS_SQL))
    else {
        return Ok(Vec::new());
    };
    let mut sql = format!("{ENTRY_SELECT_SQL} WHERE n.user_id = ? AND {}", filter.sql);
    let mut bind_values = vec![Value::Text(user_id.to_string())];
    bind_values.extend(filter.values);
    if let Some(kind) = query.entry_type {
        sql.push_str(" AND e.entry_type = ?");
        bind_values.push(Value::Text(kind.as_str().to_string()));
    }
    if query.bookmarked_only {
        sql.push_str(" AND e.is_bookmarked = 1");
    }
    sql.push_str(" ORDER BY e.updated_at DESC, e.id ASC LIMIT ?;");
    bind_values.push(Value::Integer(i64::from(limit)));
    query_entries(conn, &sql, bind_values)
}

fn notebook_hit(notebook: Notebook, terms: &[String]) -> NotebookHit {
    let body = [
        notebook.subtitle.as_str(),
        notebook.description.as_str(),
        notebook.investment_strategy.as_str(),
        notebook.stock_code.as_str(),
        notebook.company_name.as_str(),
    ]
    .into_iter()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>()
    .join(" ");
    let matches = MatchSummary {
        title: count_matches(&notebook.title, terms),
        tags: count_matches(&notebook.tags.join(" "), terms),
        content: count_matches(&body, terms),
    };
    NotebookHit {
        title_html: highlight(&notebook.title, terms),
        snippet_html: highlight(&excerpt(&body, terms, SNIPPET_WIDTH), terms),
        matches,
        notebook,
    }
}

fn entry_hit(entry: Entry, terms: &[String]) -> EntryHit {
    let body = match &entry.content {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => map
            .values()
            .filter_map(serde_json::Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    };
    let body = if body.trim().is_empty() {
        entry.summary.clone()
    } else {
        body
    };
    let matches = MatchSummary {
        title: count_matches(&entry.title, terms),
        tags: count_matches(&entry.tags.join(" "), terms),
        content: count_matches(&body, terms)
            + count_matches(&entry.stock_code, terms)
            + count_matches(&entry.company_name, terms),
    };
    EntryHit {
        title_html: highlight(&entry.title, terms),
        snippet_html: highlight(&excerpt(&body, terms, SNIPPET_WIDTH), terms),
        matches,
        entry,
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_search_limit;

    #[test]
    fn search_limit_is_clamped() {
        assert_eq!(normalize_search_limit(None), 20);
        assert_eq!(normalize_search_limit(Some(0)), 1);
        assert_eq!(normalize_search_limit(Some(500)), 100);
    }
}
