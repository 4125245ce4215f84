//! Term-based `LIKE` filter builder.
//!
//! # Responsibility
//! - Split free text into whitespace-separated terms.
//! - Build a SQL predicate: OR across fields for one term, AND across terms.
//!
//! # Invariants
//! - Wildcards typed by the user (`%`, `_`, `\`) match literally.
//! - An empty term list produces no predicate.

use crate::repo::escape_like;
use rusqlite::types::Value;

/// Maximum number of terms honored from one query.
pub const MAX_TERMS: usize = 10;

/// SQL fragment plus its positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct TermFilter {
    pub sql: String,
    pub values: Vec<Value>,
}

/// Splits on any whitespace (including the ideographic space) and drops empties.
pub fn split_terms(query: &str) -> Vec<String> {
    query
        .split(char::is_whitespace)
        .filter(|term| !term.is_empty())
        .take(MAX_TERMS)
        .map(str::to_string)
        .collect()
}

/// Builds `(c1 LIKE ? OR c2 LIKE ? ...) AND (...)` for `terms`.
///
/// `tag_exists` is an optional `EXISTS (...)` subquery with exactly one `?`
/// placeholder that receives the same pattern as the columns.
pub fn build_term_filter(
    terms: &[String],
    columns: &[&str],
    tag_exists: Option<&str>,
) -> Option<TermFilter> {
    if terms.is_empty() || (columns.is_empty() && tag_exists.is_none()) {
        return None;
    }

    let mut groups = Vec::with_capacity(terms.len());
    let mut values = Vec::new();
    for term in terms {
        let pattern = format!("%{}%", escape_like(term));
        let mut alternatives: Vec<String> = columns
            .iter()
            .map(|column| format!("{column} LIKE ? ESCAPE '\\'"))
            .collect();
        if let Some(subquery) = tag_exists {
            alternatives.push(subquery.to_string());
        }
        values.extend(
            std::iter::repeat(Value::Text(pattern)).take(alternatives.len()),
        );
        groups.push(format!("({})", alternatives.join(" OR ")));
    }

    Some(TermFilter {
        sql: groups.join(" AND "),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::{build_term_filter, split_terms};
    use rusqlite::types::Value;

    #[test]
    fn split_terms_handles_mixed_whitespace() {
        assert_eq!(
            split_terms("  トヨタ\u{3000}7203\t決算 "),
            vec!["トヨタ", "7203", "決算"]
        );
        assert!(split_terms("   ").is_empty());
    }

    #[test]
    fn filter_ors_columns_and_ands_terms() {
        let terms = vec!["7203".to_string(), "50%".to_string()];
        let filter = build_term_filter(&terms, &["title", "stock_code"], Some("EXISTS (x = ?)"))
            .unwrap();
        assert_eq!(
            filter.sql,
            "(title LIKE ? ESCAPE '\\' OR stock_code LIKE ? ESCAPE '\\' OR EXISTS (x = ?)) AND \
             (title LIKE ? ESCAPE '\\' OR stock_code LIKE ? ESCAPE '\\' OR EXISTS (x = ?))"
        );
        assert_eq!(filter.values.len(), 6);
        assert_eq!(filter.values[3], Value::Text("%50\\%%".to_string()));
    }

    #[test]
    fn no_terms_means_no_filter() {
        assert!(build_term_filter(&[], &["title"], None).is_none());
    }
}
