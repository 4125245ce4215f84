//! Notebook and sub-notebook model.
//!
//! # Invariants
//! - `title` is non-empty and at most 200 chars; `subtitle` at most 300.
//! - `stock_code` is empty or four digits in `1000..=9999`.
//! - `entry_count` mirrors the number of entries and is maintained by the
//!   repository inside the same transaction as entry writes.

use super::account::UserId;
use super::{check_max_chars, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NotebookId = Uuid;
pub type SubNotebookId = Uuid;

pub const NOTEBOOK_TITLE_MAX_CHARS: usize = 200;
pub const NOTEBOOK_SUBTITLE_MAX_CHARS: usize = 300;
const LIST_ITEM_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotebookType {
    Stock,
    #[default]
    Theme,
    Strategy,
    Portfolio,
}

impl NotebookType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "STOCK",
            Self::Theme => "THEME",
            Self::Strategy => "STRATEGY",
            Self::Portfolio => "PORTFOLIO",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "STOCK" => Some(Self::Stock),
            "THEME" => Some(Self::Theme),
            "STRATEGY" => Some(Self::Strategy),
            "PORTFOLIO" => Some(Self::Portfolio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotebookStatus {
    #[default]
    Active,
    Monitoring,
    Attention,
    Archived,
}

impl NotebookStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Monitoring => "MONITORING",
            Self::Attention => "ATTENTION",
            Self::Archived => "ARCHIVED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "MONITORING" => Some(Self::Monitoring),
            "ATTENTION" => Some(Self::Attention),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "アクティブ",
            Self::Monitoring => "監視中",
            Self::Attention => "要注意",
            Self::Archived => "アーカイブ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notebook {
    pub id: NotebookId,
    pub user_id: UserId,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub notebook_type: NotebookType,
    pub status: NotebookStatus,
    pub stock_code: String,
    pub company_name: String,
    pub investment_strategy: String,
    pub target_price: String,
    pub sell_timing: String,
    pub key_criteria: Vec<String>,
    pub risk_factors: Vec<String>,
    pub entry_count: i64,
    pub is_public: bool,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Editable notebook fields used by create and full update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotebookDraft {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub notebook_type: NotebookType,
    pub status: NotebookStatus,
    pub stock_code: String,
    pub company_name: String,
    pub investment_strategy: String,
    pub target_price: String,
    pub sell_timing: String,
    pub key_criteria: Vec<String>,
    pub risk_factors: Vec<String>,
    pub is_public: bool,
    pub tags: Vec<String>,
    /// Sub-notebook titles created alongside the notebook (create only).
    pub sub_notebooks: Vec<String>,
}

impl NotebookDraft {
    /// Trims text fields and drops blank list items in place.
    pub fn normalize(&mut self) {
        for field in [
            &mut self.title,
            &mut self.subtitle,
            &mut self.stock_code,
            &mut self.company_name,
            &mut self.target_price,
            &mut self.sell_timing,
        ] {
            *field = field.trim().to_string();
        }
        self.key_criteria = clean_list(&self.key_criteria);
        self.risk_factors = clean_list(&self.risk_factors);
        self.sub_notebooks = clean_list(&self.sub_notebooks);
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::new("title", "title is required"));
        }
        check_max_chars("title", &self.title, NOTEBOOK_TITLE_MAX_CHARS)?;
        check_max_chars("subtitle", &self.subtitle, NOTEBOOK_SUBTITLE_MAX_CHARS)?;
        validate_stock_code(&self.stock_code)?;
        for item in self.key_criteria.iter().chain(self.risk_factors.iter()) {
            check_max_chars("key_criteria", item, LIST_ITEM_MAX_CHARS)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubNotebook {
    pub id: SubNotebookId,
    pub notebook_id: NotebookId,
    pub title: String,
    pub description: String,
    pub order_index: i64,
    pub entry_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Per-notebook statistics shown on the detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotebookStats {
    pub entry_count: i64,
    pub entries_by_type: Vec<(String, i64)>,
    pub bookmarked_count: i64,
    pub important_count: i64,
    pub entries_last_30_days: i64,
    pub last_entry_at: Option<i64>,
    pub sub_notebook_count: i64,
}

/// Empty, or four ASCII digits between 1000 and 9999.
pub fn validate_stock_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(());
    }
    let valid = code.len() == 4
        && code.chars().all(|c| c.is_ascii_digit())
        && code.parse::<u32>().is_ok_and(|n| (1000..=9999).contains(&n));
    if !valid {
        return Err(ValidationError::new(
            "stock_code",
            "stock code must be 4 digits between 1000 and 9999",
        ));
    }
    Ok(())
}

fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_code_rules() {
        assert!(validate_stock_code("").is_ok());
        assert!(validate_stock_code("7203").is_ok());
        assert!(validate_stock_code("0999").is_err());
        assert!(validate_stock_code("720").is_err());
        assert!(validate_stock_code("72O3").is_err());
        assert!(validate_stock_code("12345").is_err());
    }

    #[test]
    fn draft_normalize_drops_blank_items() {
        let mut draft = NotebookDraft {
            title: "  トヨタ自動車  ".to_string(),
            key_criteria: vec!["配当利回り3%以上".to_string(), "   ".to_string()],
            ..NotebookDraft::default()
        };
        draft.normalize();
        assert_eq!(draft.title, "トヨタ自動車");
        assert_eq!(draft.key_criteria, vec!["配当利回り3%以上".to_string()]);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn draft_requires_title() {
        let draft = NotebookDraft::default();
        let err = draft.validate().unwrap_err();
        assert_eq!(err.field, "title");
    }
}
