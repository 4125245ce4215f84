//! Entry model, typed JSON content templates and entry relations.
//!
//! # Invariants
//! - `content` is always a JSON value; object content for templated types
//!   carries every template key.
//! - `summary` is derived from `content` on every write.
//! - A relation never links an entry to itself.

use super::notebook::{NotebookId, SubNotebookId};
use super::{check_max_chars, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type EntryId = Uuid;
pub type RelationId = Uuid;

pub const ENTRY_TITLE_MAX_CHARS: usize = 200;
pub const SUMMARY_MAX_CHARS: usize = 100;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid html regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Keys probed in order when deriving a summary.
const SUMMARY_KEYS: &[&str] = &[
    "summary",
    "analysis",
    "description",
    "content",
    "headline",
    "observation",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Analysis,
    News,
    Calculation,
    #[default]
    Memo,
    Goal,
}

impl EntryType {
    pub const ALL: [EntryType; 5] = [
        Self::Analysis,
        Self::News,
        Self::Calculation,
        Self::Memo,
        Self::Goal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "ANALYSIS",
            Self::News => "NEWS",
            Self::Calculation => "CALCULATION",
            Self::Memo => "MEMO",
            Self::Goal => "GOAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let upper = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|t| t.as_str() == upper)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Analysis => "分析",
            Self::News => "ニュース",
            Self::Calculation => "計算",
            Self::Memo => "メモ",
            Self::Goal => "目標",
        }
    }

    /// Template keys kept for object content; `None` means free-form.
    fn template(self) -> Option<&'static [(&'static str, TemplateSlot)]> {
        use TemplateSlot::{Object, Text};
        match self {
            Self::Analysis => Some(&[
                ("summary", Text),
                ("key_metrics", Object),
                ("analysis", Text),
                ("outlook", Text),
            ]),
            Self::News => Some(&[
                ("headline", Text),
                ("content", Text),
                ("impact", Text),
                ("stock_impact", Text),
            ]),
            Self::Calculation => Some(&[
                ("current_price", Text),
                ("calculations", Object),
                ("fair_value", Text),
                ("recommendation", Text),
            ]),
            Self::Memo => Some(&[
                ("observation", Text),
                ("market_trend", Text),
                ("personal_note", Text),
                ("next_action", Text),
            ]),
            Self::Goal => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TemplateSlot {
    Text,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub id: EntryId,
    pub notebook_id: NotebookId,
    pub sub_notebook_id: Option<SubNotebookId>,
    pub entry_type: EntryType,
    pub title: String,
    pub content: Value,
    pub summary: String,
    pub stock_code: String,
    pub company_name: String,
    pub current_price: Option<f64>,
    pub target_price: Option<f64>,
    pub event_date: Option<String>,
    pub is_important: bool,
    pub is_bookmarked: bool,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Editable entry fields used by create and full update.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EntryDraft {
    pub sub_notebook_id: Option<SubNotebookId>,
    pub entry_type: EntryType,
    pub title: String,
    pub content: Value,
    pub stock_code: String,
    pub company_name: String,
    pub current_price: Option<f64>,
    pub target_price: Option<f64>,
    pub event_date: Option<String>,
    pub is_important: bool,
    pub is_bookmarked: bool,
    pub tags: Vec<String>,
}

impl EntryDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::new("title", "title is required"));
        }
        check_max_chars("title", &self.title, ENTRY_TITLE_MAX_CHARS)?;
        super::notebook::validate_stock_code(&self.stock_code)?;
        for (field, price) in [
            ("current_price", self.current_price),
            ("target_price", self.target_price),
        ] {
            if let Some(value) = price {
                if !value.is_finite() || value < 0.0 {
                    return Err(ValidationError::new(field, "price must be a non-negative number"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    FollowUp,
    Comparison,
    Contradiction,
    Reference,
    Update,
}

impl RelationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FollowUp => "FOLLOW_UP",
            Self::Comparison => "COMPARISON",
            Self::Contradiction => "CONTRADICTION",
            Self::Reference => "REFERENCE",
            Self::Update => "UPDATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FOLLOW_UP" => Some(Self::FollowUp),
            "COMPARISON" => Some(Self::Comparison),
            "CONTRADICTION" => Some(Self::Contradiction),
            "REFERENCE" => Some(Self::Reference),
            "UPDATE" => Some(Self::Update),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryRelation {
    pub id: RelationId,
    pub from_entry_id: EntryId,
    pub to_entry_id: EntryId,
    pub relation_type: RelationType,
    pub notes: String,
    pub created_at: i64,
}

/// Shapes object content to the entry type's template.
///
/// Known keys are kept, missing ones are filled (`""` or `{}`), unknown keys
/// are dropped. Non-object content and `GOAL` content pass through.
pub fn normalize_content(entry_type: EntryType, content: Value) -> Value {
    let (Some(template), Value::Object(mut source)) = (entry_type.template(), content.clone())
    else {
        return match content {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
    };

    let mut shaped = Map::new();
    for (key, slot) in template {
        let value = source.remove(*key).unwrap_or_else(|| match slot {
            TemplateSlot::Text => Value::String(String::new()),
            TemplateSlot::Object => Value::Object(Map::new()),
        });
        shaped.insert((*key).to_string(), value);
    }
    Value::Object(shaped)
}

/// Derives a plain-text summary of at most `max_chars` chars plus `...`.
pub fn extract_summary(content: &Value, max_chars: usize) -> String {
    let raw = match content {
        Value::String(text) => text.clone(),
        Value::Object(map) => SUMMARY_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .filter_map(Value::as_str)
            .find(|text| !text.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| content.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    let stripped = HTML_TAG_RE.replace_all(&raw, "");
    let collapsed = WHITESPACE_RE.replace_all(stripped.trim(), " ");
    truncate_chars(&collapsed, max_chars)
}

pub(crate) fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analysis_content_keeps_template_keys_only() {
        let shaped = normalize_content(
            EntryType::Analysis,
            json!({"summary": "増収増益", "extra": 1, "key_metrics": {"PER": "10.2"}}),
        );
        assert_eq!(
            shaped,
            json!({
                "summary": "増収増益",
                "key_metrics": {"PER": "10.2"},
                "analysis": "",
                "outlook": ""
            })
        );
    }

    #[test]
    fn goal_and_scalar_content_pass_through() {
        let goal = json!({"target": "年間配当10万円", "achieved": true});
        assert_eq!(normalize_content(EntryType::Goal, goal.clone()), goal);
        assert_eq!(
            normalize_content(EntryType::Memo, json!("自由記述")),
            json!("自由記述")
        );
        assert_eq!(normalize_content(EntryType::News, Value::Null), json!({}));
    }

    #[test]
    fn summary_prefers_known_keys_and_strips_html() {
        let content = json!({"summary": "", "analysis": "<p>売上高が   <b>前年比</b>+12%</p>"});
        assert_eq!(extract_summary(&content, 100), "売上高が 前年比+12%");

        let long = json!({"summary": "あ".repeat(120)});
        let summary = extract_summary(&long, 100);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), 103);
    }

    #[test]
    fn summary_falls_back_to_json_text_without_known_keys() {
        let calculation = normalize_content(
            EntryType::Calculation,
            json!({"current_price": "2500", "fair_value": "3000"}),
        );
        let summary = extract_summary(&calculation, 100);
        assert!(summary.contains("\"current_price\":\"2500\""), "{summary}");
        assert!(summary.contains("\"fair_value\":\"3000\""), "{summary}");

        let goal = json!({"target": "年間配当10万円", "achieved": false});
        let summary = extract_summary(&goal, 100);
        assert!(summary.contains("年間配当10万円"), "{summary}");
        assert!(summary.contains("\"achieved\":false"));
    }

    #[test]
    fn draft_rejects_negative_prices() {
        let draft = EntryDraft {
            title: "計算".to_string(),
            current_price: Some(-1.0),
            ..EntryDraft::default()
        };
        assert_eq!(draft.validate().unwrap_err().field, "current_price");
    }
}
