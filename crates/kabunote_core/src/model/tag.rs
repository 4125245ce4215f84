//! Per-user tag model, name rules, colors and keyword categorization.
//!
//! # Invariants
//! - Stored names always start with `#` and are at most 50 chars.
//! - `usage_count` is never negative.
//! - Stored custom colors are lower-case `#rrggbb`.

use super::account::UserId;
use super::ValidationError;
use serde::{Deserialize, Serialize};

pub type TagId = i64;

pub const TAG_NAME_MAX_CHARS: usize = 50;
const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', '"', '\'', '&', '\n', '\r', '\t'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagCategory {
    Stock,
    Style,
    Sector,
    Analysis,
    Strategy,
    Market,
    Risk,
    Event,
    #[default]
    Other,
}

impl TagCategory {
    pub const ALL: [TagCategory; 9] = [
        Self::Stock,
        Self::Style,
        Self::Sector,
        Self::Analysis,
        Self::Strategy,
        Self::Market,
        Self::Risk,
        Self::Event,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "STOCK",
            Self::Style => "STYLE",
            Self::Sector => "SECTOR",
            Self::Analysis => "ANALYSIS",
            Self::Strategy => "STRATEGY",
            Self::Market => "MARKET",
            Self::Risk => "RISK",
            Self::Event => "EVENT",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let upper = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|c| c.as_str() == upper)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Stock => "銘柄",
            Self::Style => "投資スタイル",
            Self::Sector => "セクター",
            Self::Analysis => "分析",
            Self::Strategy => "戦略",
            Self::Market => "市況",
            Self::Risk => "リスク",
            Self::Event => "イベント",
            Self::Other => "その他",
        }
    }

    pub fn default_color(self) -> &'static str {
        match self {
            Self::Stock => "#dc2626",
            Self::Style => "#9333ea",
            Self::Sector => "#16a34a",
            Self::Analysis => "#ea580c",
            Self::Strategy => "#2563eb",
            Self::Market => "#0891b2",
            Self::Risk => "#eab308",
            Self::Event => "#4f46e5",
            Self::Other => "#6b7280",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Self::Stock => "bg-red-600",
            Self::Style => "bg-purple-600",
            Self::Sector => "bg-green-600",
            Self::Analysis => "bg-orange-600",
            Self::Strategy => "bg-blue-600",
            Self::Market => "bg-cyan-600",
            Self::Risk => "bg-yellow-600",
            Self::Event => "bg-indigo-600",
            Self::Other => "bg-gray-600",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: TagId,
    pub user_id: UserId,
    pub name: String,
    pub category: TagCategory,
    pub description: String,
    pub color: Option<String>,
    pub usage_count: i64,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Tag {
    /// Custom color when set, otherwise the category color.
    pub fn effective_color(&self) -> &str {
        self.color
            .as_deref()
            .unwrap_or_else(|| self.category.default_color())
    }
}

/// Trims, adds the `#` prefix and enforces name rules.
pub fn normalize_tag_name(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let body = trimmed.trim_start_matches('#').trim();
    if body.is_empty() {
        return Err(ValidationError::new("name", "tag name cannot be empty"));
    }
    if let Some(bad) = trimmed.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(ValidationError::new(
            "name",
            format!("tag name contains forbidden character {bad:?}"),
        ));
    }
    let name = if trimmed.starts_with('#') {
        trimmed.to_string()
    } else {
        format!("#{trimmed}")
    };
    super::check_max_chars("name", &name, TAG_NAME_MAX_CHARS)?;
    Ok(name)
}

/// Accepts `rrggbb` or `#rrggbb`; blank means "no custom color".
pub fn normalize_color(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::new(
            "color",
            format!("`{value}` is not a #rrggbb color"),
        ));
    }
    Ok(Some(format!("#{}", hex.to_ascii_lowercase())))
}

/// Keyword table evaluated top to bottom; the first matching row wins.
const CATEGORY_KEYWORDS: &[(TagCategory, &[&str])] = &[
    (
        TagCategory::Sector,
        &[
            "自動車", "半導体", "通信", "エンタメ", "製造業", "テクノロジー", "IT", "銀行",
            "不動産", "REIT", "商社", "医薬",
        ],
    ),
    (
        TagCategory::Style,
        &["高配当", "配当株", "成長株", "割安", "バリュー", "グロース", "小型株"],
    ),
    (TagCategory::Analysis, &["決算", "業績", "分析", "テクニカル", "指標"]),
    (
        TagCategory::Strategy,
        &["長期", "短期", "戦略", "目標", "スイング", "買い増し", "新規投資", "初回購入"],
    ),
    (TagCategory::Market, &["市場", "相場", "ニュース", "好調", "動向"]),
    (TagCategory::Risk, &["リスク", "要注意", "要監視", "損切"]),
    (
        TagCategory::Event,
        &["優待", "IPO", "株主総会", "イベント", "分割", "株主還元"],
    ),
];

/// Infers a category from a tag name.
///
/// A name starting with four digits (`#7203トヨタ`) is a stock tag.
pub fn categorize_tag_name(name: &str) -> TagCategory {
    let body = name.trim().trim_start_matches('#');
    let leading_digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if leading_digits == 4 {
        return TagCategory::Stock;
    }

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| body.contains(keyword)))
        .map_or(TagCategory::Other, |(category, _)| *category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_get_prefix_and_rules() {
        assert_eq!(normalize_tag_name(" 高配当 ").unwrap(), "#高配当");
        assert_eq!(normalize_tag_name("#長期投資").unwrap(), "#長期投資");
        assert!(normalize_tag_name("#").is_err());
        assert!(normalize_tag_name("<script>").is_err());
        assert!(normalize_tag_name(&"a".repeat(50)).is_err());
        assert!(normalize_tag_name(&"a".repeat(49)).is_ok());
    }

    #[test]
    fn colors_are_normalized_to_lowercase_hex() {
        assert_eq!(
            normalize_color(Some("FF00aa")).unwrap().as_deref(),
            Some("#ff00aa")
        );
        assert_eq!(normalize_color(Some("  ")).unwrap(), None);
        assert!(normalize_color(Some("#12345")).is_err());
        assert!(normalize_color(Some("#gggggg")).is_err());
    }

    #[test]
    fn categorization_uses_stock_code_then_keywords() {
        assert_eq!(categorize_tag_name("#7203トヨタ"), TagCategory::Stock);
        assert_eq!(categorize_tag_name("#自動車"), TagCategory::Sector);
        assert_eq!(categorize_tag_name("#高配当"), TagCategory::Style);
        assert_eq!(categorize_tag_name("#決算分析"), TagCategory::Analysis);
        assert_eq!(categorize_tag_name("#長期投資"), TagCategory::Strategy);
        assert_eq!(categorize_tag_name("#業績好調"), TagCategory::Analysis);
        assert_eq!(categorize_tag_name("#市場動向"), TagCategory::Market);
        assert_eq!(categorize_tag_name("#要注意"), TagCategory::Risk);
        assert_eq!(categorize_tag_name("#株主優待"), TagCategory::Event);
        assert_eq!(categorize_tag_name("#お気に入り"), TagCategory::Other);
    }

    #[test]
    fn effective_color_falls_back_to_category() {
        let tag = Tag {
            id: 1,
            user_id: uuid::Uuid::nil(),
            name: "#7203トヨタ".to_string(),
            category: TagCategory::Stock,
            description: String::new(),
            color: None,
            usage_count: 0,
            is_active: true,
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(tag.effective_color(), "#dc2626");
        assert_eq!(TagCategory::parse("sector"), Some(TagCategory::Sector));
    }
}
