//! Tag use-cases and keyword-based tag suggestions.
//!
//! # Responsibility
//! - Forward owner-scoped tag CRUD, search and bulk actions.
//! - Suggest tags from free text, stock code and notebook status.
//!
//! # Invariants
//! - Suggestions keep first-seen order, skip tags the caller already has
//!   and stop at [`MAX_SUGGESTIONS`].

use super::{ServiceError, ServiceResult};
use crate::model::account::UserId;
use crate::model::notebook::NotebookStatus;
use crate::model::tag::{Tag, TagCategory, TagId};
use crate::repo::tag_repo::{NewTag, TagBulkAction, TagQuery, TagRepository, TagUpdate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MAX_SUGGESTIONS: usize = 6;

static HASH_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("valid hashtag regex"));

/// Keyword (substring of the joined text) to suggested tags, in match order.
const SUGGESTION_KEYWORDS: &[(&str, &[&str])] = &[
    ("配当", &["#高配当", "#配当株", "#株主還元"]),
    ("成長", &["#成長株", "#長期投資"]),
    ("割安", &["#割安株", "#バリュー投資"]),
    ("テクノロジー", &["#テクノロジー", "#IT"]),
    ("自動車", &["#自動車", "#製造業"]),
    ("トヨタ", &["#7203トヨタ", "#自動車", "#高配当"]),
    ("ソニー", &["#6758ソニー", "#エンタメ", "#半導体"]),
    ("ソフトバンク", &["#9984ソフトバンク", "#通信", "#投資事業"]),
    ("決算", &["#決算分析", "#業績好調"]),
    ("リスク", &["#要注意", "#リスク要因"]),
    ("目標", &["#投資目標", "#戦略"]),
    ("長期", &["#長期投資", "#長期保有"]),
    ("短期", &["#短期取引", "#スイング"]),
    ("優待", &["#株主優待", "#優待株"]),
    ("新規", &["#新規投資", "#初回購入"]),
    ("追加", &["#追加投資", "#買い増し"]),
    ("ニュース", &["#ニュース", "#市場動向"]),
    ("業績", &["#業績分析", "#決算"]),
    ("競合", &["#競合分析", "#業界動向"]),
];

/// Input for [`suggest_tags`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SuggestionInput {
    pub content: String,
    pub stock_code: String,
    pub company_name: String,
    pub investment_reason: String,
    pub status: Option<NotebookStatus>,
    /// Tag names the caller already attached.
    pub existing_tags: Vec<String>,
}

/// Create response: the tag and whether it already existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedTag {
    pub tag: Tag,
    pub is_existing: bool,
}

pub struct TagService<R: TagRepository> {
    repo: R,
}

impl<R: TagRepository> TagService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn create_tag(&self, user_id: UserId, tag: &NewTag) -> ServiceResult<CreatedTag> {
        let (tag, created) = self.repo.create_tag(user_id, tag)?;
        log::info!(
            "event=tag_create module=tags status=ok user_id={user_id} tag_id={} existing={}",
            tag.id,
            !created
        );
        Ok(CreatedTag {
            tag,
            is_existing: !created,
        })
    }

    pub fn get_tag(&self, user_id: UserId, tag_id: TagId) -> ServiceResult<Tag> {
        self.repo
            .get_tag(user_id, tag_id)?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "tag",
                id: tag_id.to_string(),
            })
    }

    pub fn update_tag(
        &self,
        user_id: UserId,
        tag_id: TagId,
        update: &TagUpdate,
    ) -> ServiceResult<Tag> {
        Ok(self.repo.update_tag(user_id, tag_id, update)?)
    }

    pub fn delete_tag(&self, user_id: UserId, tag_id: TagId) -> ServiceResult<()> {
        self.repo.delete_tag(user_id, tag_id)?;
        log::info!("event=tag_delete module=tags status=ok user_id={user_id} tag_id={tag_id}");
        Ok(())
    }

    pub fn search_tags(&self, user_id: UserId, query: &TagQuery) -> ServiceResult<Vec<Tag>> {
        Ok(self.repo.search_tags(user_id, query)?)
    }

    pub fn popular_tags(
        &self,
        user_id: UserId,
        category: Option<TagCategory>,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<Tag>> {
        Ok(self.repo.popular_tags(user_id, category, limit)?)
    }

    /// Applies one action to the listed tags; returns the affected count.
    pub fn bulk_action(
        &self,
        user_id: UserId,
        tag_ids: &[TagId],
        action: TagBulkAction,
    ) -> ServiceResult<usize> {
        if tag_ids.is_empty() {
            return Err(ServiceError::validation("tag_ids", "no tags selected"));
        }
        let affected = self.repo.bulk_update(user_id, tag_ids, action)?;
        log::info!(
            "event=tag_bulk module=tags status=ok user_id={user_id} requested={} affected={affected}",
            tag_ids.len()
        );
        Ok(affected)
    }
}

/// Suggests up to six tags for the given notebook/entry text.
pub fn suggest_tags(input: &SuggestionInput) -> Vec<String> {
    let text = [
        input.content.as_str(),
        input.stock_code.as_str(),
        input.company_name.as_str(),
        input.investment_reason.as_str(),
    ]
    .join(" ")
    .to_lowercase();

    let mut candidates: Vec<String> = SUGGESTION_KEYWORDS
        .iter()
        .filter(|(keyword, _)| text.contains(keyword))
        .flat_map(|(_, tags)| tags.iter().map(|tag| tag.to_string()))
        .collect();

    if let Some(status) = input.status {
        candidates.push(status_tag(status).to_string());
    }

    let stock_code = input.stock_code.trim();
    if stock_code.chars().count() == 4 {
        candidates.push(format!("#{stock_code}{}", input.company_name.trim()));
    }

    let mut suggestions: Vec<String> = Vec::new();
    for candidate in candidates {
        if input.existing_tags.contains(&candidate) || suggestions.contains(&candidate) {
            continue;
        }
        suggestions.push(candidate);
        if suggestions.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    suggestions
}

/// Extracts `#word` tokens from free text, keeping the `#` prefix.
pub fn parse_tag_string(value: &str) -> Vec<String> {
    HASH_TAG_RE
        .captures_iter(value)
        .filter_map(|caps| caps.get(1))
        .map(|word| format!("#{}", word.as_str()))
        .collect()
}

fn status_tag(status: NotebookStatus) -> &'static str {
    match status {
        NotebookStatus::Active => "#アクティブ投資",
        NotebookStatus::Monitoring => "#要監視",
        NotebookStatus::Attention => "#要注意",
        NotebookStatus::Archived => "#アーカイブ",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_follow_keywords_status_and_code() {
        let input = SuggestionInput {
            content: "トヨタの決算は好調".to_string(),
            stock_code: "7203".to_string(),
            company_name: "トヨタ自動車".to_string(),
            status: Some(NotebookStatus::Monitoring),
            ..SuggestionInput::default()
        };
        assert_eq!(
            suggest_tags(&input),
            vec!["#自動車", "#製造業", "#7203トヨタ", "#高配当", "#決算分析", "#業績好調"]
        );
    }

    #[test]
    fn suggestions_skip_existing_and_add_status_tag() {
        let input = SuggestionInput {
            content: "配当重視".to_string(),
            status: Some(NotebookStatus::Active),
            existing_tags: vec!["#高配当".to_string()],
            ..SuggestionInput::default()
        };
        assert_eq!(
            suggest_tags(&input),
            vec!["#配当株", "#株主還元", "#アクティブ投資"]
        );
    }

    #[test]
    fn stock_code_without_company_still_suggests_code_tag() {
        let input = SuggestionInput {
            stock_code: "6758".to_string(),
            ..SuggestionInput::default()
        };
        assert_eq!(suggest_tags(&input), vec!["#6758"]);
    }

    #[test]
    fn parse_tag_string_extracts_words() {
        assert_eq!(
            parse_tag_string("#高配当 と #7203トヨタ, #長期-投資"),
            vec!["#高配当", "#7203トヨタ", "#長期"]
        );
        assert!(parse_tag_string("タグなし").is_empty());
    }
}
