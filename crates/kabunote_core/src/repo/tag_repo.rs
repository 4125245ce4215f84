//! Per-user tag persistence and tag-link bookkeeping.
//!
//! # Responsibility
//! - CRUD, search and bulk maintenance over `tags`.
//! - Replace notebook/entry tag links while keeping `usage_count` in step.
//!
//! # Invariants
//! - `usage_count` moves by exactly one per added or removed link and is
//!   clamped at zero.
//! - Link replacement must run inside the caller's transaction.
//! - Tag names are unique per user (exact match after normalization).

use super::{ensure_schema, escape_like, invalid_enum, parse_uuid, RepoError, RepoResult};
use crate::db::{bool_to_int, now_ms};
use crate::model::account::UserId;
use crate::model::tag::{
    categorize_tag_name, normalize_color, normalize_tag_name, Tag, TagCategory, TagId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

pub const TAG_SEARCH_DEFAULT_LIMIT: u32 = 20;
pub const TAG_POPULAR_DEFAULT_LIMIT: u32 = 10;
const TAG_LIMIT_MAX: u32 = 200;

pub(crate) const TAG_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    name,
    category,
    description,
    color,
    usage_count,
    is_active,
    created_at,
    updated_at
FROM tags";

/// Link tables that attach tags to owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagLink {
    Notebook,
    Entry,
}

impl TagLink {
    fn table(self) -> &'static str {
        match self {
            Self::Notebook => "notebook_tags",
            Self::Entry => "entry_tags",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            Self::Notebook => "notebook_id",
            Self::Entry => "entry_id",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTag {
    pub name: String,
    /// `None` infers the category from the name.
    pub category: Option<TagCategory>,
    pub description: String,
    pub color: Option<String>,
}

/// Partial update; `color: Some(None)` clears a custom color.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagUpdate {
    pub name: Option<String>,
    pub category: Option<TagCategory>,
    pub description: Option<String>,
    pub color: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageFilter {
    Used,
    Unused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagSort {
    /// Usage descending, then name.
    #[default]
    Usage,
    Name,
    Created,
    Updated,
}

impl TagSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().trim_start_matches('-') {
            "usage" | "usage_count" => Some(Self::Usage),
            "name" => Some(Self::Name),
            "created" | "created_at" => Some(Self::Created),
            "updated" | "updated_at" => Some(Self::Updated),
            _ => None,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::Usage => "usage_count DESC, name ASC",
            Self::Name => "name ASC",
            Self::Created => "created_at DESC, id DESC",
            Self::Updated => "updated_at DESC, id DESC",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagQuery {
    /// Substring of name or description, case-insensitive.
    pub text: Option<String>,
    pub category: Option<TagCategory>,
    pub is_active: Option<bool>,
    pub usage: Option<UsageFilter>,
    pub sort: TagSort,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagBulkAction {
    Activate,
    Deactivate,
    Delete,
    ChangeCategory(TagCategory),
}

pub trait TagRepository {
    /// Returns `(tag, created)`; an existing tag with the same name is returned unchanged.
    fn create_tag(&self, user_id: UserId, tag: &NewTag) -> RepoResult<(Tag, bool)>;
    fn get_tag(&self, user_id: UserId, tag_id: TagId) -> RepoResult<Option<Tag>>;
    fn find_tag_by_name(&self, user_id: UserId, name: &str) -> RepoResult<Option<Tag>>;
    fn update_tag(&self, user_id: UserId, tag_id: TagId, update: &TagUpdate) -> RepoResult<Tag>;
    fn delete_tag(&self, user_id: UserId, tag_id: TagId) -> RepoResult<()>;
    fn search_tags(&self, user_id: UserId, query: &TagQuery) -> RepoResult<Vec<Tag>>;
    fn popular_tags(
        &self,
        user_id: UserId,
        category: Option<TagCategory>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<Tag>>;
    fn bulk_update(
        &self,
        user_id: UserId,
        tag_ids: &[TagId],
        action: TagBulkAction,
    ) -> RepoResult<usize>;
}

pub struct SqliteTagRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(
            conn,
            &[
                ("tags", &["id", "user_id", "name", "category", "usage_count"]),
                ("notebook_tags", &["notebook_id", "tag_id"]),
                ("entry_tags", &["entry_id", "tag_id"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl TagRepository for SqliteTagRepository<'_> {
    fn create_tag(&self, user_id: UserId, tag: &NewTag) -> RepoResult<(Tag, bool)> {
        let name = normalize_tag_name(&tag.name)?;
        let color = normalize_color(tag.color.as_deref())?;
        if let Some(existing) = self.find_tag_by_name(user_id, &name)? {
            return Ok((existing, false));
        }

        let category = tag.category.unwrap_or_else(|| categorize_tag_name(&name));
        let now = now_ms();
        self.conn.execute(
            "INSERT INTO tags (user_id, name, category, description, color, usage_count, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, ?6, ?6);",
            params![
                user_id.to_string(),
                name.as_str(),
                category.as_str(),
                tag.description.trim(),
                color,
                now
            ],
        )?;
        let tag_id = self.conn.last_insert_rowid();
        let created = self
            .get_tag(user_id, tag_id)?
            .ok_or_else(|| RepoError::not_found("tag", tag_id))?;
        Ok((created, true))
    }

    fn get_tag(&self, user_id: UserId, tag_id: TagId) -> RepoResult<Option<Tag>> {
        let sql = format!("{TAG_SELECT_SQL} WHERE id = ?1 AND user_id = ?2;");
        self.conn
            .query_row(&sql, params![tag_id, user_id.to_string()], |row| {
                Ok(tag_from_row(row))
            })
            .optional()?
            .transpose()
    }

    fn find_tag_by_name(&self, user_id: UserId, name: &str) -> RepoResult<Option<Tag>> {
        let sql = format!("{TAG_SELECT_SQL} WHERE user_id = ?1 AND name = ?2;");
        self.conn
            .query_row(&sql, params![user_id.to_string(), name], |row| {
                Ok(tag_from_row(row))
            })
            .optional()?
            .transpose()
    }

    fn update_tag(&self, user_id: UserId, tag_id: TagId, update: &TagUpdate) -> RepoResult<Tag> {
        let Some(current) = self.get_tag(user_id, tag_id)? else {
            return Err(RepoError::not_found("tag", tag_id));
        };

        let name = match update.name.as_deref() {
            Some(raw) => normalize_tag_name(raw)?,
            None => current.name.clone(),
        };
        if name != current.name {
            if let Some(other) = self.find_tag_by_name(user_id, &name)? {
                if other.id != tag_id {
                    return Err(RepoError::Conflict(format!("tag `{name}` already exists")));
                }
            }
        }
        let color = match &update.color {
            Some(raw) => normalize_color(raw.as_deref())?,
            None => current.color.clone(),
        };

        self.conn.execute(
            "UPDATE tags
             SET name = ?3, category = ?4, description = ?5, color = ?6, is_active = ?7, updated_at = ?8
             WHERE id = ?1 AND user_id = ?2;",
            params![
                tag_id,
                user_id.to_string(),
                name,
                update.category.unwrap_or(current.category).as_str(),
                update
                    .description
                    .as_deref()
                    .map_or(current.description.as_str(), str::trim),
                color,
                bool_to_int(update.is_active.unwrap_or(current.is_active)),
                now_ms(),
            ],
        )?;

        self.get_tag(user_id, tag_id)?
            .ok_or_else(|| RepoError::not_found("tag", tag_id))
    }

    fn delete_tag(&self, user_id: UserId, tag_id: TagId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM tags WHERE id = ?1 AND user_id = ?2;",
            params![tag_id, user_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("tag", tag_id));
        }
        Ok(())
    }

    fn search_tags(&self, user_id: UserId, query: &TagQuery) -> RepoResult<Vec<Tag>> {
        let mut sql = format!("{TAG_SELECT_SQL} WHERE user_id = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(user_id.to_string())];

        if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            sql.push_str(" AND (name LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')");
            let pattern = format!("%{}%", escape_like(text));
            bind_values.push(Value::Text(pattern.clone()));
            bind_values.push(Value::Text(pattern));
        }
        if let Some(category) = query.category {
            sql.push_str(" AND category = ?");
            bind_values.push(Value::Text(category.as_str().to_string()));
        }
        if let Some(is_active) = query.is_active {
            sql.push_str(" AND is_active = ?");
            bind_values.push(Value::Integer(bool_to_int(is_active)));
        }
        match query.usage {
            Some(UsageFilter::Used) => sql.push_str(" AND usage_count > 0"),
            Some(UsageFilter::Unused) => sql.push_str(" AND usage_count = 0"),
            None => {}
        }

        sql.push_str(" ORDER BY ");
        sql.push_str(query.sort.order_by());
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_tag_limit(
            query.limit,
            TAG_SEARCH_DEFAULT_LIMIT,
        ))));

        query_tags(self.conn, &sql, bind_values)
    }

    fn popular_tags(
        &self,
        user_id: UserId,
        category: Option<TagCategory>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<Tag>> {
        self.search_tags(
            user_id,
            &TagQuery {
                category,
                is_active: Some(true),
                sort: TagSort::Usage,
                limit: Some(normalize_tag_limit(limit, TAG_POPULAR_DEFAULT_LIMIT)),
                ..TagQuery::default()
            },
        )
    }

    fn bulk_update(
        &self,
        user_id: UserId,
        tag_ids: &[TagId],
        action: TagBulkAction,
    ) -> RepoResult<usize> {
        let ids: BTreeSet<TagId> = tag_ids.iter().copied().collect();
        let now = now_ms();
        let user_text = user_id.to_string();
        let tx = rusqlite::Transaction::new_unchecked(
            self.conn,
            rusqlite::TransactionBehavior::Immediate,
        )?;
        let mut affected = 0;
        for tag_id in ids {
            affected += match action {
                TagBulkAction::Activate | TagBulkAction::Deactivate => tx.execute(
                    "UPDATE tags SET is_active = ?3, updated_at = ?4 WHERE id = ?1 AND user_id = ?2;",
                    params![
                        tag_id,
                        user_text,
                        bool_to_int(action == TagBulkAction::Activate),
                        now
                    ],
                )?,
                TagBulkAction::Delete => tx.execute(
                    "DELETE FROM tags WHERE id = ?1 AND user_id = ?2;",
                    params![tag_id, user_text],
                )?,
                TagBulkAction::ChangeCategory(category) => tx.execute(
                    "UPDATE tags SET category = ?3, updated_at = ?4 WHERE id = ?1 AND user_id = ?2;",
                    params![tag_id, user_text, category.as_str(), now],
                )?,
            };
        }
        tx.commit()?;
        Ok(affected)
    }
}

/// Clamps a caller-provided limit; `0`/`None` mean the default.
pub fn normalize_tag_limit(limit: Option<u32>, default: u32) -> u32 {
    match limit {
        Some(0) | None => default,
        Some(value) => value.min(TAG_LIMIT_MAX),
    }
}

/// Normalizes, validates and deduplicates tag names, keeping first-seen order.
pub(crate) fn normalize_tag_names(names: &[String]) -> RepoResult<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::new();
    for raw in names {
        if raw.trim().is_empty() {
            continue;
        }
        let name = normalize_tag_name(raw)?;
        if seen.insert(name.clone()) {
            normalized.push(name);
        }
    }
    Ok(normalized)
}

/// Resolves names to tag ids, creating missing per-user tags with an inferred category.
pub(crate) fn resolve_tag_ids(
    conn: &Connection,
    user_id: UserId,
    names: &[String],
) -> RepoResult<Vec<TagId>> {
    let user_text = user_id.to_string();
    let now = now_ms();
    let mut ids = Vec::with_capacity(names.len());
    for name in normalize_tag_names(names)? {
        conn.execute(
            "INSERT OR IGNORE INTO tags (user_id, name, category, usage_count, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, 1, ?4, ?4);",
            params![user_text, name, categorize_tag_name(&name).as_str(), now],
        )?;
        let id: TagId = conn.query_row(
            "SELECT id FROM tags WHERE user_id = ?1 AND name = ?2;",
            params![user_text, name],
            |row| row.get(0),
        )?;
        ids.push(id);
    }
    Ok(ids)
}

/// Replaces the owner's links with `tag_ids`, adjusting usage by set difference.
pub(crate) fn replace_tag_links(
    conn: &Connection,
    link: TagLink,
    owner_id: &str,
    tag_ids: &[TagId],
) -> RepoResult<()> {
    let current: BTreeSet<TagId> = linked_tag_ids(conn, link, owner_id)?.into_iter().collect();
    let wanted: BTreeSet<TagId> = tag_ids.iter().copied().collect();

    for removed in current.difference(&wanted) {
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND tag_id = ?2;",
                link.table(),
                link.owner_column()
            ),
            params![owner_id, removed],
        )?;
        adjust_usage(conn, *removed, -1)?;
    }
    for added in wanted.difference(&current) {
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, tag_id) VALUES (?1, ?2);",
                link.table(),
                link.owner_column()
            ),
            params![owner_id, added],
        )?;
        adjust_usage(conn, *added, 1)?;
    }
    Ok(())
}

/// Drops every link of the owner, decrementing usage once per link.
pub(crate) fn release_tag_links(conn: &Connection, link: TagLink, owner_id: &str) -> RepoResult<()> {
    replace_tag_links(conn, link, owner_id, &[])
}

pub(crate) fn linked_tag_ids(
    conn: &Connection,
    link: TagLink,
    owner_id: &str,
) -> RepoResult<Vec<TagId>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT tag_id FROM {} WHERE {} = ?1 ORDER BY tag_id ASC;",
        link.table(),
        link.owner_column()
    ))?;
    let mut rows = stmt.query([owner_id])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

pub(crate) fn linked_tag_names(
    conn: &Connection,
    link: TagLink,
    owner_id: &str,
) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT t.name
         FROM {} l
         INNER JOIN tags t ON t.id = l.tag_id
         WHERE l.{} = ?1
         ORDER BY t.name ASC;",
        link.table(),
        link.owner_column()
    ))?;
    let mut rows = stmt.query([owner_id])?;
    let mut names = Vec::new();
    while let Some(row) = rows.next()? {
        names.push(row.get(0)?);
    }
    Ok(names)
}

fn adjust_usage(conn: &Connection, tag_id: TagId, delta: i64) -> RepoResult<()> {
    conn.execute(
        "UPDATE tags
         SET usage_count = MAX(usage_count + ?2, 0), updated_at = ?3
         WHERE id = ?1;",
        params![tag_id, delta, now_ms()],
    )?;
    Ok(())
}

pub(crate) fn query_tags(conn: &Connection, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Tag>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(tag_from_row(row)?);
    }
    Ok(tags)
}

pub(crate) fn tag_from_row(row: &Row<'_>) -> RepoResult<Tag> {
    let user_text: String = row.get("user_id")?;
    let category: String = row.get("category")?;
    Ok(Tag {
        id: row.get("id")?,
        user_id: parse_uuid(&user_text, "tags.user_id")?,
        name: row.get("name")?,
        category: TagCategory::parse(&category)
            .ok_or_else(|| invalid_enum("tags.category", &category))?,
        description: row.get("description")?,
        color: row.get("color")?,
        usage_count: row.get("usage_count")?,
        is_active: row.get::<_, i64>("is_active")? == 1,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
