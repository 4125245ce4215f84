//! Notebook and sub-notebook persistence.
//!
//! # Responsibility
//! - Owner-scoped notebook CRUD, listing and per-notebook statistics.
//! - Ordered sub-notebooks with dense `order_index` values.
//!
//! # Invariants
//! - Create/update/delete run in one `IMMEDIATE` transaction together with
//!   tag usage, profile totals and the activity feed.
//! - `entry_count` columns are recomputed from `entries` whenever entries move.
//! - Listing is sorted by `updated_at DESC, id ASC`.
//! - Sub-notebook `order_index` is `0..n` without gaps after every write.

use super::account_repo::refresh_profile_totals_in;
use super::activity_repo::insert_activity;
use super::tag_repo::{
    linked_tag_names, release_tag_links, replace_tag_links, resolve_tag_ids, TagLink,
};
use super::{ensure_schema, invalid_enum, parse_uuid, RepoError, RepoResult};
use crate::db::{bool_to_int, now_ms};
use crate::model::account::UserId;
use crate::model::activity::{ActivityType, NewActivity};
use crate::model::notebook::{
    Notebook, NotebookDraft, NotebookId, NotebookStats, NotebookStatus, NotebookType,
    SubNotebook, SubNotebookId,
};
use crate::model::{check_max_chars, ValidationError};
use crate::search::filter::{build_term_filter, split_terms};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use uuid::Uuid;

pub const NOTEBOOK_DEFAULT_LIMIT: u32 = 12;
pub const NOTEBOOK_LIMIT_MIN: u32 = 5;
pub const NOTEBOOK_LIMIT_MAX: u32 = 50;
const SUB_NOTEBOOK_TITLE_MAX_CHARS: usize = 200;
const THIRTY_DAYS_MS: i64 = 30 * 24 * 60 * 60 * 1000;

pub(crate) const NOTEBOOK_SELECT_SQL: &str = "SELECT
    n.id,
    n.user_id,
    n.title,
    n.subtitle,
    n.description,
    n.notebook_type,
    n.status,
    n.stock_code,
    n.company_name,
    n.investment_strategy,
    n.target_price,
    n.sell_timing,
    n.key_criteria,
    n.risk_factors,
    n.entry_count,
    n.is_public,
    n.created_at,
    n.updated_at
FROM notebooks n";

/// Searchable notebook columns, used by list filters and unified search.
pub(crate) const NOTEBOOK_SEARCH_COLUMNS: &[&str] = &[
    "n.title",
    "n.subtitle",
    "n.description",
    "n.stock_code",
    "n.company_name",
    "n.investment_strategy",
];

pub(crate) const NOTEBOOK_TAG_EXISTS_SQL: &str = "EXISTS (
    SELECT 1
    FROM notebook_tags nt
    INNER JOIN tags t ON t.id = nt.tag_id
    WHERE nt.notebook_id = n.id
      AND t.name LIKE ? ESCAPE '\\'
)";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotebookListQuery {
    /// Whitespace-separated search terms.
    pub text: Option<String>,
    pub status: Option<NotebookStatus>,
    pub notebook_type: Option<NotebookType>,
    /// Exact tag name (with or without `#`).
    pub tag: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotebookPage {
    pub items: Vec<Notebook>,
    pub total: i64,
    pub applied_limit: u32,
}

pub trait NotebookRepository {
    fn create_notebook(&self, user_id: UserId, draft: &NotebookDraft) -> RepoResult<Notebook>;
    /// Full replacement of editable fields and the tag set.
    fn update_notebook(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        draft: &NotebookDraft,
    ) -> RepoResult<Notebook>;
    fn delete_notebook(&self, user_id: UserId, notebook_id: NotebookId) -> RepoResult<()>;
    fn get_notebook(&self, user_id: UserId, notebook_id: NotebookId)
        -> RepoResult<Option<Notebook>>;
    fn list_notebooks(&self, user_id: UserId, query: &NotebookListQuery)
        -> RepoResult<NotebookPage>;
    fn notebook_stats(&self, user_id: UserId, notebook_id: NotebookId)
        -> RepoResult<NotebookStats>;

    fn list_sub_notebooks(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
    ) -> RepoResult<Vec<SubNotebook>>;
    fn create_sub_notebook(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        title: &str,
        description: &str,
    ) -> RepoResult<SubNotebook>;
    fn update_sub_notebook(
        &self,
        user_id: UserId,
        sub_notebook_id: SubNotebookId,
        title: &str,
        description: &str,
    ) -> RepoResult<SubNotebook>;
    /// Moves to `target_index` (clamped) and renumbers siblings densely.
    fn move_sub_notebook(
        &self,
        user_id: UserId,
        sub_notebook_id: SubNotebookId,
        target_index: i64,
    ) -> RepoResult<Vec<SubNotebook>>;
    /// Entries of the removed sub-notebook stay in the notebook, unassigned.
    fn delete_sub_notebook(&self, user_id: UserId, sub_notebook_id: SubNotebookId)
        -> RepoResult<()>;
}

pub struct SqliteNotebookRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNotebookRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(
            conn,
            &[
                ("notebooks", &["id", "user_id", "status", "entry_count"]),
                ("sub_notebooks", &["id", "notebook_id", "order_index", "entry_count"]),
                ("notebook_tags", &["notebook_id", "tag_id"]),
                ("entries", &["id", "notebook_id", "sub_notebook_id"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl NotebookRepository for SqliteNotebookRepository<'_> {
    fn create_notebook(&self, user_id: UserId, draft: &NotebookDraft) -> RepoResult<Notebook> {
        draft.validate()?;
        for title in &draft.sub_notebooks {
            check_max_chars("sub_notebooks", title, SUB_NOTEBOOK_TITLE_MAX_CHARS)?;
        }

        let notebook_id = Uuid::new_v4();
        let id_text = notebook_id.to_string();
        let now = now_ms();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO notebooks (
                id, user_id, title, subtitle, description, notebook_type, status,
                stock_code, company_name, investment_strategy, target_price, sell_timing,
                key_criteria, risk_factors, entry_count, is_public, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0, ?15, ?16, ?16);",
            params![
                id_text,
                user_id.to_string(),
                draft.title.trim(),
                draft.subtitle.trim(),
                draft.description,
                draft.notebook_type.as_str(),
                draft.status.as_str(),
                draft.stock_code.trim(),
                draft.company_name.trim(),
                draft.investment_strategy,
                draft.target_price.trim(),
                draft.sell_timing.trim(),
                serde_json::to_string(&draft.key_criteria)?,
                serde_json::to_string(&draft.risk_factors)?,
                bool_to_int(draft.is_public),
                now,
            ],
        )?;

        let tag_ids = resolve_tag_ids(&tx, user_id, &draft.tags)?;
        replace_tag_links(&tx, TagLink::Notebook, &id_text, &tag_ids)?;

        for (index, title) in draft.sub_notebooks.iter().enumerate() {
            tx.execute(
                "INSERT INTO sub_notebooks (id, notebook_id, title, order_index, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5);",
                params![Uuid::new_v4().to_string(), id_text, title.trim(), index as i64, now],
            )?;
        }

        insert_activity(
            &tx,
            user_id,
            &NewActivity {
                activity_type: ActivityType::NotebookCreated,
                title: format!("{} - 新規ノート作成", draft.title.trim()),
                description: format!("銘柄: {}", stock_label(draft)),
                related_object_id: Some(id_text.clone()),
            },
        )?;
        refresh_profile_totals_in(&tx, user_id)?;
        tx.commit()?;

        self.get_notebook(user_id, notebook_id)?
            .ok_or_else(|| RepoError::not_found("notebook", notebook_id))
    }

    fn update_notebook(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        draft: &NotebookDraft,
    ) -> RepoResult<Notebook> {
        draft.validate()?;
        let id_text = notebook_id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE notebooks
             SET
                title = ?3,
                subtitle = ?4,
                description = ?5,
                notebook_type = ?6,
                status = ?7,
                stock_code = ?8,
                company_name = ?9,
                investment_strategy = ?10,
                target_price = ?11,
                sell_timing = ?12,
                key_criteria = ?13,
                risk_factors = ?14,
                is_public = ?15,
                updated_at = ?16
             WHERE id = ?1 AND user_id = ?2;",
            params![
                id_text,
                user_id.to_string(),
                draft.title.trim(),
                draft.subtitle.trim(),
                draft.description,
                draft.notebook_type.as_str(),
                draft.status.as_str(),
                draft.stock_code.trim(),
                draft.company_name.trim(),
                draft.investment_strategy,
                draft.target_price.trim(),
                draft.sell_timing.trim(),
                serde_json::to_string(&draft.key_criteria)?,
                serde_json::to_string(&draft.risk_factors)?,
                bool_to_int(draft.is_public),
                now_ms(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("notebook", notebook_id));
        }

        let tag_ids = resolve_tag_ids(&tx, user_id, &draft.tags)?;
        replace_tag_links(&tx, TagLink::Notebook, &id_text, &tag_ids)?;
        tx.commit()?;

        self.get_notebook(user_id, notebook_id)?
            .ok_or_else(|| RepoError::not_found("notebook", notebook_id))
    }

    fn delete_notebook(&self, user_id: UserId, notebook_id: NotebookId) -> RepoResult<()> {
        let id_text = notebook_id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !notebook_owned_by(&tx, notebook_id, user_id)? {
            return Err(RepoError::not_found("notebook", notebook_id));
        }

        let entry_ids = {
            let mut stmt = tx.prepare("SELECT id FROM entries WHERE notebook_id = ?1;")?;
            let mut rows = stmt.query([id_text.as_str()])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                ids.push(row.get::<_, String>(0)?);
            }
            ids
        };
        for entry_id in &entry_ids {
            release_tag_links(&tx, TagLink::Entry, entry_id)?;
        }
        release_tag_links(&tx, TagLink::Notebook, &id_text)?;

        // Entries, relations and sub-notebooks follow via ON DELETE CASCADE.
        tx.execute("DELETE FROM notebooks WHERE id = ?1;", [id_text.as_str()])?;
        refresh_profile_totals_in(&tx, user_id)?;
        tx.commit()?;
        Ok(())
    }

    fn get_notebook(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
    ) -> RepoResult<Option<Notebook>> {
        let sql = format!("{NOTEBOOK_SELECT_SQL} WHERE n.id = ?1 AND n.user_id = ?2;");
        let notebook = self
            .conn
            .query_row(
                &sql,
                params![notebook_id.to_string(), user_id.to_string()],
                |row| Ok(notebook_from_row(row)),
            )
            .optional()?
            .transpose()?;
        let Some(mut notebook) = notebook else {
            return Ok(None);
        };
        notebook.tags = linked_tag_names(self.conn, TagLink::Notebook, &notebook.id.to_string())?;
        Ok(Some(notebook))
    }

    fn list_notebooks(
        &self,
        user_id: UserId,
        query: &NotebookListQuery,
    ) -> RepoResult<NotebookPage> {
        let mut where_sql = String::from(" WHERE n.user_id = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(user_id.to_string())];

        if let Some(status) = query.status {
            where_sql.push_str(" AND n.status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(kind) = query.notebook_type {
            where_sql.push_str(" AND n.notebook_type = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(tag) = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let name = if tag.starts_with('#') {
                tag.to_string()
            } else {
                format!("#{tag}")
            };
            where_sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM notebook_tags nt
                    INNER JOIN tags t ON t.id = nt.tag_id
                    WHERE nt.notebook_id = n.id AND t.name = ?
                )",
            );
            bind_values.push(Value::Text(name));
        }
        let terms = split_terms(query.text.as_deref().unwrap_or_default());
        if let Some(filter) = build_term_filter(
            &terms,
            NOTEBOOK_SEARCH_COLUMNS,
            Some(NOTEBOOK_TAG_EXISTS_SQL),
        ) {
            where_sql.push_str(" AND ");
            where_sql.push_str(&filter.sql);
            bind_values.extend(filter.values);
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM notebooks n{where_sql};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let applied_limit = normalize_notebook_limit(query.limit);
        let sql = format!(
            "{NOTEBOOK_SELECT_SQL}{where_sql} ORDER BY n.updated_at DESC, n.id ASC LIMIT ? OFFSET ?;"
        );
        bind_values.push(Value::Integer(i64::from(applied_limit)));
        bind_values.push(Value::Integer(i64::from(query.offset)));

        let items = query_notebooks(self.conn, &sql, bind_values)?;
        Ok(NotebookPage {
            items,
            total,
            applied_limit,
        })
    }

    fn notebook_stats(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
    ) -> RepoResult<NotebookStats> {
        if !notebook_owned_by(self.conn, notebook_id, user_id)? {
            return Err(RepoError::not_found("notebook", notebook_id));
        }
        let id_text = notebook_id.to_string();

        let mut stmt = self.conn.prepare(
            "SELECT entry_type, COUNT(*)
             FROM entries
             WHERE notebook_id = ?1
             GROUP BY entry_type
             ORDER BY entry_type ASC;",
        )?;
        let mut rows = stmt.query([id_text.as_str()])?;
        let mut entries_by_type = Vec::new();
        while let Some(row) = rows.next()? {
            entries_by_type.push((row.get::<_, String>(0)?, row.get::<_, i64>(1)?));
        }

        let (entry_count, bookmarked_count, important_count, recent, last_entry_at) =
            self.conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(is_bookmarked), 0),
                    COALESCE(SUM(is_important), 0),
                    COALESCE(SUM(CASE WHEN created_at >= ?2 THEN 1 ELSE 0 END), 0),
                    MAX(created_at)
                 FROM entries
                 WHERE notebook_id = ?1;",
                params![id_text, now_ms() - THIRTY_DAYS_MS],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )?;
        let sub_notebook_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sub_notebooks WHERE notebook_id = ?1;",
            [id_text.as_str()],
            |row| row.get(0),
        )?;

        Ok(NotebookStats {
            entry_count,
            entries_by_type,
            bookmarked_count,
            important_count,
            entries_last_30_days: recent,
            last_entry_at,
            sub_notebook_count,
        })
    }

    fn list_sub_notebooks(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
    ) -> RepoResult<Vec<SubNotebook>> {
        if !notebook_owned_by(self.conn, notebook_id, user_id)? {
            return Err(RepoError::not_found("notebook", notebook_id));
        }
        load_sub_notebooks(self.conn, notebook_id)
    }

    fn create_sub_notebook(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        title: &str,
        description: &str,
    ) -> RepoResult<SubNotebook> {
        let title = validate_sub_notebook_title(title)?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !notebook_owned_by(&tx, notebook_id, user_id)? {
            return Err(RepoError::not_found("notebook", notebook_id));
        }

        let sub_id = Uuid::new_v4();
        let now = now_ms();
        let order_index = next_order_index(&tx, notebook_id)?;
        tx.execute(
            "INSERT INTO sub_notebooks (id, notebook_id, title, description, order_index, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
            params![
                sub_id.to_string(),
                notebook_id.to_string(),
                title,
                description.trim(),
                order_index,
                now
            ],
        )?;
        touch_notebook(&tx, notebook_id)?;
        tx.commit()?;

        get_sub_notebook(self.conn, user_id, sub_id)?
            .ok_or_else(|| RepoError::not_found("sub_notebook", sub_id))
    }

    fn update_sub_notebook(
        &self,
        user_id: UserId,
        sub_notebook_id: SubNotebookId,
        title: &str,
        description: &str,
    ) -> RepoResult<SubNotebook> {
        let title = validate_sub_notebook_title(title)?;
        if get_sub_notebook(self.conn, user_id, sub_notebook_id)?.is_none() {
            return Err(RepoError::not_found("sub_notebook", sub_notebook_id));
        }
        self.conn.execute(
            "UPDATE sub_notebooks SET title = ?2, description = ?3, updated_at = ?4 WHERE id = ?1;",
            params![sub_notebook_id.to_string(), title, description.trim(), now_ms()],
        )?;
        get_sub_notebook(self.conn, user_id, sub_notebook_id)?
            .ok_or_else(|| RepoError::not_found("sub_notebook", sub_notebook_id))
    }

    fn move_sub_notebook(
        &self,
        user_id: UserId,
        sub_notebook_id: SubNotebookId,
        target_index: i64,
    ) -> RepoResult<Vec<SubNotebook>> {
        let Some(current) = get_sub_notebook(self.conn, user_id, sub_notebook_id)? else {
            return Err(RepoError::not_found("sub_notebook", sub_notebook_id));
        };

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut sibling_ids: Vec<SubNotebookId> = load_sub_notebooks(&tx, current.notebook_id)?
            .into_iter()
            .map(|sub| sub.id)
            .filter(|id| *id != sub_notebook_id)
            .collect();
        let target = target_index.clamp(0, sibling_ids.len() as i64) as usize;
        sibling_ids.insert(target, sub_notebook_id);
        renumber_sub_notebooks(&tx, &sibling_ids)?;
        tx.commit()?;

        load_sub_notebooks(self.conn, current.notebook_id)
    }

    fn delete_sub_notebook(
        &self,
        user_id: UserId,
        sub_notebook_id: SubNotebookId,
    ) -> RepoResult<()> {
        let Some(current) = get_sub_notebook(self.conn, user_id, sub_notebook_id)? else {
            return Err(RepoError::not_found("sub_notebook", sub_notebook_id));
        };

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "UPDATE entries SET sub_notebook_id = NULL WHERE sub_notebook_id = ?1;",
            [sub_notebook_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM sub_notebooks WHERE id = ?1;",
            [sub_notebook_id.to_string()],
        )?;
        let remaining: Vec<SubNotebookId> = load_sub_notebooks(&tx, current.notebook_id)?
            .into_iter()
            .map(|sub| sub.id)
            .collect();
        renumber_sub_notebooks(&tx, &remaining)?;
        touch_notebook(&tx, current.notebook_id)?;
        tx.commit()?;
        Ok(())
    }
}

/// Page size normalization: `None`/`0` use the default, else clamp to 5..=50.
pub fn normalize_notebook_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => NOTEBOOK_DEFAULT_LIMIT,
        Some(value) => value.clamp(NOTEBOOK_LIMIT_MIN, NOTEBOOK_LIMIT_MAX),
    }
}

/// Recomputes `entry_count` for a notebook and each of its sub-notebooks.
pub(crate) fn refresh_notebook_counts(conn: &Connection, notebook_id: NotebookId) -> RepoResult<()> {
    let id_text = notebook_id.to_string();
    conn.execute(
        "UPDATE notebooks
         SET entry_count = (SELECT COUNT(*) FROM entries WHERE notebook_id = ?1)
         WHERE id = ?1;",
        [id_text.as_str()],
    )?;
    conn.execute(
        "UPDATE sub_notebooks
         SET entry_count = (
            SELECT COUNT(*) FROM entries WHERE entries.sub_notebook_id = sub_notebooks.id
         )
         WHERE notebook_id = ?1;",
        [id_text.as_str()],
    )?;
    Ok(())
}

pub(crate) fn touch_notebook(conn: &Connection, notebook_id: NotebookId) -> RepoResult<()> {
    conn.execute(
        "UPDATE notebooks SET updated_at = ?2 WHERE id = ?1;",
        params![notebook_id.to_string(), now_ms()],
    )?;
    Ok(())
}

pub(crate) fn notebook_owned_by(
    conn: &Connection,
    notebook_id: NotebookId,
    user_id: UserId,
) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM notebooks WHERE id = ?1 AND user_id = ?2);",
        params![notebook_id.to_string(), user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn query_notebooks(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<Value>,
) -> RepoResult<Vec<Notebook>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut notebooks = Vec::new();
    while let Some(row) = rows.next()? {
        let mut notebook = notebook_from_row(row)?;
        notebook.tags = linked_tag_names(conn, TagLink::Notebook, &notebook.id.to_string())?;
        notebooks.push(notebook);
    }
    Ok(notebooks)
}

fn get_sub_notebook(
    conn: &Connection,
    user_id: UserId,
    sub_notebook_id: SubNotebookId,
) -> RepoResult<Option<SubNotebook>> {
    conn.query_row(
        "SELECT s.id, s.notebook_id, s.title, s.description, s.order_index, s.entry_count,
                s.created_at, s.updated_at
         FROM sub_notebooks s
         INNER JOIN notebooks n ON n.id = s.notebook_id
         WHERE s.id = ?1 AND n.user_id = ?2;",
        params![sub_notebook_id.to_string(), user_id.to_string()],
        |row| Ok(sub_notebook_from_row(row)),
    )
    .optional()?
    .transpose()
}

fn load_sub_notebooks(conn: &Connection, notebook_id: NotebookId) -> RepoResult<Vec<SubNotebook>> {
    let mut stmt = conn.prepare(
        "SELECT id, notebook_id, title, description, order_index, entry_count, created_at, updated_at
         FROM sub_notebooks
         WHERE notebook_id = ?1
         ORDER BY order_index ASC, created_at ASC, id ASC;",
    )?;
    let mut rows = stmt.query([notebook_id.to_string()])?;
    let mut subs = Vec::new();
    while let Some(row) = rows.next()? {
        subs.push(sub_notebook_from_row(row)?);
    }
    Ok(subs)
}

fn renumber_sub_notebooks(conn: &Connection, ordered_ids: &[SubNotebookId]) -> RepoResult<()> {
    let now = now_ms();
    for (index, id) in ordered_ids.iter().enumerate() {
        conn.execute(
            "UPDATE sub_notebooks SET order_index = ?2, updated_at = ?3 WHERE id = ?1;",
            params![id.to_string(), index as i64, now],
        )?;
    }
    Ok(())
}

fn next_order_index(conn: &Connection, notebook_id: NotebookId) -> RepoResult<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(order_index), -1) + 1 FROM sub_notebooks WHERE notebook_id = ?1;",
        [notebook_id.to_string()],
        |row| row.get(0),
    )?)
}

fn validate_sub_notebook_title(title: &str) -> Result<&str, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::new("title", "title is required"));
    }
    check_max_chars("title", title, SUB_NOTEBOOK_TITLE_MAX_CHARS)?;
    Ok(title)
}

fn stock_label(draft: &NotebookDraft) -> &str {
    [draft.company_name.trim(), draft.stock_code.trim()]
        .into_iter()
        .find(|value| !value.is_empty())
        .unwrap_or("未設定")
}

fn notebook_from_row(row: &Row<'_>) -> RepoResult<Notebook> {
    let id_text: String = row.get("id")?;
    let user_text: String = row.get("user_id")?;
    let kind: String = row.get("notebook_type")?;
    let status: String = row.get("status")?;
    let key_criteria: String = row.get("key_criteria")?;
    let risk_factors: String = row.get("risk_factors")?;
    Ok(Notebook {
        id: parse_uuid(&id_text, "notebooks.id")?,
        user_id: parse_uuid(&user_text, "notebooks.user_id")?,
        title: row.get("title")?,
        subtitle: row.get("subtitle")?,
        description: row.get("description")?,
        notebook_type: NotebookType::parse(&kind)
            .ok_or_else(|| invalid_enum("notebooks.notebook_type", &kind))?,
        status: NotebookStatus::parse(&status)
            .ok_or_else(|| invalid_enum("notebooks.status", &status))?,
        stock_code: row.get("stock_code")?,
        company_name: row.get("company_name")?,
        investment_strategy: row.get("investment_strategy")?,
        target_price: row.get("target_price")?,
        sell_timing: row.get("sell_timing")?,
        key_criteria: serde_json::from_str(&key_criteria)?,
        risk_factors: serde_json::from_str(&risk_factors)?,
        entry_count: row.get("entry_count")?,
        is_public: row.get::<_, i64>("is_public")? == 1,
        tags: Vec::new(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn sub_notebook_from_row(row: &Row<'_>) -> RepoResult<SubNotebook> {
    let id_text: String = row.get("id")?;
    let notebook_text: String = row.get("notebook_id")?;
    Ok(SubNotebook {
        id: parse_uuid(&id_text, "sub_notebooks.id")?,
        notebook_id: parse_uuid(&notebook_text, "sub_notebooks.notebook_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        order_index: row.get("order_index")?,
        entry_count: row.get("entry_count")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
