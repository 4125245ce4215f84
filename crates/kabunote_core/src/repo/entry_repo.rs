//! Entry and entry-relation persistence.
//!
//! # Responsibility
//! - Entry CRUD scoped through the owning notebook's user.
//! - Bookmark/important flags, recent listings and entry relations.
//!
//! # Invariants
//! - `content` is shaped by the entry type and `summary` re-derived on every
//!   write.
//! - Notebook/sub-notebook `entry_count`, profile totals and tag usage are
//!   refreshed in the same transaction as the entry write.
//! - A sub-notebook assigned to an entry belongs to the entry's notebook.
//! - Relations link two distinct entries of the same user.

use super::account_repo::refresh_profile_totals_in;
use super::activity_repo::insert_activity;
use super::notebook_repo::{notebook_owned_by, refresh_notebook_counts, touch_notebook};
use super::tag_repo::{linked_tag_names, release_tag_links, replace_tag_links, resolve_tag_ids, TagLink};
use super::{
    ensure_schema, invalid_enum, is_unique_violation, parse_uuid, RepoError, RepoResult,
};
use crate::db::{bool_to_int, now_ms};
use crate::model::account::UserId;
use crate::model::activity::{ActivityType, NewActivity};
use crate::model::entry::{
    extract_summary, normalize_content, Entry, EntryDraft, EntryId, EntryRelation, EntryType,
    RelationId, RelationType, SUMMARY_MAX_CHARS,
};
use crate::model::notebook::{NotebookId, SubNotebookId};
use crate::model::ValidationError;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use uuid::Uuid;

pub const ENTRY_DEFAULT_LIMIT: u32 = 20;
const ENTRY_LIMIT_MAX: u32 = 100;

pub(crate) const ENTRY_SELECT_SQL: &str = "SELECT
    e.id,
    e.notebook_id,
    e.sub_notebook_id,
    e.entry_type,
    e.title,
    e.content,
    e.summary,
    e.stock_code,
    e.company_name,
    e.current_price,
    e.target_price,
    e.event_date,
    e.is_important,
    e.is_bookmarked,
    e.created_at,
    e.updated_at
FROM entries e
INNER JOIN notebooks n ON n.id = e.notebook_id";

/// Searchable entry columns, used by unified search.
pub(crate) const ENTRY_SEARCH_COLUMNS: &[&str] = &[
    "e.title",
    "e.summary",
    "e.content",
    "e.stock_code",
    "e.company_name",
];

pub(crate) const ENTRY_TAG_EXISTS_SQL: &str = "EXISTS (
    SELECT 1
    FROM entry_tags et
    INNER JOIN tags t ON t.id = et.tag_id
    WHERE et.entry_id = e.id
      AND t.name LIKE ? ESCAPE '\\'
)";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryListQuery {
    pub sub_notebook_id: Option<SubNotebookId>,
    pub entry_type: Option<EntryType>,
    pub bookmarked_only: bool,
    pub important_only: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// An entry plus the notebook title it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryWithNotebook {
    pub entry: Entry,
    pub notebook_title: String,
}

pub trait EntryRepository {
    fn create_entry(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        draft: &EntryDraft,
    ) -> RepoResult<Entry>;
    fn update_entry(&self, user_id: UserId, entry_id: EntryId, draft: &EntryDraft)
        -> RepoResult<Entry>;
    fn delete_entry(&self, user_id: UserId, entry_id: EntryId) -> RepoResult<()>;
    fn get_entry(&self, user_id: UserId, entry_id: EntryId) -> RepoResult<Option<Entry>>;
    /// Newest first within one notebook.
    fn list_entries(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        query: &EntryListQuery,
    ) -> RepoResult<Vec<Entry>>;
    /// Newest entries across all notebooks of the user.
    fn recent_entries(&self, user_id: UserId, limit: u32) -> RepoResult<Vec<EntryWithNotebook>>;
    /// Flips the bookmark flag and returns the new value.
    fn toggle_bookmark(&self, user_id: UserId, entry_id: EntryId) -> RepoResult<bool>;
    fn set_important(&self, user_id: UserId, entry_id: EntryId, important: bool)
        -> RepoResult<()>;

    fn create_relation(
        &self,
        user_id: UserId,
        from_entry_id: EntryId,
        to_entry_id: EntryId,
        relation_type: RelationType,
        notes: &str,
    ) -> RepoResult<EntryRelation>;
    /// Relations where the entry is either endpoint, oldest first.
    fn list_relations(&self, user_id: UserId, entry_id: EntryId) -> RepoResult<Vec<EntryRelation>>;
    fn delete_relation(&self, user_id: UserId, relation_id: RelationId) -> RepoResult<()>;
}

pub struct SqliteEntryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntryRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(
            conn,
            &[
                (
                    "entries",
                    &["id", "notebook_id", "sub_notebook_id", "content", "summary"],
                ),
                ("entry_tags", &["entry_id", "tag_id"]),
                (
                    "entry_relations",
                    &["id", "from_entry_id", "to_entry_id", "relation_type"],
                ),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn create_entry(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        draft: &EntryDraft,
    ) -> RepoResult<Entry> {
        draft.validate()?;
        let content = normalize_content(draft.entry_type, draft.content.clone());
        let summary = extract_summary(&content, SUMMARY_MAX_CHARS);
        let entry_id = Uuid::new_v4();
        let id_text = entry_id.to_string();
        let now = now_ms();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let Some(notebook_title) = owned_notebook_title(&tx, notebook_id, user_id)? else {
            return Err(RepoError::not_found("notebook", notebook_id));
        };
        ensure_sub_notebook_in(&tx, notebook_id, draft.sub_notebook_id)?;

        tx.execute(
            "INSERT INTO entries (
                id, notebook_id, sub_notebook_id, entry_type, title, content, summary,
                stock_code, company_name, current_price, target_price, event_date,
                is_important, is_bookmarked, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15);",
            params![
                id_text,
                notebook_id.to_string(),
                draft.sub_notebook_id.map(|id| id.to_string()),
                draft.entry_type.as_str(),
                draft.title.trim(),
                serde_json::to_string(&content)?,
                summary,
                draft.stock_code.trim(),
                draft.company_name.trim(),
                draft.current_price,
                draft.target_price,
                clean_event_date(draft.event_date.as_deref()),
                bool_to_int(draft.is_important),
                bool_to_int(draft.is_bookmarked),
                now,
            ],
        )?;

        let tag_ids = resolve_tag_ids(&tx, user_id, &draft.tags)?;
        replace_tag_links(&tx, TagLink::Entry, &id_text, &tag_ids)?;
        refresh_notebook_counts(&tx, notebook_id)?;
        touch_notebook(&tx, notebook_id)?;
        refresh_profile_totals_in(&tx, user_id)?;
        insert_activity(
            &tx,
            user_id,
            &NewActivity {
                activity_type: ActivityType::EntryAdded,
                title: format!("{notebook_title} - エントリー追加"),
                description: format!("{}: {}", draft.entry_type.label(), draft.title.trim()),
                related_object_id: Some(id_text.clone()),
            },
        )?;
        tx.commit()?;

        self.get_entry(user_id, entry_id)?
            .ok_or_else(|| RepoError::not_found("entry", entry_id))
    }

    fn update_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
        draft: &EntryDraft,
    ) -> RepoResult<Entry> {
        draft.validate()?;
        let content = normalize_content(draft.entry_type, draft.content.clone());
        let summary = extract_summary(&content, SUMMARY_MAX_CHARS);
        let id_text = entry_id.to_string();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let Some(notebook_id) = owned_entry_notebook(&tx, entry_id, user_id)? else {
            return Err(RepoError::not_found("entry", entry_id));
        };
        ensure_sub_notebook_in(&tx, notebook_id, draft.sub_notebook_id)?;

        tx.execute(
            "UPDATE entries
             SET
                sub_notebook_id = ?2,
                entry_type = ?3,
                title = ?4,
                content = ?5,
                summary = ?6,
                stock_code = ?7,
                company_name = ?8,
                current_price = ?9,
                target_price = ?10,
                event_date = ?11,
                is_important = ?12,
                is_bookmarked = ?13,
                updated_at = ?14
             WHERE id = ?1;",
            params![
                id_text,
                draft.sub_notebook_id.map(|id| id.to_string()),
                draft.entry_type.as_str(),
                draft.title.trim(),
                serde_json::to_string(&content)?,
                summary,
                draft.stock_code.trim(),
                draft.company_name.trim(),
                draft.current_price,
                draft.target_price,
                clean_event_date(draft.event_date.as_deref()),
                bool_to_int(draft.is_important),
                bool_to_int(draft.is_bookmarked),
                now_ms(),
            ],
        )?;

        let tag_ids = resolve_tag_ids(&tx, user_id, &draft.tags)?;
        replace_tag_links(&tx, TagLink::Entry, &id_text, &tag_ids)?;
        refresh_notebook_counts(&tx, notebook_id)?;
        touch_notebook(&tx, notebook_id)?;

        if draft.entry_type == EntryType::Goal {
            insert_activity(
                &tx,
                user_id,
                &NewActivity {
                    activity_type: ActivityType::GoalUpdated,
                    title: format!("{} - 目標更新", draft.title.trim()),
                    description: goal_description(&content),
                    related_object_id: Some(id_text.clone()),
                },
            )?;
        }
        tx.commit()?;

        self.get_entry(user_id, entry_id)?
            .ok_or_else(|| RepoError::not_found("entry", entry_id))
    }

    fn delete_entry(&self, user_id: UserId, entry_id: EntryId) -> RepoResult<()> {
        let id_text = entry_id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let Some(notebook_id) = owned_entry_notebook(&tx, entry_id, user_id)? else {
            return Err(RepoError::not_found("entry", entry_id));
        };

        release_tag_links(&tx, TagLink::Entry, &id_text)?;
        tx.execute("DELETE FROM entries WHERE id = ?1;", [id_text.as_str()])?;
        refresh_notebook_counts(&tx, notebook_id)?;
        touch_notebook(&tx, notebook_id)?;
        refresh_profile_totals_in(&tx, user_id)?;
        tx.commit()?;
        Ok(())
    }

    fn get_entry(&self, user_id: UserId, entry_id: EntryId) -> RepoResult<Option<Entry>> {
        let sql = format!("{ENTRY_SELECT_SQL} WHERE e.id = ?1 AND n.user_id = ?2;");
        let entry = self
            .conn
            .query_row(
                &sql,
                params![entry_id.to_string(), user_id.to_string()],
                |row| Ok(entry_from_row(row)),
            )
            .optional()?
            .transpose()?;
        let Some(mut entry) = entry else {
            return Ok(None);
        };
        entry.tags = linked_tag_names(self.conn, TagLink::Entry, &entry.id.to_string())?;
        Ok(Some(entry))
    }

    fn list_entries(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        query: &EntryListQuery,
    ) -> RepoResult<Vec<Entry>> {
        if !notebook_owned_by(self.conn, notebook_id, user_id)? {
            return Err(RepoError::not_found("notebook", notebook_id));
        }

        let mut sql = format!("{ENTRY_SELECT_SQL} WHERE e.notebook_id = ?");
        let mut bind_values = vec![Value::Text(notebook_id.to_string())];
        if let Some(sub_id) = query.sub_notebook_id {
            sql.push_str(" AND e.sub_notebook_id = ?");
            bind_values.push(Value::Text(sub_id.to_string()));
        }
        if let Some(kind) = query.entry_type {
            sql.push_str(" AND e.entry_type = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
        if query.bookmarked_only {
            sql.push_str(" AND e.is_bookmarked = 1");
        }
        if query.important_only {
            sql.push_str(" AND e.is_important = 1");
        }
        sql.push_str(" ORDER BY e.created_at DESC, e.id ASC LIMIT ? OFFSET ?;");
        bind_values.push(Value::Integer(i64::from(normalize_entry_limit(query.limit))));
        bind_values.push(Value::Integer(i64::from(query.offset)));

        query_entries(self.conn, &sql, bind_values)
    }

    fn recent_entries(&self, user_id: UserId, limit: u32) -> RepoResult<Vec<EntryWithNotebook>> {
        let sql = format!(
            "SELECT sub.*, n2.title AS notebook_title
             FROM ({ENTRY_SELECT_SQL} WHERE n.user_id = ?1) sub
             INNER JOIN notebooks n2 ON n2.id = sub.notebook_id
             ORDER BY sub.created_at DESC, sub.id ASC
             LIMIT ?2;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            user_id.to_string(),
            i64::from(normalize_entry_limit(Some(limit)))
        ])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let mut entry = entry_from_row(row)?;
            entry.tags = linked_tag_names(self.conn, TagLink::Entry, &entry.id.to_string())?;
            entries.push(EntryWithNotebook {
                entry,
                notebook_title: row.get("notebook_title")?,
            });
        }
        Ok(entries)
    }

    fn toggle_bookmark(&self, user_id: UserId, entry_id: EntryId) -> RepoResult<bool> {
        if owned_entry_notebook(self.conn, entry_id, user_id)?.is_none() {
            return Err(RepoError::not_found("entry", entry_id));
        }
        Ok(self.conn.query_row(
            "UPDATE entries
             SET is_bookmarked = 1 - is_bookmarked, updated_at = ?2
             WHERE id = ?1
             RETURNING is_bookmarked;",
            params![entry_id.to_string(), now_ms()],
            |row| row.get::<_, i64>(0),
        )? == 1)
    }

    fn set_important(
        &self,
        user_id: UserId,
        entry_id: EntryId,
        important: bool,
    ) -> RepoResult<()> {
        if owned_entry_notebook(self.conn, entry_id, user_id)?.is_none() {
            return Err(RepoError::not_found("entry", entry_id));
        }
        self.conn.execute(
            "UPDATE entries SET is_important = ?2, updated_at = ?3 WHERE id = ?1;",
            params![entry_id.to_string(), bool_to_int(important), now_ms()],
        )?;
        Ok(())
    }

    fn create_relation(
        &self,
        user_id: UserId,
        from_entry_id: EntryId,
        to_entry_id: EntryId,
        relation_type: RelationType,
        notes: &str,
    ) -> RepoResult<EntryRelation> {
        if from_entry_id == to_entry_id {
            return Err(ValidationError::new(
                "to_entry_id",
                "an entry cannot be related to itself",
            )
            .into());
        }
        for id in [from_entry_id, to_entry_id] {
            if owned_entry_notebook(self.conn, id, user_id)?.is_none() {
                return Err(RepoError::not_found("entry", id));
            }
        }

        let relation = EntryRelation {
            id: Uuid::new_v4(),
            from_entry_id,
            to_entry_id,
            relation_type,
            notes: notes.trim().to_string(),
            created_at: now_ms(),
        };
        let inserted = self.conn.execute(
            "INSERT INTO entry_relations (id, from_entry_id, to_entry_id, relation_type, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                relation.id.to_string(),
                from_entry_id.to_string(),
                to_entry_id.to_string(),
                relation_type.as_str(),
                relation.notes,
                relation.created_at
            ],
        );
        match inserted {
            Ok(_) => Ok(relation),
            Err(err) if is_unique_violation(&err) => Err(RepoError::Conflict(format!(
                "relation {} already exists between these entries",
                relation_type.as_str()
            ))),
            Err(err) => Err(err.into()),
        }
    }

    fn list_relations(&self, user_id: UserId, entry_id: EntryId) -> RepoResult<Vec<EntryRelation>> {
        if owned_entry_notebook(self.conn, entry_id, user_id)?.is_none() {
            return Err(RepoError::not_found("entry", entry_id));
        }
        let mut stmt = self.conn.prepare(
            "SELECT id, from_entry_id, to_entry_id, relation_type, notes, created_at
             FROM entry_relations
             WHERE from_entry_id = ?1 OR to_entry_id = ?1
             ORDER BY created_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([entry_id.to_string()])?;
        let mut relations = Vec::new();
        while let Some(row) = rows.next()? {
            relations.push(relation_from_row(row)?);
        }
        Ok(relations)
    }

    fn delete_relation(&self, user_id: UserId, relation_id: RelationId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM entry_relations
             WHERE id = ?1
               AND from_entry_id IN (
                    SELECT e.id
                    FROM entries e
                    INNER JOIN notebooks n ON n.id = e.notebook_id
                    WHERE n.user_id = ?2
               );",
            params![relation_id.to_string(), user_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("relation", relation_id));
        }
        Ok(())
    }
}

pub fn normalize_entry_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => ENTRY_DEFAULT_LIMIT,
        Some(value) => value.min(ENTRY_LIMIT_MAX),
    }
}

pub(crate) fn query_entries(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<Value>,
) -> RepoResult<Vec<Entry>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let mut entry = entry_from_row(row)?;
        entry.tags = linked_tag_names(conn, TagLink::Entry, &entry.id.to_string())?;
        entries.push(entry);
    }
    Ok(entries)
}

fn owned_notebook_title(
    conn: &Connection,
    notebook_id: NotebookId,
    user_id: UserId,
) -> RepoResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT title FROM notebooks WHERE id = ?1 AND user_id = ?2;",
            params![notebook_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )
        .optional()?)
}

fn owned_entry_notebook(
    conn: &Connection,
    entry_id: EntryId,
    user_id: UserId,
) -> RepoResult<Option<NotebookId>> {
    let notebook_text: Option<String> = conn
        .query_row(
            "SELECT e.notebook_id
             FROM entries e
             INNER JOIN notebooks n ON n.id = e.notebook_id
             WHERE e.id = ?1 AND n.user_id = ?2;",
            params![entry_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    notebook_text
        .map(|text| parse_uuid(&text, "entries.notebook_id"))
        .transpose()
}

fn ensure_sub_notebook_in(
    conn: &Connection,
    notebook_id: NotebookId,
    sub_notebook_id: Option<SubNotebookId>,
) -> RepoResult<()> {
    let Some(sub_id) = sub_notebook_id else {
        return Ok(());
    };
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sub_notebooks WHERE id = ?1 AND notebook_id = ?2);",
        params![sub_id.to_string(), notebook_id.to_string()],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(ValidationError::new(
            "sub_notebook_id",
            "sub-notebook does not belong to this notebook",
        )
        .into());
    }
    Ok(())
}

fn clean_event_date(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|date| !date.is_empty())
}

fn goal_description(content: &serde_json::Value) -> String {
    let achieved = content
        .get("achieved")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    if achieved {
        "目標達成".to_string()
    } else {
        "目標進行中".to_string()
    }
}

pub(crate) fn entry_from_row(row: &Row<'_>) -> RepoResult<Entry> {
    let id_text: String = row.get("id")?;
    let notebook_text: String = row.get("notebook_id")?;
    let sub_text: Option<String> = row.get("sub_notebook_id")?;
    let kind: String = row.get("entry_type")?;
    let content: String = row.get("content")?;
    Ok(Entry {
        id: parse_uuid(&id_text, "entries.id")?,
        notebook_id: parse_uuid(&notebook_text, "entries.notebook_id")?,
        sub_notebook_id: sub_text
            .map(|text| parse_uuid(&text, "entries.sub_notebook_id"))
            .transpose()?,
        entry_type: EntryType::parse(&kind).ok_or_else(|| invalid_enum("entries.entry_type", &kind))?,
        title: row.get("title")?,
        // Legacy rows may hold non-JSON text; keep it as a string value.
        content: serde_json::from_str(&content).unwrap_or(serde_json::Value::String(content)),
        summary: row.get("summary")?,
        stock_code: row.get("stock_code")?,
        company_name: row.get("company_name")?,
        current_price: row.get("current_price")?,
        target_price: row.get("target_price")?,
        event_date: row.get("event_date")?,
        is_important: row.get::<_, i64>("is_important")? == 1,
        is_bookmarked: row.get::<_, i64>("is_bookmarked")? == 1,
        tags: Vec::new(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn relation_from_row(row: &Row<'_>) -> RepoResult<EntryRelation> {
    let id_text: String = row.get("id")?;
    let from_text: String = row.get("from_entry_id")?;
    let to_text: String = row.get("to_entry_id")?;
    let kind: String = row.get("relation_type")?;
    Ok(EntryRelation {
        id: parse_uuid(&id_text, "entry_relations.id")?,
        from_entry_id: parse_uuid(&from_text, "entry_relations.from_entry_id")?,
        to_entry_id: parse_uuid(&to_text, "entry_relations.to_entry_id")?,
        relation_type: RelationType::parse(&kind)
            .ok_or_else(|| invalid_enum("entry_relations.relation_type", &kind))?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
    })
}
