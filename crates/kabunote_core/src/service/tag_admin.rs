//! Operator tag maintenance: cleanup, statistics, recount, duplicate merge,
//! export/import and backup.
//!
//! # Responsibility
//! - Back the `manage-tags` command family.
//! - Keep file formats stable so an export can be imported again.
//!
//! # Invariants
//! - Every operation may be scoped to one user; `None` means all users.
//! - Cleanup only deactivates tags with no notebook or entry links.
//! - Merging moves links to the surviving tag before deleting the others, then
//!   recounts its usage from links.
//! - Imported tags start with `usage_count = 0`; usage always reflects links.

use super::maintenance::{recount_tag_usage, MaintenanceError, MaintenanceResult};
use crate::db::{bool_to_int, now_ms};
use crate::model::account::UserId;
use crate::model::tag::{categorize_tag_name, normalize_tag_name, Tag, TagCategory, TagId};
use crate::repo::tag_repo::{query_tags, TAG_SELECT_SQL};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CLEANUP_DEFAULT_DAYS: u32 = 30;
const TOP_TAGS_LIMIT: usize = 10;
const RECENT_TAGS_LIMIT: usize = 5;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Xml,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Json,
}

impl ImportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub days: u32,
    pub candidates: Vec<Tag>,
    pub deactivated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub total: i64,
    pub active: i64,
    pub usage: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagStats {
    pub total: i64,
    pub active: i64,
    pub used: i64,
    pub total_usage: i64,
    pub by_category: BTreeMap<&'static str, CategoryStats>,
    /// Filled only for detailed stats.
    pub top_tags: Vec<Tag>,
    pub recent_tags: Vec<Tag>,
    pub unused_count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateCountsReport {
    pub checked: i64,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub primary: Tag,
    pub duplicates: Vec<Tag>,
    /// Surviving tag id when the group was merged.
    pub merged_into: Option<TagId>,
}

/// One exported tag, shared by csv/json export and backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    pub name: String,
    pub category: String,
    pub description: String,
    pub usage_count: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One imported tag; missing fields keep defaults or existing values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TagImportRecord {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub dry_run: bool,
    pub read: usize,
    pub created: usize,
    pub updated: usize,
    /// Records whose name fails tag name rules.
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
struct BackupFile<'a> {
    timestamp: String,
    total_count: usize,
    tags: &'a [TagRecord],
}

/// Deactivates unlinked active tags that are unused or untouched for `days`.
pub fn cleanup(
    conn: &Connection,
    user_id: Option<UserId>,
    days: u32,
    dry_run: bool,
) -> MaintenanceResult<CleanupReport> {
    let cutoff = now_ms() - i64::from(days) * DAY_MS;
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let candidates = query_tags(
        &tx,
        &format!(
            "{TAG_SELECT_SQL}
             WHERE is_active = 1
               AND (usage_count = 0 OR updated_at < ?1)
               AND NOT EXISTS (SELECT 1 FROM notebook_tags l WHERE l.tag_id = tags.id)
               AND NOT EXISTS (SELECT 1 FROM entry_tags l WHERE l.tag_id = tags.id)
               AND (?2 IS NULL OR user_id = ?2)
             ORDER BY updated_at ASC, id ASC;"
        ),
        vec![Value::Integer(cutoff), user_value(user_id)],
    )?;

    let mut deactivated = 0;
    if !dry_run {
        let now = now_ms();
        for tag in &candidates {
            deactivated += tx.execute(
                "UPDATE tags SET is_active = 0, updated_at = ?2 WHERE id = ?1;",
                params![tag.id, now],
            )?;
        }
        tx.commit()?;
    }

    log::info!(
        "event=tag_cleanup module=tags status=ok dry_run={dry_run} days={days} candidates={} deactivated={deactivated}",
        candidates.len()
    );
    Ok(CleanupReport {
        dry_run,
        days,
        candidates,
        deactivated,
    })
}

/// Totals, per-category figures and, when `detailed`, top/recent/unused tags.
pub fn stats(
    conn: &Connection,
    user_id: Option<UserId>,
    category: Option<TagCategory>,
    detailed: bool,
) -> MaintenanceResult<TagStats> {
    let user = user_value(user_id);
    let mut stats = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(is_active), 0),
            COALESCE(SUM(CASE WHEN usage_count > 0 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(usage_count), 0)
         FROM tags
         WHERE (?1 IS NULL OR user_id = ?1);",
        [&user],
        |row| {
            Ok(TagStats {
                total: row.get(0)?,
                active: row.get(1)?,
                used: row.get(2)?,
                total_usage: row.get(3)?,
                ..TagStats::default()
            })
        },
    )?;

    let categories: Vec<TagCategory> = match category {
        Some(category) => vec![category],
        None => TagCategory::ALL.to_vec(),
    };
    for category in categories {
        let figures = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_active), 0), COALESCE(SUM(usage_count), 0)
             FROM tags
             WHERE category = ?1 AND (?2 IS NULL OR user_id = ?2);",
            params![category.as_str(), user],
            |row| {
                Ok(CategoryStats {
                    total: row.get(0)?,
                    active: row.get(1)?,
                    usage: row.get(2)?,
                })
            },
        )?;
        stats.by_category.insert(category.as_str(), figures);
    }

    if detailed {
        stats.top_tags = query_tags(
            conn,
            &format!(
                "{TAG_SELECT_SQL}
                 WHERE usage_count > 0 AND (?1 IS NULL OR user_id = ?1)
                 ORDER BY usage_count DESC, name ASC
                 LIMIT {TOP_TAGS_LIMIT};"
            ),
            vec![user.clone()],
        )?;
        stats.recent_tags = query_tags(
            conn,
            &format!(
                "{TAG_SELECT_SQL}
                 WHERE (?1 IS NULL OR user_id = ?1)
                 ORDER BY created_at DESC, id DESC
                 LIMIT {RECENT_TAGS_LIMIT};"
            ),
            vec![user.clone()],
        )?;
        stats.unused_count = Some(conn.query_row(
            "SELECT COUNT(*) FROM tags WHERE usage_count = 0 AND (?1 IS NULL OR user_id = ?1);",
            [&user],
            |row| row.get(0),
        )?);
    }
    Ok(stats)
}

/// Recounts usage from links; without `all` only zero-usage tags are checked.
pub fn update_counts(
    conn: &Connection,
    user_id: Option<UserId>,
    all: bool,
) -> MaintenanceResult<UpdateCountsReport> {
    let user_text = user_id.map(|id| id.to_string());
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let checked: i64 = tx.query_row(
        "SELECT COUNT(*) FROM tags
         WHERE (?1 IS NULL OR user_id = ?1) AND (?2 = 1 OR usage_count = 0);",
        params![user_text, bool_to_int(all)],
        |row| row.get(0),
    )?;
    let updated = recount_tag_usage(&tx, user_text.as_deref(), all)?;
    tx.commit()?;

    log::info!("event=tag_update_counts module=tags status=ok all={all} checked={checked} updated={updated}");
    Ok(UpdateCountsReport { checked, updated })
}

/// Finds tags whose names differ only by case within one user.
///
/// With `merge`, each group collapses into its most used tag (lowest id on
/// ties).
pub fn check_duplicates(
    conn: &Connection,
    user_id: Option<UserId>,
    merge: bool,
) -> MaintenanceResult<Vec<DuplicateGroup>> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let tags = query_tags(
        &tx,
        &format!("{TAG_SELECT_SQL} WHERE (?1 IS NULL OR user_id = ?1) ORDER BY id ASC;"),
        vec![user_value(user_id)],
    )?;

    let mut buckets: BTreeMap<(UserId, String), Vec<Tag>> = BTreeMap::new();
    for tag in tags {
        buckets
            .entry((tag.user_id, tag.name.to_lowercase()))
            .or_default()
            .push(tag);
    }

    let mut groups = Vec::new();
    for (_, mut members) in buckets {
        if members.len() < 2 {
            continue;
        }
        let primary = members.remove(0);
        let mut group = DuplicateGroup {
            primary,
            duplicates: members,
            merged_into: None,
        };
        if merge {
            group.merged_into = Some(merge_group(&tx, &group)?);
        }
        groups.push(group);
    }
    tx.commit()?;

    log::info!(
        "event=tag_duplicates module=tags status=ok merge={merge} groups={}",
        groups.len()
    );
    Ok(groups)
}

/// Writes tags in `format` to `writer`; returns the number written.
pub fn export_tags<W: Write>(
    conn: &Connection,
    user_id: Option<UserId>,
    format: ExportFormat,
    include_inactive: bool,
    writer: W,
) -> MaintenanceResult<usize> {
    let records = load_records(conn, user_id, include_inactive)?;
    match format {
        ExportFormat::Csv => write_csv(&records, writer)?,
        ExportFormat::Json => write_json(&records, writer)?,
        ExportFormat::Xml => write_xml(&records, writer)?,
    }
    log::info!(
        "event=tag_export module=tags status=ok format={} count={}",
        format.extension(),
        records.len()
    );
    Ok(records.len())
}

/// Exports into `path`, or `tags_export_<timestamp>.<ext>` in the working
/// directory when no path is given; returns the path and count.
pub fn export_to_file(
    conn: &Connection,
    user_id: Option<UserId>,
    format: ExportFormat,
    include_inactive: bool,
    path: Option<&Path>,
) -> MaintenanceResult<(PathBuf, usize)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(format!(
            "tags_export_{}.{}",
            file_timestamp(Utc::now()),
            format.extension()
        )),
    };
    let file = BufWriter::new(File::create(&path)?);
    let count = export_tags(conn, user_id, format, include_inactive, file)?;
    Ok((path, count))
}

/// Parses an import file without touching the database.
pub fn read_import_file(path: &Path, format: ImportFormat) -> MaintenanceResult<Vec<TagImportRecord>> {
    match format {
        ImportFormat::Csv => {
            let mut reader = csv::Reader::from_path(path)?;
            let headers = reader.headers()?.clone();
            let column = |name: &str| headers.iter().position(|header| header.trim() == name);
            let Some(name_column) = column("name") else {
                return Err(MaintenanceError::Invalid(
                    "csv import requires a `name` column".to_string(),
                ));
            };
            let category_column = column("category");
            let description_column = column("description");
            let active_column = column("is_active");

            let mut records = Vec::new();
            for row in reader.records() {
                let row = row?;
                let field = |index: Option<usize>| index.and_then(|i| row.get(i));
                records.push(TagImportRecord {
                    name: row.get(name_column).unwrap_or_default().trim().to_string(),
                    category: field(category_column).map(|value| value.trim().to_ascii_uppercase()),
                    description: field(description_column).map(str::to_string),
                    is_active: field(active_column)
                        .map(|value| value.trim().eq_ignore_ascii_case("true")),
                });
            }
            Ok(records)
        }
        ImportFormat::Json => {
            let text = fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            if !value.is_array() {
                return Err(MaintenanceError::Invalid(
                    "json import must contain an array of tag objects".to_string(),
                ));
            }
            Ok(serde_json::from_value(value)?)
        }
    }
}

/// Creates missing tags and updates existing ones for `user_id`.
pub fn import_tags(
    conn: &Connection,
    user_id: UserId,
    records: &[TagImportRecord],
    dry_run: bool,
) -> MaintenanceResult<ImportReport> {
    let mut report = ImportReport {
        dry_run,
        read: records.len(),
        ..ImportReport::default()
    };
    let user_text = user_id.to_string();
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1);",
        [&user_text],
        |row| row.get::<_, i64>(0).map(|value| value == 1),
    )?;
    if !exists {
        return Err(MaintenanceError::Invalid(format!("user not found: {user_id}")));
    }

    let now = now_ms();
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    for record in records {
        let Ok(name) = normalize_tag_name(&record.name) else {
            report.skipped += 1;
            continue;
        };
        let category = record
            .category
            .as_deref()
            .and_then(TagCategory::parse);
        let existing: Option<TagId> = tx
            .query_row(
                "SELECT id FROM tags WHERE user_id = ?1 AND name = ?2;",
                params![user_text, name],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(tag_id) => {
                if !dry_run {
                    tx.execute(
                        "UPDATE tags
                         SET
                            category = COALESCE(?2, category),
                            description = COALESCE(?3, description),
                            is_active = COALESCE(?4, is_active),
                            updated_at = ?5
                         WHERE id = ?1;",
                        params![
                            tag_id,
                            category.map(TagCategory::as_str),
                            record.description,
                            record.is_active.map(bool_to_int),
                            now
                        ],
                    )?;
                }
                report.updated += 1;
            }
            None => {
                if !dry_run {
                    let category = category.unwrap_or_else(|| categorize_tag_name(&name));
                    tx.execute(
                        "INSERT INTO tags (user_id, name, category, description, usage_count, is_active, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6);",
                        params![
                            user_text,
                            name,
                            category.as_str(),
                            record.description.as_deref().unwrap_or_default(),
                            bool_to_int(record.is_active.unwrap_or(true)),
                            now
                        ],
                    )?;
                }
                report.created += 1;
            }
        }
    }
    if !dry_run {
        tx.commit()?;
    }

    log::info!(
        "event=tag_import module=tags status=ok user_id={user_id} dry_run={dry_run} read={} created={} updated={} skipped={}",
        report.read,
        report.created,
        report.updated,
        report.skipped
    );
    Ok(report)
}

/// Writes `tags_backup_<timestamp>.json` into `output_dir`, creating it.
pub fn backup_tags(
    conn: &Connection,
    user_id: Option<UserId>,
    output_dir: &Path,
) -> MaintenanceResult<(PathBuf, usize)> {
    fs::create_dir_all(output_dir)?;
    let now = Utc::now();
    let path = output_dir.join(format!("tags_backup_{}.json", file_timestamp(now)));
    let records = load_records(conn, user_id, true)?;
    let backup = BackupFile {
        timestamp: now.to_rfc3339(),
        total_count: records.len(),
        tags: &records,
    };
    let mut file = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut file, &backup)?;
    file.flush()?;

    log::info!(
        "event=tag_backup module=tags status=ok count={} path={}",
        records.len(),
        path.display()
    );
    Ok((path, records.len()))
}

fn merge_group(conn: &Connection, group: &DuplicateGroup) -> MaintenanceResult<TagId> {
    let keep = std::iter::once(&group.primary)
        .chain(group.duplicates.iter())
        .max_by(|a, b| a.usage_count.cmp(&b.usage_count).then(b.id.cmp(&a.id)))
        .map_or(group.primary.id, |tag| tag.id);

    for tag in std::iter::once(&group.primary).chain(group.duplicates.iter()) {
        if tag.id == keep {
            continue;
        }
        conn.execute(
            "INSERT OR IGNORE INTO notebook_tags (notebook_id, tag_id)
             SELECT notebook_id, ?1 FROM notebook_tags WHERE tag_id = ?2;",
            params![keep, tag.id],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO entry_tags (entry_id, tag_id)
             SELECT entry_id, ?1 FROM entry_tags WHERE tag_id = ?2;",
            params![keep, tag.id],
        )?;
        conn.execute("DELETE FROM tags WHERE id = ?1;", [tag.id])?;
    }
    conn.execute(
        "UPDATE tags
         SET
            usage_count = (SELECT COUNT(*) FROM notebook_tags WHERE tag_id = ?1)
                        + (SELECT COUNT(*) FROM entry_tags WHERE tag_id = ?1),
            updated_at = ?2
         WHERE id = ?1;",
        params![keep, now_ms()],
    )?;
    Ok(keep)
}

fn load_records(
    conn: &Connection,
    user_id: Option<UserId>,
    include_inactive: bool,
) -> MaintenanceResult<Vec<TagRecord>> {
    let tags = query_tags(
        conn,
        &format!(
            "{TAG_SELECT_SQL}
             WHERE (?1 IS NULL OR user_id = ?1) AND (?2 = 1 OR is_active = 1)
             ORDER BY user_id ASC, name ASC;"
        ),
        vec![user_value(user_id), Value::Integer(bool_to_int(include_inactive))],
    )?;
    Ok(tags.iter().map(tag_record).collect())
}

fn tag_record(tag: &Tag) -> TagRecord {
    TagRecord {
        name: tag.name.clone(),
        category: tag.category.as_str().to_string(),
        description: tag.description.clone(),
        usage_count: tag.usage_count,
        is_active: tag.is_active,
        created_at: rfc3339(tag.created_at),
        updated_at: rfc3339(tag.updated_at),
    }
}

fn write_csv<W: Write>(records: &[TagRecord], writer: W) -> MaintenanceResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    if records.is_empty() {
        writer.write_record([
            "name",
            "category",
            "description",
            "usage_count",
            "is_active",
            "created_at",
            "updated_at",
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<W: Write>(records: &[TagRecord], mut writer: W) -> MaintenanceResult<()> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}

fn write_xml<W: Write>(records: &[TagRecord], mut writer: W) -> MaintenanceResult<()> {
    writeln!(writer, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(writer, "<tags>")?;
    for record in records {
        writeln!(writer, "  <tag>")?;
        writeln!(writer, "    <name>{}</name>", escape_xml(&record.name))?;
        writeln!(writer, "    <category>{}</category>", record.category)?;
        writeln!(
            writer,
            "    <description>{}</description>",
            escape_xml(&record.description)
        )?;
        writeln!(writer, "    <usage_count>{}</usage_count>", record.usage_count)?;
        writeln!(writer, "    <is_active>{}</is_active>", record.is_active)?;
        writeln!(writer, "    <created_at>{}</created_at>", record.created_at)?;
        writeln!(writer, "    <updated_at>{}</updated_at>", record.updated_at)?;
        writeln!(writer, "  </tag>")?;
    }
    writeln!(writer, "</tags>")?;
    writer.flush()?;
    Ok(())
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn rfc3339(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .map(|at| at.to_rfc3339())
        .unwrap_or_default()
}

fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

fn user_value(user_id: Option<UserId>) -> Value {
    user_id.map_or(Value::Null, |id| Value::Text(id.to_string()))
}
