//! `manage-tags` subcommands.

use super::confirm;
use anyhow::{anyhow, bail};
use clap::Subcommand;
use kabunote_core::service::tag_admin::{
    self, ExportFormat, ImportFormat, TagStats, CLEANUP_DEFAULT_DAYS,
};
use kabunote_core::{TagCategory, UserId};
use rusqlite::Connection;
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Subcommand, Clone, Debug)]
pub enum TagCommands {
    /// Deactivate unlinked tags that are unused or idle
    Cleanup {
        /// List candidates without changing them
        #[arg(long)]
        dry_run: bool,
        /// Only tags not updated for this many days
        #[arg(long, default_value_t = CLEANUP_DEFAULT_DAYS)]
        days: u32,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Show tag counts by category
    Stats {
        /// Include top, recent and unused tags
        #[arg(long)]
        detailed: bool,
        #[arg(long)]
        category: Option<String>,
    },
    /// Recompute usage counts from links
    UpdateCounts {
        /// Check every tag, not only those at zero
        #[arg(long)]
        all: bool,
    },
    /// Find tags whose names differ only by case
    CheckDuplicates {
        /// Merge each group into its oldest tag
        #[arg(long)]
        merge: bool,
    },
    /// Export tags to csv, json or xml
    Export {
        #[arg(long, default_value = "csv")]
        format: String,
        /// Defaults to `tags_export_<timestamp>.<format>`
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        include_inactive: bool,
    },
    /// Import tags for `--user` from a csv or json file
    Import {
        file: PathBuf,
        #[arg(long, default_value = "csv")]
        format: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a timestamped json backup
    Backup {
        #[arg(long, default_value = "./backups")]
        output_dir: PathBuf,
    },
}

pub fn execute(
    conn: &Connection,
    user_id: Option<UserId>,
    command: TagCommands,
    out: &mut dyn Write,
    input: &mut dyn BufRead,
) -> anyhow::Result<()> {
    match command {
        TagCommands::Cleanup {
            dry_run,
            days,
            force,
        } => cleanup(conn, user_id, days, dry_run, force, out, input),
        TagCommands::Stats { detailed, category } => {
            let category = match category.as_deref() {
                Some(raw) => Some(
                    TagCategory::parse(raw).ok_or_else(|| anyhow!("unknown category: {raw}"))?,
                ),
                None => None,
            };
            let stats = tag_admin::stats(conn, user_id, category, detailed)?;
            print_stats(&stats, out)
        }
        TagCommands::UpdateCounts { all } => {
            let report = tag_admin::update_counts(conn, user_id, all)?;
            writeln!(
                out,
                "Checked {} tag(s), updated {}.",
                report.checked, report.updated
            )?;
            Ok(())
        }
        TagCommands::CheckDuplicates { merge } => check_duplicates(conn, user_id, merge, out),
        TagCommands::Export {
            format,
            output,
            include_inactive,
        } => {
            let Some(format) = ExportFormat::parse(&format) else {
                bail!("unsupported export format: {format} (csv, json or xml)");
            };
            let (path, count) = tag_admin::export_to_file(
                conn,
                user_id,
                format,
                include_inactive,
                output.as_deref(),
            )?;
            writeln!(out, "Exported {count} tag(s) to {}", path.display())?;
            Ok(())
        }
        TagCommands::Import {
            file,
            format,
            dry_run,
        } => {
            let Some(user_id) = user_id else {
                bail!("import needs --user to own the imported tags");
            };
            let Some(format) = ImportFormat::parse(&format) else {
                bail!("unsupported import format: {format} (csv or json)");
            };
            let records = tag_admin::read_import_file(&file, format)?;
            let report = tag_admin::import_tags(conn, user_id, &records, dry_run)?;
            if report.dry_run {
                writeln!(out, "Dry run: no changes written.")?;
            }
            writeln!(
                out,
                "Read {} record(s): {} created, {} updated, {} skipped.",
                report.read, report.created, report.updated, report.skipped
            )?;
            Ok(())
        }
        TagCommands::Backup { output_dir } => {
            let (path, count) = tag_admin::backup_tags(conn, user_id, &output_dir)?;
            writeln!(out, "Backed up {count} tag(s) to {}", path.display())?;
            Ok(())
        }
    }
}

fn cleanup(
    conn: &Connection,
    user_id: Option<UserId>,
    days: u32,
    dry_run: bool,
    force: bool,
    out: &mut dyn Write,
    input: &mut dyn BufRead,
) -> anyhow::Result<()> {
    let preview = tag_admin::cleanup(conn, user_id, days, true)?;
    if preview.candidates.is_empty() {
        writeln!(out, "No unused tags to clean up.")?;
        return Ok(());
    }
    writeln!(
        out,
        "{} unlinked tag(s) unused or idle for {days}+ day(s):",
        preview.candidates.len()
    )?;
    for tag in &preview.candidates {
        writeln!(out, "  {} ({})", tag.name, tag.category.as_str())?;
    }
    if dry_run {
        writeln!(out, "Dry run: no changes written.")?;
        return Ok(());
    }
    if !force && !confirm("Deactivate these tags?", out, input)? {
        writeln!(out, "Cancelled.")?;
        return Ok(());
    }

    let report = tag_admin::cleanup(conn, user_id, days, false)?;
    writeln!(out, "Deactivated {} tag(s).", report.deactivated)?;
    Ok(())
}

fn print_stats(stats: &TagStats, out: &mut dyn Write) -> anyhow::Result<()> {
    writeln!(
        out,
        "Tags: {} total, {} active, {} used, {} total usage",
        stats.total, stats.active, stats.used, stats.total_usage
    )?;
    for (category, row) in &stats.by_category {
        let label = TagCategory::parse(category).map_or(*category, |c| c.label());
        writeln!(
            out,
            "  {label}: {} total, {} active, {} usage",
            row.total, row.active, row.usage
        )?;
    }
    if !stats.top_tags.is_empty() {
        writeln!(out, "Top tags:")?;
        for tag in &stats.top_tags {
            writeln!(out, "  {} ({})", tag.name, tag.usage_count)?;
        }
    }
    if !stats.recent_tags.is_empty() {
        writeln!(out, "Recently created:")?;
        for tag in &stats.recent_tags {
            writeln!(out, "  {}", tag.name)?;
        }
    }
    if let Some(unused) = stats.unused_count {
        writeln!(out, "Unused tags: {unused}")?;
    }
    Ok(())
}

fn check_duplicates(
    conn: &Connection,
    user_id: Option<UserId>,
    merge: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let groups = tag_admin::check_duplicates(conn, user_id, merge)?;
    if groups.is_empty() {
        writeln!(out, "No duplicate tags found.")?;
        return Ok(());
    }
    writeln!(out, "{} duplicate group(s):", groups.len())?;
    for group in &groups {
        let others: Vec<&str> = group.duplicates.iter().map(|tag| tag.name.as_str()).collect();
        writeln!(out, "  {} <- {}", group.primary.name, others.join(", "))?;
        if let Some(target) = group.merged_into {
            writeln!(out, "    merged into tag {target}")?;
        }
    }
    Ok(())
}
