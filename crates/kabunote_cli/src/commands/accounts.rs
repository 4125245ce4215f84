//! Account provisioning and counter repair commands.

use anyhow::bail;
use kabunote_core::service::demo::{self, DemoOptions};
use kabunote_core::service::maintenance;
use rusqlite::Connection;
use std::io::Write;

pub fn create_demo_user(
    conn: &Connection,
    users: u32,
    with_admin: bool,
    force: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if users == 0 {
        bail!("--users must be at least 1");
    }
    let report = demo::create_demo_users(
        conn,
        &DemoOptions {
            users,
            with_admin,
            force,
        },
    )?;
    if report.skipped_existing {
        writeln!(
            out,
            "Users already exist; nothing created. Pass --force to add demo users anyway."
        )?;
        return Ok(());
    }

    for username in &report.existing {
        writeln!(out, "User {username} already exists, skipped.")?;
    }
    if report.created.is_empty() {
        writeln!(out, "No demo users created.")?;
        return Ok(());
    }
    writeln!(out, "Created {} demo user(s):", report.created.len())?;
    for account in &report.created {
        let role = if account.is_admin { "admin" } else { "user" };
        writeln!(
            out,
            "  {} <{}> password={} role={role} experience={} style={}",
            account.username,
            account.email,
            account.password,
            account.experience.as_str(),
            account.style.as_str()
        )?;
    }
    Ok(())
}

pub fn create_sample_data(conn: &Connection, out: &mut dyn Write) -> anyhow::Result<()> {
    let report = demo::create_sample_data(conn)?;
    if report.user_created {
        writeln!(
            out,
            "Created user {} (password: {}).",
            demo::SAMPLE_USERNAME,
            demo::SAMPLE_PASSWORD
        )?;
    }
    writeln!(
        out,
        "Sample data ready: {} tag(s), {} notebook(s), {} entr(y/ies) created.",
        report.tags_created, report.notebooks_created, report.entries_created
    )?;
    Ok(())
}

pub fn fix_duplicate_profiles(
    conn: &Connection,
    dry_run: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let report = maintenance::fix_duplicate_profiles(conn, dry_run)?;
    if dry_run {
        writeln!(out, "Dry run: no changes written.")?;
    }
    writeln!(out, "Users checked: {}", report.users_checked)?;
    if report.is_clean() {
        writeln!(out, "No duplicate or missing profile/settings rows.")?;
        return Ok(());
    }
    writeln!(out, "Duplicate profiles: {}", report.duplicate_profiles)?;
    writeln!(out, "Duplicate settings: {}", report.duplicate_settings)?;
    writeln!(out, "Missing profiles: {}", report.missing_profiles)?;
    writeln!(out, "Missing settings: {}", report.missing_settings)?;
    Ok(())
}

pub fn recount(conn: &Connection, out: &mut dyn Write) -> anyhow::Result<()> {
    let report = maintenance::recount_all(conn)?;
    writeln!(
        out,
        "Recounted notebooks={} sub_notebooks={} tags={} profiles={}",
        report.notebooks, report.sub_notebooks, report.tags, report.profiles
    )?;
    Ok(())
}
