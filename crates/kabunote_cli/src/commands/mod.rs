//! Command handlers.

pub mod accounts;
pub mod tags;

use crate::Command;
use anyhow::{anyhow, Context};
use kabunote_core::repo::account_repo::{AccountRepository, SqliteAccountRepository};
use kabunote_core::UserId;
use rusqlite::Connection;
use std::io::{BufRead, Write};

pub fn execute(
    conn: &Connection,
    command: Command,
    out: &mut dyn Write,
    input: &mut dyn BufRead,
) -> anyhow::Result<()> {
    match command {
        Command::CreateDemoUser {
            users,
            with_admin,
            force,
        } => accounts::create_demo_user(conn, users, with_admin, force, out),
        Command::CreateSampleData => accounts::create_sample_data(conn, out),
        Command::FixDuplicateProfiles { dry_run } => {
            accounts::fix_duplicate_profiles(conn, dry_run, out)
        }
        Command::ManageTags { user, action } => {
            let user_id = user
                .as_deref()
                .map(|username| resolve_user(conn, username))
                .transpose()?;
            tags::execute(conn, user_id, action, out, input)
        }
        Command::Recount => accounts::recount(conn, out),
    }
}

/// Looks a username (or email) up; unknown names are an error.
pub fn resolve_user(conn: &Connection, username: &str) -> anyhow::Result<UserId> {
    let accounts = SqliteAccountRepository::try_new(conn)?;
    accounts
        .find_user_by_login(username)?
        .map(|user| user.id)
        .ok_or_else(|| anyhow!("user not found: {username}"))
}

/// Reads a y/N answer; anything but `y`/`yes` declines.
pub fn confirm(prompt: &str, out: &mut dyn Write, input: &mut dyn BufRead) -> anyhow::Result<bool> {
    write!(out, "{prompt} [y/N]: ")?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer).context("read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[cfg(test)]
mod tests {
    use super::confirm;
    use std::io::Cursor;

    #[test]
    fn confirm_accepts_only_yes() {
        for (answer, expected) in [("y\n", true), ("YES\n", true), ("\n", false), ("no\n", false)] {
            let mut out = Vec::new();
            let mut input = Cursor::new(answer.as_bytes());
            assert_eq!(confirm("Proceed?", &mut out, &mut input).unwrap(), expected);
            assert_eq!(String::from_utf8(out).unwrap(), "Proceed? [y/N]: ");
        }
    }
}
