//! Operator commands for a kabunote database.
//!
//! # Responsibility
//! - Parse the `kabunote` command line and resolve settings from flags and
//!   `KABUNOTE_*` variables.
//! - Dispatch to the maintenance, demo and tag-administration operations in
//!   `kabunote_core` and print human-readable reports.
//!
//! # Invariants
//! - Commands write reports to the given writer only; logs go through `log`.
//! - Destructive tag cleanup asks for confirmation unless `--force` or
//!   `--dry-run` is given.

pub mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kabunote_core::config::{DB_PATH_VAR, ENV_VAR, LOG_LEVEL_VAR};
use kabunote_core::Settings;
use std::io::{BufRead, Write};

#[derive(Debug, Parser)]
#[command(name = "kabunote", version, about = "kabunote maintenance commands")]
pub struct Cli {
    /// SQLite database file; overrides KABUNOTE_DB_PATH.
    #[arg(long, global = true)]
    pub db: Option<String>,
    /// development, testing or production; overrides KABUNOTE_ENV.
    #[arg(long, global = true)]
    pub env: Option<String>,
    /// Overrides KABUNOTE_LOG_LEVEL.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create demo users with varied investor profiles
    CreateDemoUser {
        /// Number of demo users
        #[arg(long, default_value_t = 1)]
        users: u32,
        /// Also create the `admin` staff account
        #[arg(long)]
        with_admin: bool,
        /// Run even when users already exist
        #[arg(long)]
        force: bool,
    },
    /// Create a sample user with tags, notebooks and entries
    CreateSampleData,
    /// Remove duplicate profile/settings rows and backfill missing ones
    FixDuplicateProfiles {
        /// Report without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Tag maintenance
    ManageTags {
        /// Limit the operation to one username
        #[arg(long, global = true)]
        user: Option<String>,
        #[command(subcommand)]
        action: commands::tags::TagCommands,
    },
    /// Recompute every denormalized counter
    Recount,
}

impl Cli {
    /// Settings from the environment with command-line overrides applied.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        Settings::from_lookup(|key| {
            let flag = match key {
                DB_PATH_VAR => self.db.clone(),
                ENV_VAR => self.env.clone(),
                LOG_LEVEL_VAR => self.log_level.clone(),
                _ => None,
            };
            flag.or_else(|| std::env::var(key).ok())
        })
        .context("resolve settings")
    }
}

/// Opens the configured database and runs the parsed command.
pub fn run(cli: Cli, out: &mut dyn Write, input: &mut dyn BufRead) -> anyhow::Result<()> {
    let settings = cli.settings()?;
    let conn = settings.open_database().context("open database")?;
    commands::execute(&conn, cli.command, out, input)
}
