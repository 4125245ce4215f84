//! `kabunote` entry point.

use clap::Parser;
use kabunote_cli::{run, Cli};
use kabunote_core::init_logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    init_logging(settings.log_level, settings.log_dir.as_deref()).map_err(anyhow::Error::msg)?;

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout().lock();
    run(cli, &mut out, &mut input)
}
