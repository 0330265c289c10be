use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fluxaudit_core::Config;

mod audit;
mod compare;
mod patch;
mod repair;
mod report;

#[derive(Parser, Debug)]
#[command(name = "fluxaudit")]
#[command(about = "Determinism auditor for fluxguard run artifacts.", long_about = None)]
#[command(version)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug). FLUXAUDIT_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Diff two run archives (directories or zip files).
    Compare(compare::CompareArgs),
    /// Check one run archive against the determinism invariants.
    Audit(audit::AuditArgs),
    /// Rewrite producer source so the invariants hold on the next run.
    Patch(patch::PatchArgs),
    /// Fix summary and mark artifacts that were already written.
    Repair(repair::RepairArgs),
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Command::Compare(args) => compare::cmd_compare(args),
        Command::Audit(args) => audit::cmd_audit(args),
        Command::Patch(args) => patch::cmd_patch(args),
        Command::Repair(args) => repair::cmd_repair(args),
    }
}

fn init_tracing(verbose: u8, log_json: bool) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("FLUXAUDIT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    let cfg = Config::load_or_default(path)?;
    if let Some(p) = path {
        tracing::info!(config = %p.display(), "loaded config");
    }
    Ok(cfg)
}
