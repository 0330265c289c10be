use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use fluxaudit_contracts::FLUXAUDIT_AUDIT_REPORT_SCHEMA_VERSION;
use fluxaudit_core::audit::CheckStatus;
use fluxaudit_core::{audit_archive, Archive, AuditReport};

use crate::report;

#[derive(Debug, Clone, Args)]
pub struct AuditArgs {
    /// Run archive to audit (directory or zip).
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// fluxaudit.config@0.1.0 document overriding artifact names and fields.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the full report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Also fail when a check could not be evaluated.
    #[arg(long)]
    pub fail_on_unknown: bool,
}

pub fn cmd_audit(args: AuditArgs) -> Result<ExitCode> {
    let cfg = crate::load_config(args.config.as_deref())?;
    let archive = Archive::open(&args.archive)
        .with_context(|| format!("load archive: {}", args.archive.display()))?;
    let audit = audit_archive(&archive, &cfg.audit)?;

    if args.json {
        report::print_json(FLUXAUDIT_AUDIT_REPORT_SCHEMA_VERSION, &audit)?;
    } else {
        render_text(&audit);
    }

    let failed = !audit.is_clean() || (args.fail_on_unknown && audit.has_unknown());
    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn render_text(audit: &AuditReport) {
    println!("archive: {}", audit.archive);
    for a in &audit.artifacts {
        match (&a.path, &a.parse_error) {
            (Some(p), None) => println!("  {}: {p}", a.role.as_str()),
            (Some(p), Some(e)) => println!("  {}: {p} (unparsable: {e})", a.role.as_str()),
            (None, _) => println!("  {}: not found", a.role.as_str()),
        }
    }

    println!();
    for c in &audit.checks {
        let status = match c.status {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Unknown => "UNKNOWN",
        };
        match &c.note {
            Some(note) => println!("{status:<8}{} ({note})", c.check.as_str()),
            None => println!("{status:<8}{}", c.check.as_str()),
        }
    }

    if !audit.violations.is_empty() {
        println!("\nviolations:");
        for v in &audit.violations {
            println!("  [{}] {}", v.kind.as_str(), v.message);
            for p in &v.paths {
                println!("      at {p}");
            }
        }
    }

    println!();
    if audit.is_clean() {
        println!("result: clean");
    } else {
        println!("result: {} violation(s)", audit.violations.len());
    }
}
