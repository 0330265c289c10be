use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use fluxaudit_contracts::{FLUXAUDIT_REPAIR_REPORT_SCHEMA_VERSION, QUANTIZE_DIGITS};
use fluxaudit_core::{repair_tree, RepairContext, RepairOptions, RepairReport};

use crate::report;

#[derive(Debug, Clone, Args)]
pub struct RepairArgs {
    /// Directory holding fluxguard_summary.json (or a tree of them with --recursive).
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Repair every summary found under ROOT.
    #[arg(long)]
    pub recursive: bool,

    /// Rewrite the mark document as well.
    #[arg(long)]
    pub write_mark: bool,

    #[arg(long)]
    pub quantize_floats: bool,

    /// Decimal places kept by --quantize-floats.
    #[arg(long, value_name = "N", default_value_t = QUANTIZE_DIGITS)]
    pub ndigits: u32,

    #[arg(long)]
    pub json: bool,
}

pub fn cmd_repair(args: RepairArgs) -> Result<ExitCode> {
    let cfg = crate::load_config(args.config.as_deref())?;
    let opts = RepairOptions {
        recursive: args.recursive,
        write_mark: args.write_mark,
        quantize_floats: args.quantize_floats,
        ndigits: args.ndigits,
    };
    let repaired = repair_tree(&args.root, &cfg.repair, &opts, &RepairContext::now())?;

    if args.json {
        report::print_json(FLUXAUDIT_REPAIR_REPORT_SCHEMA_VERSION, &repaired)?;
    } else {
        render_text(&repaired);
    }
    Ok(ExitCode::SUCCESS)
}

fn render_text(r: &RepairReport) {
    for a in &r.actions {
        println!("{}", a.summary);
        println!("  generated_at: {}", a.generated_at);
        match &a.seed_effective {
            Some(seed) => println!("  seed_effective: {seed}"),
            None => println!("  seed_effective: (mark seed not found)"),
        }
        if let Some(mark) = &a.mark {
            println!("  mark: {mark}");
        }
        let status = if a.summary_written { "rewritten" } else { "unchanged" };
        println!("  summary {status}");
        if a.mark_written {
            println!("  mark rewritten");
        }
        for bak in &a.backups_written {
            println!("  backup: {bak}");
        }
    }
}
