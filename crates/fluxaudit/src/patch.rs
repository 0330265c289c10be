use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use fluxaudit_contracts::FLUXAUDIT_PATCH_REPORT_SCHEMA_VERSION;
use fluxaudit_core::{patch_tree, PatchOptions, PatchReport};

use crate::report;

#[derive(Debug, Clone, Args)]
pub struct PatchArgs {
    /// Source tree of the producing tool.
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also wrap json.dump/json.dumps payloads in a float quantizer.
    #[arg(long)]
    pub quantize_floats: bool,

    /// Report what would change without writing.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub json: bool,
}

pub fn cmd_patch(args: PatchArgs) -> Result<ExitCode> {
    let cfg = crate::load_config(args.config.as_deref())?;
    let opts = PatchOptions {
        quantize_floats: args.quantize_floats,
        dry_run: args.dry_run,
    };
    let patched = patch_tree(&args.root, &cfg.patch, &opts)?;

    if args.json {
        report::print_json(FLUXAUDIT_PATCH_REPORT_SCHEMA_VERSION, &patched)?;
    } else {
        render_text(&patched);
    }
    Ok(ExitCode::SUCCESS)
}

fn render_text(r: &PatchReport) {
    for a in r.actions.iter().filter(|a| a.applied) {
        let bak = if a.backup_written { " (backup written)" } else { "" };
        println!(
            "{}: {} x{}{bak}",
            a.file,
            a.pattern.as_str(),
            a.rewrites
        );
    }
    let verb = if r.dry_run { "would patch" } else { "patched" };
    println!(
        "{verb} {} of {} file(s), {} rewrite(s) applied",
        r.files_patched.len(),
        r.files_scanned,
        r.actions.iter().map(|a| a.rewrites).sum::<usize>()
    );
}
