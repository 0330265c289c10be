use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use globset::{Glob, GlobSet, GlobSetBuilder};

use fluxaudit_contracts::FLUXAUDIT_COMPARE_REPORT_SCHEMA_VERSION;
use fluxaudit_core::diff::{ChangeDetail, ChangedFile, ContentDiffEntry, NumericDiffEntry};
use fluxaudit_core::{diff_archives, Archive, DiffOptions, DiffReport, NumericReportPolicy};

use crate::report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab_case")]
pub enum NumericMode {
    Unequal,
    All,
}

impl From<NumericMode> for NumericReportPolicy {
    fn from(m: NumericMode) -> Self {
        match m {
            NumericMode::Unequal => NumericReportPolicy::Unequal,
            NumericMode::All => NumericReportPolicy::All,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CompareArgs {
    /// Baseline run (directory or zip).
    #[arg(value_name = "A")]
    pub a: PathBuf,

    /// Candidate run (directory or zip).
    #[arg(value_name = "B")]
    pub b: PathBuf,

    /// Print the full report as JSON (never truncated).
    #[arg(long)]
    pub json: bool,

    /// Absolute tolerance below which numeric differences are not reported.
    #[arg(long, value_name = "F", default_value_t = 0.0)]
    pub atol: f64,

    /// Which numeric leaves to report.
    #[arg(long, value_enum, default_value_t = NumericMode::Unequal)]
    pub numeric: NumericMode,

    /// Drop paths matching GLOB from both archives (repeatable).
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Max paths listed per section in text output.
    #[arg(long, value_name = "N", default_value_t = 50)]
    pub max_listed: usize,

    /// Max numeric entries shown per changed file in text output.
    #[arg(long, value_name = "N", default_value_t = 20)]
    pub max_numeric: usize,
}

pub fn cmd_compare(args: CompareArgs) -> Result<ExitCode> {
    if args.atol.is_nan() || args.atol < 0.0 {
        anyhow::bail!("--atol must be a non-negative number (got {})", args.atol);
    }
    let exclude = build_exclude(&args.exclude)?;
    let a = Archive::open_filtered(&args.a, exclude.as_ref())
        .with_context(|| format!("load archive A: {}", args.a.display()))?;
    let b = Archive::open_filtered(&args.b, exclude.as_ref())
        .with_context(|| format!("load archive B: {}", args.b.display()))?;

    let opts = DiffOptions {
        numeric_policy: args.numeric.into(),
        atol: args.atol,
    };
    let diff = diff_archives(&a, &b, &opts);

    if args.json {
        report::print_json(FLUXAUDIT_COMPARE_REPORT_SCHEMA_VERSION, &diff)?;
    } else {
        render_text(&diff, &args);
    }

    Ok(if diff.is_identical() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn build_exclude(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for pat in patterns {
        b.add(Glob::new(pat).with_context(|| format!("invalid --exclude glob: {pat:?}"))?);
    }
    Ok(Some(b.build().context("build --exclude globset")?))
}

fn render_text(diff: &DiffReport, args: &CompareArgs) {
    println!("A: {}", diff.a);
    println!("B: {}", diff.b);
    println!(
        "files: {} common, {} only in A, {} only in B, {} changed",
        diff.common.len(),
        diff.only_in_a.len(),
        diff.only_in_b.len(),
        diff.changed.len()
    );

    if !diff.only_in_a.is_empty() {
        println!("\nonly in A:");
        report::print_capped("  ", diff.only_in_a.iter(), args.max_listed);
    }
    if !diff.only_in_b.is_empty() {
        println!("\nonly in B:");
        report::print_capped("  ", diff.only_in_b.iter(), args.max_listed);
    }
    if !diff.changed.is_empty() {
        println!("\nchanged:");
        let shown = diff.changed.len().min(args.max_listed);
        for file in &diff.changed[..shown] {
            render_changed(file, args.max_numeric);
        }
        if diff.changed.len() > shown {
            println!("  ... ({} more)", diff.changed.len() - shown);
        }
    }

    println!();
    if diff.is_identical() {
        println!("result: identical");
    } else {
        println!(
            "result: different ({} numeric differences)",
            diff.numeric_entry_count()
        );
    }
}

fn render_changed(file: &ChangedFile, max_numeric: usize) {
    println!("  {}", file.path);
    println!(
        "    sha256 {} -> {}",
        short_hash(&file.a_sha256_hex),
        short_hash(&file.b_sha256_hex)
    );
    let entries = match &file.detail {
        ChangeDetail::Opaque { reason } => {
            println!("    opaque: {reason}");
            return;
        }
        ChangeDetail::Json { entries } => entries,
    };

    let mut numeric: Vec<&NumericDiffEntry> =
        entries.iter().filter_map(ContentDiffEntry::as_numeric).collect();
    numeric.sort_by(|x, y| y.abs_diff.total_cmp(&x.abs_diff));
    report::print_capped(
        "    ",
        numeric.iter().map(|n| {
            format!(
                "{}: {} -> {} (abs {:e}, rel {:e})",
                display_path(&n.path.to_string()),
                n.a,
                n.b,
                n.abs_diff,
                n.rel_diff
            )
        }),
        max_numeric,
    );

    for entry in entries {
        match entry {
            ContentDiffEntry::Numeric(_) => {}
            ContentDiffEntry::Structural {
                path,
                mismatch,
                a_type,
                b_type,
            } => println!(
                "    {}: {} ({} vs {})",
                display_path(&path.to_string()),
                mismatch.as_str(),
                a_type.unwrap_or("-"),
                b_type.unwrap_or("-")
            ),
            ContentDiffEntry::Value { path, a, b } => {
                println!("    {}: {a} -> {b}", display_path(&path.to_string()))
            }
        }
    }
}

fn display_path(p: &str) -> &str {
    if p.is_empty() {
        "(root)"
    } else {
        p
    }
}

fn short_hash(h: &str) -> &str {
    h.get(..12).unwrap_or(h)
}
