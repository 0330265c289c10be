//! Determinism auditing for drift-analysis run artifacts.
//!
//! - [`diff`] compares two run archives (manifest, hash, JSON content).
//! - [`audit`] checks one archive against the timestamp/seed/schema invariants.
//! - [`patch`] rewrites producer source so those invariants hold on the next run.
//! - [`repair`] fixes artifacts that were already written.

pub mod archive;
pub mod audit;
pub mod config;
pub mod diff;
pub mod patch;
pub mod quantize;
pub mod repair;
pub mod util;

pub use archive::{Archive, ArchiveKind, ArtifactRecord};
pub use audit::{audit_archive, AuditReport, InvariantViolation, ViolationKind};
pub use config::{ArtifactRole, AuditConfig, Config, PatchConfig, RepairConfig};
pub use diff::{diff_archives, DiffOptions, DiffReport, NumericDiffEntry, NumericReportPolicy};
pub use patch::{patch_tree, PatchAction, PatchOptions, PatchReport};
pub use repair::{repair_tree, RepairContext, RepairOptions, RepairReport};
