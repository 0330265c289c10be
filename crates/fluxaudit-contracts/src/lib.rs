//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O, and for the default artifact field names the
//! target tool writes.

pub const FLUXAUDIT_CONFIG_SCHEMA_VERSION: &str = "fluxaudit.config@0.1.0";

pub const FLUXAUDIT_COMPARE_REPORT_SCHEMA_VERSION: &str = "fluxaudit.compare.report@0.1.0";
pub const FLUXAUDIT_AUDIT_REPORT_SCHEMA_VERSION: &str = "fluxaudit.audit.report@0.1.0";
pub const FLUXAUDIT_PATCH_REPORT_SCHEMA_VERSION: &str = "fluxaudit.patch.report@0.1.0";
pub const FLUXAUDIT_REPAIR_REPORT_SCHEMA_VERSION: &str = "fluxaudit.repair.report@0.1.0";

pub const SUMMARY_FILE_NAME: &str = "fluxguard_summary.json";
pub const MARK_FILE_NAME: &str = "voidmark_mark.json";

pub const GENERATED_AT_KEY: &str = "generated_at_utc";
pub const SEED_EFFECTIVE_KEY: &str = "seed_effective";

/// Value the target tool writes when its timestamp was never captured.
pub const EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// Decimal digits kept by float quantization.
pub const QUANTIZE_DIGITS: u32 = 12;
