use anyhow::Result;
use serde::Serialize;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    #[serde(flatten)]
    report: &'a T,
}

/// Prints `report` to stdout as pretty JSON, tagged with `schema_version`.
pub(crate) fn print_json<T: Serialize>(schema_version: &'static str, report: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(&Envelope {
        schema_version,
        report,
    })?;
    println!("{out}");
    Ok(())
}

/// Prints up to `max` items, then a `... (N more)` marker.
pub(crate) fn print_capped<I, T>(indent: &str, items: I, max: usize)
where
    I: ExactSizeIterator<Item = T>,
    T: std::fmt::Display,
{
    let total = items.len();
    for item in items.take(max) {
        println!("{indent}{item}");
    }
    if total > max {
        println!("{indent}... ({} more)", total - max);
    }
}
