//! The anti-pattern table.
//!
//! Each [`Pattern`] pairs a matcher with a rewrite over the whole file text.
//! The scan loop in `patch/mod.rs` only walks [`PATTERNS`]; adding a pattern
//! means adding a row here.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

use fluxaudit_contracts::EPOCH_TIMESTAMP;

use super::PatchOptions;
use crate::config::PatchConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternId {
    EpochTimestamp,
    SeedPropagation,
    FloatQuantize,
}

impl PatternId {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternId::EpochTimestamp => "epoch-timestamp",
            PatternId::SeedPropagation => "seed-propagation",
            PatternId::FloatQuantize => "float-quantize",
        }
    }
}

pub(crate) struct Pattern {
    pub id: PatternId,
    pub description: &'static str,
    pub enabled: fn(&PatchOptions) -> bool,
    pub rewrite: fn(&str, &Matchers) -> Rewrite,
}

pub(crate) struct Rewrite {
    pub text: String,
    pub count: usize,
}

impl Rewrite {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            count: 0,
        }
    }
}

pub(crate) const PATTERNS: &[Pattern] = &[
    Pattern {
        id: PatternId::EpochTimestamp,
        description: "generated-at assigned an epoch constant; use utc_now_iso()",
        enabled: always,
        rewrite: rewrite_epoch_timestamp,
    },
    Pattern {
        id: PatternId::SeedPropagation,
        description: "effective seed derived but missing from artifact payload; wire it through",
        enabled: always,
        rewrite: rewrite_seed_propagation,
    },
    Pattern {
        id: PatternId::FloatQuantize,
        description: "json.dump(s) of artifact payload; round float leaves first",
        enabled: quantize_enabled,
        rewrite: rewrite_float_quantize,
    },
];

fn always(_: &PatchOptions) -> bool {
    true
}

fn quantize_enabled(opts: &PatchOptions) -> bool {
    opts.quantize_floats
}

const UTC_HELPER_NAME: &str = "utc_now_iso";
const QUANTIZE_HELPER_NAME: &str = "quantize_floats";

const UTC_HELPER: &str = r#"import datetime as _dt


def utc_now_iso():
    return (
        _dt.datetime.now(_dt.timezone.utc)
        .replace(microsecond=0)
        .isoformat()
        .replace("+00:00", "Z")
    )
"#;

/// Regexes compiled once per run from the configured field names.
pub(crate) struct Matchers {
    epoch_assign: Regex,
    import_block: Regex,
    seed_derivation: Regex,
    seed_payload_openers: Vec<Regex>,
    seed_key_literal: Regex,
    seed_key: String,
    json_dump_call: Regex,
    quantize_digits: u32,
}

impl Matchers {
    pub(crate) fn new(cfg: &PatchConfig) -> Result<Self> {
        let key = regex::escape(&cfg.generated_at_key);
        let epoch = regex::escape(EPOCH_TIMESTAMP);
        let target = format!(
            r#"(\b{key}[ \t]*=[ \t]*|["']{key}["'][ \t]*:[ \t]*|\[[ \t]*["']{key}["'][ \t]*\][ \t]*=[ \t]*)"#
        );
        let epoch_value = format!(
            r#"(?:["']{epoch}["']|(?:datetime\.)?datetime\.(?:utc)?fromtimestamp\([ \t]*0(?:\.0)?[ \t]*(?:,[^)]*)?\)(?:\.isoformat\(\))?)"#
        );
        let epoch_assign = Regex::new(&format!("{target}{epoch_value}"))
            .context("compile epoch-timestamp matcher")?;

        let names = cfg
            .seed_derivation_names
            .iter()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");
        let seed_derivation = Regex::new(&format!(r"(?m)^[ \t]*({names})[ \t]*=[^=]"))
            .context("compile seed derivation matcher")?;

        let mut seed_payload_openers = Vec::new();
        for opener in &cfg.seed_payload_openers {
            seed_payload_openers.push(
                Regex::new(&opener_regex(opener))
                    .with_context(|| format!("compile payload opener {opener:?}"))?,
            );
        }
        let seed_key_literal = Regex::new(&format!(r#"["']{}["']"#, regex::escape(&cfg.seed_key)))
            .context("compile seed key matcher")?;

        Ok(Self {
            epoch_assign,
            import_block: Regex::new(r"(?m)^(?:(?:import|from)[ \t]+[^\n]*\n)+")
                .context("compile import block matcher")?,
            seed_derivation,
            seed_payload_openers,
            seed_key_literal,
            seed_key: cfg.seed_key.clone(),
            json_dump_call: Regex::new(r"\bjson\.dumps?\(").context("compile json.dump matcher")?,
            quantize_digits: cfg.quantize_digits,
        })
    }

    /// Inserts `helper` after the first import block, or after any leading
    /// comment lines when the file has no imports.
    fn insert_helper(&self, text: &str, helper: &str) -> String {
        let at = match self.import_block.find(text) {
            Some(m) => m.end(),
            None => leading_comment_end(text),
        };
        let mut out = String::with_capacity(text.len() + helper.len() + 4);
        out.push_str(&text[..at]);
        if at > 0 && !text[..at].ends_with('\n') {
            out.push('\n');
        }
        out.push_str("\n\n");
        out.push_str(helper);
        out.push_str("\n\n");
        out.push_str(&text[at..]);
        out
    }
}

fn has_def(text: &str, name: &str) -> bool {
    text.contains(&format!("def {name}("))
}

fn leading_comment_end(text: &str) -> usize {
    let mut at = 0;
    for line in text.split_inclusive('\n') {
        if !line.trim_start().starts_with('#') {
            break;
        }
        at += line.len();
    }
    at
}

/// Builds a matcher for a dict-literal opener such as `"voidmark": {`,
/// tolerating any whitespace around `:`, `=` and `{`.
fn opener_regex(opener: &str) -> String {
    let mut out = String::new();
    if opener.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_') {
        out.push_str(r"\b");
    }
    for (i, tok) in opener.split_whitespace().enumerate() {
        if i > 0 {
            out.push_str(r"\s*");
        }
        for c in tok.chars() {
            let lit = regex::escape(&c.to_string());
            if matches!(c, ':' | '=' | '{') {
                out.push_str(r"\s*");
                out.push_str(&lit);
                out.push_str(r"\s*");
            } else {
                out.push_str(&lit);
            }
        }
    }
    out
}

fn rewrite_epoch_timestamp(text: &str, m: &Matchers) -> Rewrite {
    let count = m.epoch_assign.find_iter(text).count();
    if count == 0 {
        return Rewrite::unchanged(text);
    }
    let replaced = m
        .epoch_assign
        .replace_all(text, format!("${{1}}{UTC_HELPER_NAME}()").as_str())
        .into_owned();
    let text = if has_def(&replaced, UTC_HELPER_NAME) {
        replaced
    } else {
        m.insert_helper(&replaced, UTC_HELPER.trim_end())
    };
    Rewrite { text, count }
}

fn rewrite_seed_propagation(text: &str, m: &Matchers) -> Rewrite {
    let Some(derivation) = m.seed_derivation.captures(text) else {
        return Rewrite::unchanged(text);
    };
    let (Some(whole), Some(var)) = (derivation.get(0), derivation.get(1)) else {
        return Rewrite::unchanged(text);
    };

    let mut inserts: Vec<(usize, String)> = Vec::new();
    for opener in &m.seed_payload_openers {
        for found in opener.find_iter(text) {
            if found.start() < whole.end() {
                continue;
            }
            let Some(brace) = text[found.start()..found.end()].rfind('{') else {
                continue;
            };
            let open_at = found.start() + brace;
            let close_at = matching_brace(text, open_at).unwrap_or(text.len());
            if m.seed_key_literal.is_match(&text[open_at..close_at]) {
                continue;
            }
            let indent = line_indent(text, found.start());
            inserts.push((
                open_at + 1,
                format!("\n{indent}    \"{}\": {},", m.seed_key, var.as_str()),
            ));
        }
    }
    if inserts.is_empty() {
        return Rewrite::unchanged(text);
    }

    inserts.sort_by(|a, b| b.0.cmp(&a.0));
    inserts.dedup_by_key(|(at, _)| *at);
    let count = inserts.len();
    let mut out = text.to_string();
    for (at, ins) in inserts {
        out.insert_str(at, &ins);
    }
    Rewrite { text: out, count }
}

fn rewrite_float_quantize(text: &str, m: &Matchers) -> Rewrite {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    // End of the last first-argument seen, wrapped or not. Calls nested inside
    // it are already covered by the outer quantize_floats.
    let mut covered_until = 0usize;
    for call in m.json_dump_call.find_iter(text) {
        if call.start() < covered_until {
            continue;
        }
        let rest = &text[call.end()..];
        let lead = rest.len() - rest.trim_start().len();
        let arg_start = call.end() + lead;
        let Some(arg_end) = first_arg_end(text, arg_start) else {
            continue;
        };
        covered_until = arg_end;
        if text[arg_start..].starts_with(&format!("{QUANTIZE_HELPER_NAME}(")) {
            continue;
        }
        let arg = text[arg_start..arg_end].trim_end();
        if arg.is_empty() {
            continue;
        }
        spans.push((arg_start, arg_start + arg.len()));
    }
    if spans.is_empty() {
        return Rewrite::unchanged(text);
    }

    let count = spans.len();
    let mut out = text.to_string();
    for (start, end) in spans.into_iter().rev() {
        out.insert(end, ')');
        out.insert_str(start, &format!("{QUANTIZE_HELPER_NAME}("));
    }
    if !has_def(&out, QUANTIZE_HELPER_NAME) {
        out = m.insert_helper(&out, &quantize_helper(m.quantize_digits));
    }
    Rewrite { text: out, count }
}

fn quantize_helper(digits: u32) -> String {
    format!(
        r#"def {QUANTIZE_HELPER_NAME}(obj, ndigits={digits}):
    if isinstance(obj, float):
        return round(obj, ndigits)
    if isinstance(obj, dict):
        return {{k: {QUANTIZE_HELPER_NAME}(v, ndigits) for k, v in obj.items()}}
    if isinstance(obj, (list, tuple)):
        return [{QUANTIZE_HELPER_NAME}(v, ndigits) for v in obj]
    return obj"#
    )
}

fn line_indent(text: &str, at: usize) -> &str {
    let line_start = text[..at].rfind('\n').map_or(0, |i| i + 1);
    let line = &text[line_start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

/// Byte offset of the `}` closing the `{` at `open_at`, skipping string literals.
fn matching_brace(text: &str, open_at: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text[open_at..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open_at + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// End offset of the call argument starting at `start`: the first top-level
/// `,` or the call's closing `)`.
fn first_arg_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth > 0 => depth -= 1,
            ')' | ',' if depth == 0 => return Some(start + i),
            _ => {}
        }
    }
    None
}
