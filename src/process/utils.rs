use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `1,234` / `12,345,678.5` style grouping as written in NISRA exports.
static GROUPED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("valid regex"));

/// Trim whitespace, drop encoding artifacts and strip outer quotes if present.
///
/// Artifacts handled: byte-order marks and zero-width characters are removed,
/// non-breaking spaces become plain spaces, and runs of whitespace collapse to
/// a single space. Case and wording are never touched.
pub fn clean_str(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        match ch {
            '\u{feff}' | '\u{200b}' | '\u{200c}' | '\u{200d}' => {}
            c if c.is_whitespace() => pending_space = true,
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
    }
    if out.len() >= 2 && out.starts_with('"') && out.ends_with('"') {
        out[1..out.len() - 1].trim().to_string()
    } else {
        out
    }
}

/// Apply `clean_str` to a whole column.
pub fn clean_string_column<S: AsRef<str>>(column: &[S]) -> Vec<String> {
    column.iter().map(|s| clean_str(s.as_ref())).collect()
}

/// Parse one numeric cell. Non-finite values and placeholder tokens
/// (`..`, `-`, empty) are treated as non-numeric.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = clean_str(raw);
    let plain = if GROUPED_NUMBER.is_match(&cleaned) {
        cleaned.replace(',', "")
    } else {
        cleaned
    };
    plain.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Inclusive plausibility bounds for a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
}

impl ValueRange {
    pub const PERCENTAGE: ValueRange = ValueRange {
        min: 0.0,
        max: Some(100.0),
    };
    pub const NON_NEGATIVE: ValueRange = ValueRange {
        min: 0.0,
        max: None,
    };

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && self.max.map_or(true, |max| v <= max)
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        ValueRange::NON_NEGATIVE
    }
}

/// Result of coercing a column: the surviving `(row index, value)` pairs in
/// input order plus how many rows were rejected and why.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericFilter {
    pub kept: Vec<(usize, f64)>,
    pub non_numeric: usize,
    pub out_of_range: usize,
}

impl NumericFilter {
    /// Total rows excluded from the column.
    pub fn filtered(&self) -> usize {
        self.non_numeric + self.out_of_range
    }
}

/// Coerce a column to `f64`, excluding rows that fail to parse or fall outside
/// `range`. Excluded rows are counted, never substituted.
pub fn clean_numeric_column<S: AsRef<str>>(column: &[S], range: ValueRange) -> NumericFilter {
    let mut out = NumericFilter {
        kept: Vec::with_capacity(column.len()),
        ..Default::default()
    };
    for (idx, cell) in column.iter().enumerate() {
        match parse_number(cell.as_ref()) {
            Some(v) if range.contains(v) => out.kept.push((idx, v)),
            Some(_) => out.out_of_range += 1,
            None => out.non_numeric += 1,
        }
    }
    out
}
