//! Reshaping of mail-quota report CSVs.
//!
//! The quota export carries one `context<N>` column per OX context and the
//! numeric user id somewhere in the middle of the row. The reshaped file
//! drops the context columns and moves every all-digit field to the front.

use std::sync::LazyLock;

use regex::Regex;

use crate::csv::{self, Record};
use crate::error::CoreError;

/// Fields matching this pattern are removed entirely.
pub const CONTEXT_COLUMN_PATTERN: &str = r"^context\d+$";

static CONTEXT_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(CONTEXT_COLUMN_PATTERN).expect("valid regex"));

/// Fields matching this pattern are moved to the front. `\d` is any Unicode
/// decimal digit, as in [`CONTEXT_COLUMN_PATTERN`].
pub const NUMERIC_FIELD_PATTERN: &str = r"^\d+$";

static NUMERIC_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NUMERIC_FIELD_PATTERN).expect("valid regex"));

/// How a single field is treated by [`reshape_row`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    /// `context<digits>`; dropped.
    Context,
    /// Non-empty and decimal digits only, any script; moved to the front.
    Numeric,
    /// Everything else; kept in relative order after the numeric fields.
    Other,
}

pub fn classify_field(field: &str) -> FieldClass {
    if CONTEXT_COLUMN_RE.is_match(field) {
        FieldClass::Context
    } else if NUMERIC_FIELD_RE.is_match(field) {
        FieldClass::Numeric
    } else {
        FieldClass::Other
    }
}

/// Reshape one row.
///
/// Each numeric field is inserted at index 0 as it is encountered, so
/// several numeric fields end up at the front in reverse encounter order.
pub fn reshape_row<S: AsRef<str>>(row: &[S]) -> Record {
    let mut out: Record = Vec::with_capacity(row.len());
    for field in row {
        let field = field.as_ref();
        match classify_field(field) {
            FieldClass::Context => continue,
            FieldClass::Numeric => out.insert(0, field.to_string()),
            FieldClass::Other => out.push(field.to_string()),
        }
    }
    out
}

/// Reshape every row of a CSV document and return the rewritten document.
pub fn reshape_csv(input: &str) -> Result<String, CoreError> {
    let records = csv::parse_records(input)?;
    let reshaped: Vec<Record> = records.iter().map(|r| reshape_row(r)).collect();

    let dropped: usize = records
        .iter()
        .zip(&reshaped)
        .map(|(before, after)| before.len() - after.len())
        .sum();
    tracing::debug!(rows = records.len(), dropped, "Reshaped quota CSV");

    Ok(csv::format_records(&reshaped))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
