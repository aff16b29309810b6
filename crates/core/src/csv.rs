//! Comma-separated-values codec for the spreadsheet dialect used by the
//! quota reports and contact lists.
//!
//! Comma delimiter, `"` quoting with doubled inner quotes, CRLF or LF line
//! ends on input and CRLF on output. Quoted fields may contain delimiters
//! and line breaks. A quote only opens a quoted field at the start of a
//! field; anywhere else it is kept literally.

use crate::error::CoreError;

pub const DELIMITER: char = ',';

pub const QUOTE: char = '"';

/// Line terminator written after every record.
pub const LINE_TERMINATOR: &str = "\r\n";

/// One parsed CSV row.
pub type Record = Vec<String>;

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Parse a whole CSV document into records.
///
/// An empty line yields an empty record. A trailing line break at the end
/// of the document does not produce an extra record.
pub fn parse_records(text: &str) -> Result<Vec<Record>, CoreError> {
    let mut records = Vec::new();
    let mut record: Record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut line_has_content = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    // Escaped quote.
                    field.push(QUOTE);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }

        match ch {
            QUOTE if at_field_start => {
                in_quotes = true;
                at_field_start = false;
                line_has_content = true;
            }
            DELIMITER => {
                record.push(std::mem::take(&mut field));
                at_field_start = true;
                line_has_content = true;
            }
            '\r' | '\n' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                if line_has_content {
                    record.push(std::mem::take(&mut field));
                }
                records.push(std::mem::take(&mut record));
                at_field_start = true;
                line_has_content = false;
            }
            _ => {
                field.push(ch);
                at_field_start = false;
                line_has_content = true;
            }
        }
    }

    if in_quotes {
        return Err(CoreError::malformed(
            "CSV",
            "unexpected end of data inside a quoted field",
        ));
    }

    if line_has_content {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Quote a value if it contains the delimiter, a quote, or a line break.
pub fn escape_field(value: &str) -> String {
    if value.contains(DELIMITER) || value.contains(QUOTE) || value.contains(['\r', '\n']) {
        format!("\"{}\"", value.replace(QUOTE, "\"\""))
    } else {
        value.to_string()
    }
}

/// Format one record including its line terminator.
///
/// A record holding a single empty field is written as `""` so that it
/// reads back as one field rather than as an empty line.
pub fn format_record<S: AsRef<str>>(record: &[S]) -> String {
    let mut line = if let [only] = record {
        if only.as_ref().is_empty() {
            "\"\"".to_string()
        } else {
            escape_field(only.as_ref())
        }
    } else {
        record
            .iter()
            .map(|f| escape_field(f.as_ref()))
            .collect::<Vec<_>>()
            .join(",")
    };
    line.push_str(LINE_TERMINATOR);
    line
}

/// Format a sequence of records into a CSV document.
pub fn format_records<R, S>(records: &[R]) -> String
where
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    records.iter().map(|r| format_record(r.as_ref())).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn rec(fields: &[&str]) -> Record {
        fields.iter().map(|f| f.to_string()).collect()
    }

    // -- parse_records --------------------------------------------------------

    #[test]
    fn parses_simple_rows() {
        let records = parse_records("a,b,c\n1,2,3\n").unwrap();
        assert_eq!(records, vec![rec(&["a", "b", "c"]), rec(&["1", "2", "3"])]);
    }

    #[test]
    fn accepts_crlf_and_missing_final_newline() {
        let records = parse_records("a,b\r\nc,d").unwrap();
        assert_eq!(records, vec![rec(&["a", "b"]), rec(&["c", "d"])]);
    }

    #[test]
    fn quoted_field_keeps_delimiter_quote_and_newline() {
        let records = parse_records("\"x, y\",\"say \"\"hi\"\"\",\"two\nlines\"\n").unwrap();
        assert_eq!(records, vec![rec(&["x, y", "say \"hi\"", "two\nlines"])]);
    }

    #[test]
    fn empty_line_is_empty_record() {
        let records = parse_records("a\n\nb\n").unwrap();
        assert_eq!(records, vec![rec(&["a"]), Vec::new(), rec(&["b"])]);
    }

    #[test]
    fn trailing_delimiter_yields_empty_field() {
        let records = parse_records("a,\n").unwrap();
        assert_eq!(records, vec![rec(&["a", ""])]);
    }

    #[test]
    fn quote_inside_unquoted_field_is_literal() {
        let records = parse_records("ab\"c,d\n").unwrap();
        assert_eq!(records, vec![rec(&["ab\"c", "d"])]);
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let err = parse_records("\"open,field\n").unwrap_err();
        assert_matches!(err, CoreError::Malformed { format: "CSV", .. });
    }

    #[test]
    fn empty_document_has_no_records() {
        assert!(parse_records("").unwrap().is_empty());
    }

    // -- format_record --------------------------------------------------------

    #[test]
    fn format_quotes_only_when_needed() {
        assert_eq!(
            format_record(&["plain", "with,comma", "with\"quote"]),
            "plain,\"with,comma\",\"with\"\"quote\"\r\n"
        );
    }

    #[test]
    fn format_empty_record_is_bare_line() {
        let empty: [&str; 0] = [];
        assert_eq!(format_record(&empty), "\r\n");
    }

    #[test]
    fn format_single_empty_field_is_quoted() {
        assert_eq!(format_record(&[""]), "\"\"\r\n");
        assert_eq!(parse_records("\"\"\r\n").unwrap(), vec![rec(&[""])]);
    }

    #[test]
    fn formatted_document_reads_back() {
        let records = vec![rec(&["Name", "Email"]), rec(&["Doe, Jane", "jane@example.org"])];
        let text = format_records(&records);
        assert_eq!(parse_records(&text).unwrap(), records);
    }
}
