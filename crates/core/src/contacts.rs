//! Contact-card export filtering.
//!
//! Reads a vCard export (e.g. from Nextcloud Contacts), counts email
//! addresses per domain and keeps the contacts whose domain is frequent
//! enough or explicitly allow-listed. The result is the address list for
//! the school directory.

use std::collections::HashMap;

use crate::csv;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Minimum number of addresses a domain needs to be kept.
pub const DEFAULT_MIN_ADDRESSES: usize = 13;

/// Domains that are always kept regardless of their address count.
pub const DEFAULT_MANUAL_DOMAINS: &[&str] = &["dllp.schule"];

/// Header row of the generated address list.
pub const CSV_HEADER: [&str; 2] = ["Name", "Email"];

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// The two properties of a contact card the filter cares about.
///
/// `name` is the formatted name (`FN`), `email` the first `EMAIL` property.
/// Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Domain part of an email address: everything after the last `@`.
///
/// An address without `@` is its own domain.
pub fn domain_of(email: &str) -> &str {
    email.rsplit('@').next().unwrap_or(email)
}

// ---------------------------------------------------------------------------
// vCard parsing
// ---------------------------------------------------------------------------

/// Parse every top-level `VCARD` component in `text`.
///
/// Only `FN` and the first `EMAIL` are extracted. Property groups
/// (`item1.EMAIL`) and parameters (`EMAIL;TYPE=work`) are ignored, names
/// are matched case-insensitively, and folded lines are joined first.
pub fn parse_vcards(text: &str) -> Result<Vec<Contact>, CoreError> {
    let mut contacts = Vec::new();
    let mut current: Option<Contact> = None;
    let mut depth = 0usize;

    for line in unfold_lines(text) {
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, value)) = split_property(&line) else {
            continue;
        };

        match name.as_str() {
            "BEGIN" => {
                if depth == 0 {
                    if !value.eq_ignore_ascii_case("VCARD") {
                        return Err(CoreError::malformed(
                            "vCard",
                            format!("unexpected component BEGIN:{value}"),
                        ));
                    }
                    current = Some(Contact::default());
                }
                depth += 1;
            }
            "END" => {
                if depth == 0 {
                    return Err(CoreError::malformed(
                        "vCard",
                        format!("END:{value} without matching BEGIN"),
                    ));
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(contact) = current.take() {
                        contacts.push(contact);
                    }
                }
            }
            // Properties of nested components do not belong to the card.
            _ if depth != 1 => {}
            "FN" | "EMAIL" => {
                if let Some(contact) = current.as_mut() {
                    let slot = if name == "FN" {
                        &mut contact.name
                    } else {
                        &mut contact.email
                    };
                    if slot.is_none() {
                        *slot = Some(unescape_value(value));
                    }
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(CoreError::malformed(
            "vCard",
            "unexpected end of data inside a VCARD component",
        ));
    }

    Ok(contacts)
}

/// Join folded lines: a line starting with a space or tab continues the
/// previous one, minus that single leading whitespace character.
fn unfold_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        if let Some(rest) = raw.strip_prefix([' ', '\t']) {
            if let Some(previous) = lines.last_mut() {
                previous.push_str(rest);
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines
}

/// Split a content line into its upper-cased property name and raw value.
fn split_property(line: &str) -> Option<(String, &str)> {
    let (head, value) = line.split_once(':')?;
    let name = head.split(';').next().unwrap_or(head);
    let name = name.rsplit('.').next().unwrap_or(name);
    Some((name.trim().to_ascii_uppercase(), value))
}

fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Threshold and allow-list applied by [`filter_contacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactFilter {
    pub min_addresses: usize,
    pub manual_domains: Vec<String>,
}

impl Default for ContactFilter {
    fn default() -> Self {
        Self {
            min_addresses: DEFAULT_MIN_ADDRESSES,
            manual_domains: DEFAULT_MANUAL_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

impl ContactFilter {
    fn keeps(&self, domain: &str, counts: &HashMap<String, usize>) -> bool {
        counts.get(domain).copied().unwrap_or(0) >= self.min_addresses
            || self.manual_domains.iter().any(|d| d == domain)
    }
}

/// Count email addresses per domain.
///
/// Every contact with an email counts, whether or not it has a name.
pub fn count_domains(contacts: &[Contact]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for email in contacts.iter().filter_map(|c| c.email.as_deref()) {
        *counts.entry(domain_of(email).to_string()).or_insert(0) += 1;
    }
    counts
}

/// Return `(name, email)` for every contact that has both and whose
/// domain passes `filter`, in input order.
pub fn filter_contacts<'a>(contacts: &'a [Contact], filter: &ContactFilter) -> Vec<[&'a str; 2]> {
    let counts = count_domains(contacts);
    let kept: Vec<[&str; 2]> = contacts
        .iter()
        .filter_map(|c| Some([c.name.as_deref()?, c.email.as_deref()?]))
        .filter(|[_, email]| filter.keeps(domain_of(email), &counts))
        .collect();

    tracing::debug!(
        contacts = contacts.len(),
        domains = counts.len(),
        kept = kept.len(),
        "Filtered contacts by domain",
    );
    kept
}

/// Render the address list as CSV with a `Name,Email` header.
pub fn render_address_list(rows: &[[&str; 2]]) -> String {
    let mut out = csv::format_record(&CSV_HEADER);
    out.push_str(&csv::format_records(rows));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
