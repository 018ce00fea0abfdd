use crate::config::EntityConfig;
use crate::domain::EntityKind;
use crate::report::{FlagKind, RunReport};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::info;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Standardizes the configured text, phone, email, and date fields of a raw
/// record set in place. Values that cannot be standardized are flagged and
/// either retained as-is (phone, email) or coerced to null (dates).
/// Identifiers and reference fields are never part of the role mappings.
pub fn standardize_rows(
    kind: EntityKind,
    cfg: &EntityConfig,
    rows: &mut [Map<String, Value>],
    report: &mut RunReport,
) {
    let flags_before = report.flags.len();

    for row in rows.iter_mut() {
        let record_id = row
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        for field in &cfg.text_fields {
            if let Some(Value::String(s)) = row.get(field) {
                let standardized = title_case(s);
                row.insert(field.clone(), Value::String(standardized));
            }
        }

        for field in &cfg.phone_fields {
            if let Some(Value::String(s)) = row.get(field) {
                match canonical_phone(s) {
                    Some(phone) => {
                        row.insert(field.clone(), Value::String(phone));
                    }
                    None => {
                        report.flag(
                            kind,
                            record_id.clone(),
                            field,
                            FlagKind::InvalidPhone,
                            format!("'{}' does not reduce to a valid digit count", s.trim()),
                        );
                    }
                }
            }
        }

        for field in &cfg.email_fields {
            if let Some(Value::String(s)) = row.get(field) {
                let email = s.trim().to_lowercase();
                if !EMAIL_RE.is_match(&email) {
                    report.flag(
                        kind,
                        record_id.clone(),
                        field,
                        FlagKind::InvalidEmail,
                        format!("'{}' fails the address-shape check", email),
                    );
                }
                row.insert(field.clone(), Value::String(email));
            }
        }

        for field in &cfg.date_fields {
            if let Some(Value::String(s)) = row.get(field) {
                match canonical_date(s) {
                    Some(date) => {
                        row.insert(field.clone(), Value::String(date));
                    }
                    None => {
                        // Coerce to the missing marker rather than failing the run
                        report.flag(
                            kind,
                            record_id.clone(),
                            field,
                            FlagKind::UnparsableDate,
                            format!("'{}' does not match {} or {}", s.trim(), DATETIME_FORMAT, DATE_FORMAT),
                        );
                        row.insert(field.clone(), Value::Null);
                    }
                }
            }
        }
    }

    info!(
        "Standardized {} {} records ({} new flags)",
        rows.len(),
        kind,
        report.flags.len() - flags_before
    );
}

/// Trim, lowercase, then title-case word by word ("  john DOE " -> "John Doe")
pub fn title_case(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonicalizes a phone number to `+1-XXX-XXX-XXXX`. Accepts any formatting
/// that strips down to 10 digits, or 11 digits with a leading country code 1.
/// Returns None when the digit count is invalid.
pub fn canonical_phone(s: &str) -> Option<String> {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();

    let national = match digits.len() {
        10 => &digits[..],
        11 if digits.starts_with('1') => &digits[1..],
        _ => return None,
    };

    Some(format!(
        "+1-{}-{}-{}",
        &national[0..3],
        &national[3..6],
        &national[6..10]
    ))
}

/// Parses a date or timestamp from the fixed formats and re-emits it in
/// canonical form, preserving whether a time component was present.
pub fn canonical_date(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT) {
        return Some(dt.format(DATETIME_FORMAT).to_string());
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Some(d.format(DATE_FORMAT).to_string());
    }
    None
}
