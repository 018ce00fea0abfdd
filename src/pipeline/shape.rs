use crate::domain::{Activity, Company, Contact, EntityKind, Opportunity};
use crate::pipeline::standardize::{DATETIME_FORMAT, DATE_FORMAT};
use crate::report::{FlagKind, RunReport};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// Converts standardized raw rows into typed records. Rows without an id are
/// dropped and flagged; field-level coercion failures become nulls plus flags.
/// References pass through untouched.
pub fn shape_companies(rows: &[Map<String, Value>], report: &mut RunReport) -> Vec<Company> {
    rows.iter()
        .filter_map(|row| {
            let id = require_id(row, EntityKind::Company, report)?;
            Some(Company {
                name: get_string(row, "name"),
                domain: get_string(row, "domain"),
                industry: get_string(row, "industry"),
                size: get_string(row, "size"),
                country: get_string(row, "country"),
                created_date: get_datetime(row, "created_date"),
                is_customer: get_bool(row, "is_customer", EntityKind::Company, &id, report),
                annual_revenue: get_f64(row, "annual_revenue", EntityKind::Company, &id, report),
                id,
            })
        })
        .collect()
}

pub fn shape_contacts(rows: &[Map<String, Value>], report: &mut RunReport) -> Vec<Contact> {
    rows.iter()
        .filter_map(|row| {
            let id = require_id(row, EntityKind::Contact, report)?;
            Some(Contact {
                first_name: get_string(row, "first_name"),
                last_name: get_string(row, "last_name"),
                email: get_string(row, "email"),
                phone: get_opt_string(row, "phone"),
                title: get_string(row, "title"),
                status: get_string(row, "status"),
                company_id: get_opt_string(row, "company_id"),
                created_date: get_datetime(row, "created_date"),
                last_modified: get_datetime(row, "last_modified"),
                id,
            })
        })
        .collect()
}

pub fn shape_opportunities(rows: &[Map<String, Value>], report: &mut RunReport) -> Vec<Opportunity> {
    rows.iter()
        .filter_map(|row| {
            let id = require_id(row, EntityKind::Opportunity, report)?;
            Some(Opportunity {
                name: get_string(row, "name"),
                contact_id: get_string(row, "contact_id"),
                company_id: get_string(row, "company_id"),
                amount: get_f64(row, "amount", EntityKind::Opportunity, &id, report),
                stage: get_string(row, "stage"),
                probability: get_f64(row, "probability", EntityKind::Opportunity, &id, report),
                created_date: get_datetime(row, "created_date"),
                close_date: get_date(row, "close_date"),
                is_closed: get_bool(row, "is_closed", EntityKind::Opportunity, &id, report),
                id,
            })
        })
        .collect()
}

pub fn shape_activities(rows: &[Map<String, Value>], report: &mut RunReport) -> Vec<Activity> {
    rows.iter()
        .filter_map(|row| {
            let id = require_id(row, EntityKind::Activity, report)?;
            Some(Activity {
                contact_id: get_opt_string(row, "contact_id"),
                opportunity_id: get_opt_string(row, "opportunity_id"),
                activity_type: get_string(row, "type"),
                subject: get_string(row, "subject"),
                timestamp: get_datetime(row, "timestamp"),
                duration_minutes: get_i64(row, "duration_minutes", EntityKind::Activity, &id, report),
                outcome: get_string(row, "outcome"),
                notes: get_string(row, "notes"),
                id,
            })
        })
        .collect()
}

fn require_id(
    row: &Map<String, Value>,
    kind: EntityKind,
    report: &mut RunReport,
) -> Option<String> {
    match get_opt_string(row, "id") {
        Some(id) => Some(id),
        None => {
            report.flag(
                kind,
                None,
                "id",
                FlagKind::MissingId,
                "record has no id and cannot be loaded".to_string(),
            );
            None
        }
    }
}

fn get_string(row: &Map<String, Value>, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn get_opt_string(row: &Map<String, Value>, key: &str) -> Option<String> {
    let s = get_string(row, key);
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn get_datetime(row: &Map<String, Value>, key: &str) -> Option<NaiveDateTime> {
    let s = get_opt_string(row, key)?;
    NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(&s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn get_date(row: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    let s = get_opt_string(row, key)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT)
                .ok()
                .map(|dt| dt.date())
        })
}

fn get_f64(
    row: &Map<String, Value>,
    key: &str,
    kind: EntityKind,
    id: &str,
    report: &mut RunReport,
) -> Option<f64> {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if !s.trim().is_empty() => match s.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                flag_unparsable(report, kind, id, key, s);
                None
            }
        },
        _ => None,
    }
}

fn get_i64(
    row: &Map<String, Value>,
    key: &str,
    kind: EntityKind,
    id: &str,
    report: &mut RunReport,
) -> Option<i64> {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) if !s.trim().is_empty() => match s.trim().parse::<i64>() {
            Ok(v) => Some(v),
            Err(_) => {
                flag_unparsable(report, kind, id, key, s);
                None
            }
        },
        _ => None,
    }
}

fn get_bool(
    row: &Map<String, Value>,
    key: &str,
    kind: EntityKind,
    id: &str,
    report: &mut RunReport,
) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" | "" => false,
            _ => {
                flag_unparsable(report, kind, id, key, s);
                false
            }
        },
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        _ => false,
    }
}

fn flag_unparsable(report: &mut RunReport, kind: EntityKind, id: &str, key: &str, value: &str) {
    report.flag(
        kind,
        Some(id.to_string()),
        key,
        FlagKind::UnparsableValue,
        format!("'{}' could not be coerced", value.trim()),
    );
}
