use crate::config::EntityConfig;
use crate::domain::{EntityKind, RecordSets};
use crate::error::{EtlError, Result};
use crate::extract::RawTable;
use crate::report::{RunReport, ViolationRule};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{info, warn};

/// Checks that a source record set provides every expected column, then
/// projects the rows down to exactly those columns. A missing column is
/// fatal for the whole run.
pub fn pre_validate_source(
    kind: EntityKind,
    cfg: &EntityConfig,
    table: &RawTable,
) -> Result<Vec<Map<String, Value>>> {
    let found: HashSet<&str> = table.columns.iter().map(|c| c.as_str()).collect();
    let missing: Vec<String> = cfg
        .source_columns
        .iter()
        .filter(|c| !found.contains(c.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(EtlError::ColumnMismatch {
            entity: kind.as_str(),
            side: "source",
            missing,
        });
    }

    let expected: HashSet<&str> = cfg.source_columns.iter().map(|c| c.as_str()).collect();
    let rows = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .filter(|(k, _)| expected.contains(k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .collect();

    info!("{}: source columns validated", kind);
    Ok(rows)
}

/// Checks that a destination table exposes every expected column.
pub fn pre_validate_destination(
    kind: EntityKind,
    cfg: &EntityConfig,
    table_columns: &[String],
) -> Result<()> {
    let found: HashSet<&str> = table_columns.iter().map(|c| c.as_str()).collect();
    let missing: Vec<String> = cfg
        .table_columns
        .iter()
        .filter(|c| !found.contains(c.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(EtlError::ColumnMismatch {
            entity: kind.as_str(),
            side: "destination",
            missing,
        });
    }

    info!("{}: destination columns validated", kind);
    Ok(())
}

/// Re-checks referential integrity and opportunity date ranges over the
/// final record sets. Violating records are excluded and recorded; the run
/// fails only when the violation count exceeds `max_violations`.
///
/// Entities are checked in dependency order against the already-filtered
/// upstream sets, so a dependent of an excluded record fails its own
/// reference check and the surviving sets are referentially closed.
pub fn post_validate(
    sets: RecordSets,
    max_violations: usize,
    report: &mut RunReport,
) -> Result<RecordSets> {
    let violations_before = report.exclusions.len();

    let companies = sets.companies;
    let company_ids: HashSet<String> = companies.iter().map(|c| c.id.clone()).collect();

    let contacts: Vec<_> = sets
        .contacts
        .into_iter()
        .filter(|contact| {
            if let Some(company_id) = &contact.company_id {
                if !company_ids.contains(company_id) {
                    report.exclude(
                        EntityKind::Contact,
                        contact.id.clone(),
                        dangling("company_id", EntityKind::Company),
                    );
                    return false;
                }
            }
            true
        })
        .collect();
    let contact_ids: HashSet<String> = contacts.iter().map(|c| c.id.clone()).collect();

    let opportunities: Vec<_> = sets
        .opportunities
        .into_iter()
        .filter(|opp| {
            if let (Some(created), Some(close)) = (opp.created_date, opp.close_date) {
                if created.date() > close {
                    report.exclude(
                        EntityKind::Opportunity,
                        opp.id.clone(),
                        ViolationRule::DateRange,
                    );
                    return false;
                }
            }
            if !contact_ids.contains(&opp.contact_id) {
                report.exclude(
                    EntityKind::Opportunity,
                    opp.id.clone(),
                    dangling("contact_id", EntityKind::Contact),
                );
                return false;
            }
            if !company_ids.contains(&opp.company_id) {
                report.exclude(
                    EntityKind::Opportunity,
                    opp.id.clone(),
                    dangling("company_id", EntityKind::Company),
                );
                return false;
            }
            true
        })
        .collect();
    let opportunity_ids: HashSet<String> = opportunities.iter().map(|o| o.id.clone()).collect();

    let activities: Vec<_> = sets
        .activities
        .into_iter()
        .filter(|activity| {
            if let Some(contact_id) = &activity.contact_id {
                if !contact_ids.contains(contact_id) {
                    report.exclude(
                        EntityKind::Activity,
                        activity.id.clone(),
                        dangling("contact_id", EntityKind::Contact),
                    );
                    return false;
                }
            }
            if let Some(opportunity_id) = &activity.opportunity_id {
                if !opportunity_ids.contains(opportunity_id) {
                    report.exclude(
                        EntityKind::Activity,
                        activity.id.clone(),
                        dangling("opportunity_id", EntityKind::Opportunity),
                    );
                    return false;
                }
            }
            true
        })
        .collect();

    let violations = report.exclusions.len() - violations_before;
    if violations > 0 {
        warn!("Post-validation excluded {} records", violations);
    } else {
        info!("Post-validation passed with no violations");
    }

    if violations > max_violations {
        return Err(EtlError::ViolationThreshold {
            count: violations,
            threshold: max_violations,
        });
    }

    Ok(RecordSets {
        companies,
        contacts,
        opportunities,
        activities,
    })
}

fn dangling(field: &str, target: EntityKind) -> ViolationRule {
    ViolationRule::DanglingReference {
        field: field.to_string(),
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Activity, Company, Contact, Opportunity};
    use chrono::NaiveDate;

    fn company(id: &str) -> Company {
        Company {
            id: id.into(),
            name: format!("Company {id}"),
            domain: format!("{id}.example.com"),
            industry: String::new(),
            size: String::new(),
            country: String::new(),
            created_date: date(2023, 1, 1),
            is_customer: false,
            annual_revenue: None,
        }
    }

    fn contact(id: &str, company_id: Option<&str>) -> Contact {
        Contact {
            id: id.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: format!("{id}@example.com"),
            phone: None,
            title: String::new(),
            status: String::new(),
            company_id: company_id.map(|s| s.to_string()),
            created_date: date(2023, 1, 1),
            last_modified: None,
        }
    }

    fn opportunity(id: &str, contact_id: &str, company_id: &str) -> Opportunity {
        Opportunity {
            id: id.into(),
            name: String::new(),
            contact_id: contact_id.into(),
            company_id: company_id.into(),
            amount: None,
            stage: "Open".into(),
            probability: None,
            created_date: date(2024, 1, 1),
            close_date: Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
            is_closed: false,
        }
    }

    fn activity(id: &str, contact_id: Option<&str>, opportunity_id: Option<&str>) -> Activity {
        Activity {
            id: id.into(),
            contact_id: contact_id.map(|s| s.to_string()),
            opportunity_id: opportunity_id.map(|s| s.to_string()),
            activity_type: "call".into(),
            subject: String::new(),
            timestamp: date(2024, 2, 1),
            duration_minutes: None,
            outcome: String::new(),
            notes: String::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> Option<chrono::NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    #[test]
    fn source_mismatch_names_entity_and_missing_columns() {
        let cfg = EntityConfig {
            source: "contacts.csv".into(),
            table: "contacts".into(),
            source_columns: vec!["id".into(), "email".into(), "phone".into()],
            table_columns: vec![],
            text_fields: vec![],
            phone_fields: vec![],
            email_fields: vec![],
            date_fields: vec![],
        };
        let table = RawTable {
            columns: vec!["id".into(), "email".into()],
            rows: vec![],
        };

        let err = pre_validate_source(EntityKind::Contact, &cfg, &table).unwrap_err();
        match err {
            EtlError::ColumnMismatch { entity, side, missing } => {
                assert_eq!(entity, "contacts");
                assert_eq!(side, "source");
                assert_eq!(missing, vec!["phone".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn source_validation_projects_extra_columns_away() {
        let cfg = EntityConfig {
            source: "contacts.csv".into(),
            table: "contacts".into(),
            source_columns: vec!["id".into(), "email".into()],
            table_columns: vec![],
            text_fields: vec![],
            phone_fields: vec![],
            email_fields: vec![],
            date_fields: vec![],
        };
        let mut row = Map::new();
        row.insert("id".into(), Value::String("CT1".into()));
        row.insert("email".into(), Value::String("a@b.com".into()));
        row.insert("legacy_field".into(), Value::String("drop me".into()));
        let table = RawTable {
            columns: vec!["id".into(), "email".into(), "legacy_field".into()],
            rows: vec![row],
        };

        let rows = pre_validate_source(EntityKind::Contact, &cfg, &table).unwrap();
        assert!(!rows[0].contains_key("legacy_field"));
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn destination_mismatch_is_fatal() {
        let cfg = EntityConfig {
            source: "companies.csv".into(),
            table: "companies".into(),
            source_columns: vec![],
            table_columns: vec!["id".into(), "name".into()],
            text_fields: vec![],
            phone_fields: vec![],
            email_fields: vec![],
            date_fields: vec![],
        };

        let err =
            pre_validate_destination(EntityKind::Company, &cfg, &["id".to_string()]).unwrap_err();
        assert!(matches!(err, EtlError::ColumnMismatch { side: "destination", .. }));
    }

    #[test]
    fn excludes_dangling_references_and_their_dependents() {
        let sets = RecordSets {
            companies: vec![company("C1")],
            contacts: vec![contact("CT1", Some("C1")), contact("CT2", Some("C404"))],
            opportunities: vec![
                opportunity("O1", "CT1", "C1"),
                // References the contact that gets excluded above
                opportunity("O2", "CT2", "C1"),
            ],
            activities: vec![
                activity("A1", Some("CT1"), Some("O1")),
                activity("A2", Some("CT1"), Some("O2")),
            ],
        };
        let mut report = RunReport::new();

        let result = post_validate(sets, 25, &mut report).unwrap();

        assert_eq!(result.contacts.len(), 1);
        assert_eq!(result.opportunities.len(), 1);
        // A2 pointed at the excluded O2 and is itself excluded
        assert_eq!(result.activities.len(), 1);
        assert_eq!(report.exclusions.len(), 3);

        // Everything that survived resolves
        let contact_ids: HashSet<_> = result.contacts.iter().map(|c| c.id.as_str()).collect();
        let opp_ids: HashSet<_> = result.opportunities.iter().map(|o| o.id.as_str()).collect();
        for act in &result.activities {
            assert!(act.contact_id.as_deref().map_or(true, |id| contact_ids.contains(id)));
            assert!(act.opportunity_id.as_deref().map_or(true, |id| opp_ids.contains(id)));
        }
    }

    #[test]
    fn excludes_opportunities_with_inverted_date_ranges() {
        let mut opp = opportunity("O1", "CT1", "C1");
        opp.created_date = date(2024, 7, 1);
        opp.close_date = Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());

        let sets = RecordSets {
            companies: vec![company("C1")],
            contacts: vec![contact("CT1", None)],
            opportunities: vec![opp, opportunity("O2", "CT1", "C1")],
            activities: vec![],
        };
        let mut report = RunReport::new();

        let result = post_validate(sets, 25, &mut report).unwrap();
        assert_eq!(result.opportunities.len(), 1);
        assert_eq!(result.opportunities[0].id, "O2");
        assert_eq!(report.exclusions[0].rule, ViolationRule::DateRange);
    }

    #[test]
    fn violation_count_above_threshold_fails_the_run() {
        let sets = RecordSets {
            companies: vec![],
            contacts: vec![
                contact("CT1", Some("C404")),
                contact("CT2", Some("C404")),
                contact("CT3", Some("C404")),
            ],
            opportunities: vec![],
            activities: vec![],
        };
        let mut report = RunReport::new();

        let err = post_validate(sets, 2, &mut report).unwrap_err();
        assert!(matches!(
            err,
            EtlError::ViolationThreshold { count: 3, threshold: 2 }
        ));
    }
}
