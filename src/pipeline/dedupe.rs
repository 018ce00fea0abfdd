use crate::domain::{Activity, Contact, Opportunity};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct DedupSummary {
    /// Contacts discarded in favor of a retained duplicate
    pub merged: usize,
    /// Foreign keys rewritten on dependent records
    pub repointed: usize,
}

/// Collapses duplicate contacts sharing a normalized email. The retained
/// record is the one with the most recent `last_modified` (ties: most recent
/// `created_date`, then lowest id). Dependent activities and opportunities
/// referencing a discarded contact are repointed to the retained one before
/// the discarded entries are dropped, so no dangling-reference window exists.
/// Contacts with an empty email are never grouped.
pub fn dedupe_contacts(
    contacts: Vec<Contact>,
    activities: &mut [Activity],
    opportunities: &mut [Opportunity],
) -> (Vec<Contact>, DedupSummary) {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, contact) in contacts.iter().enumerate() {
        let email = contact.email.trim();
        if email.is_empty() {
            continue;
        }
        groups.entry(email).or_default().push(idx);
    }

    // Map every discarded id to its group's retained id
    let mut remap: HashMap<String, String> = HashMap::new();
    let mut discarded: HashSet<usize> = HashSet::new();
    for indices in groups.values() {
        if indices.len() < 2 {
            continue;
        }
        let survivor = *indices
            .iter()
            .max_by(|&&a, &&b| prefer(&contacts[a], &contacts[b]))
            .unwrap();
        for &idx in indices {
            if idx != survivor {
                discarded.insert(idx);
                remap.insert(contacts[idx].id.clone(), contacts[survivor].id.clone());
            }
        }
    }

    let mut summary = DedupSummary {
        merged: discarded.len(),
        repointed: 0,
    };

    // Repair foreign keys before removing the discarded contacts
    for activity in activities.iter_mut() {
        if let Some(contact_id) = &activity.contact_id {
            if let Some(retained) = remap.get(contact_id) {
                activity.contact_id = Some(retained.clone());
                summary.repointed += 1;
            }
        }
    }
    for opportunity in opportunities.iter_mut() {
        if let Some(retained) = remap.get(&opportunity.contact_id) {
            opportunity.contact_id = retained.clone();
            summary.repointed += 1;
        }
    }

    let deduplicated: Vec<Contact> = contacts
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !discarded.contains(idx))
        .map(|(_, contact)| contact)
        .collect();

    info!(
        "Deduplicated contacts: {} merged, {} references repointed, {} retained",
        summary.merged,
        summary.repointed,
        deduplicated.len()
    );

    (deduplicated, summary)
}

/// Greater means preferred for retention
fn prefer(a: &Contact, b: &Contact) -> Ordering {
    a.last_modified
        .cmp(&b.last_modified)
        .then(a.created_date.cmp(&b.created_date))
        .then(b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::HashSet;

    fn ts(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    fn contact(id: &str, email: &str, last_modified: Option<NaiveDateTime>) -> Contact {
        Contact {
            id: id.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: email.into(),
            phone: None,
            title: String::new(),
            status: String::new(),
            company_id: None,
            created_date: ts(2023, 1, 1),
            last_modified,
        }
    }

    fn activity(id: &str, contact_id: &str) -> Activity {
        Activity {
            id: id.into(),
            contact_id: Some(contact_id.into()),
            opportunity_id: None,
            activity_type: "call".into(),
            subject: String::new(),
            timestamp: ts(2024, 2, 1),
            duration_minutes: None,
            outcome: String::new(),
            notes: String::new(),
        }
    }

    fn opportunity(id: &str, contact_id: &str) -> Opportunity {
        Opportunity {
            id: id.into(),
            name: String::new(),
            contact_id: contact_id.into(),
            company_id: "C1".into(),
            amount: None,
            stage: "Open".into(),
            probability: None,
            created_date: ts(2024, 1, 1),
            close_date: None,
            is_closed: false,
        }
    }

    #[test]
    fn keeps_one_contact_per_email_with_latest_last_modified() {
        let contacts = vec![
            contact("CT1", "jane@example.com", ts(2024, 1, 1)),
            contact("CT2", "jane@example.com", ts(2024, 3, 1)),
            contact("CT3", "bob@example.com", ts(2024, 2, 1)),
        ];
        let mut activities = vec![];
        let mut opportunities = vec![];

        let (deduped, summary) =
            dedupe_contacts(contacts, &mut activities, &mut opportunities);

        assert_eq!(summary.merged, 1);
        let emails: HashSet<_> = deduped.iter().map(|c| c.email.as_str()).collect();
        assert_eq!(emails.len(), deduped.len());
        assert!(deduped.iter().any(|c| c.id == "CT2"));
        assert!(!deduped.iter().any(|c| c.id == "CT1"));
    }

    #[test]
    fn ties_break_by_created_date_then_lowest_id() {
        let mut a = contact("CT9", "same@example.com", ts(2024, 1, 1));
        a.created_date = ts(2023, 6, 1);
        let mut b = contact("CT2", "same@example.com", ts(2024, 1, 1));
        b.created_date = ts(2023, 1, 1);
        // Same last_modified, later created_date wins
        let (deduped, _) = dedupe_contacts(vec![a, b], &mut [], &mut []);
        assert_eq!(deduped[0].id, "CT9");

        // Fully tied: lowest id wins
        let c = contact("CT9", "same@example.com", ts(2024, 1, 1));
        let d = contact("CT2", "same@example.com", ts(2024, 1, 1));
        let (deduped, _) = dedupe_contacts(vec![c, d], &mut [], &mut []);
        assert_eq!(deduped[0].id, "CT2");
    }

    #[test]
    fn repoints_dependent_records_to_the_retained_contact() {
        let contacts = vec![
            contact("CT1", "jane@example.com", ts(2024, 1, 1)),
            contact("CT2", "jane@example.com", ts(2024, 3, 1)),
        ];
        let mut activities = vec![activity("A1", "CT1"), activity("A2", "CT2")];
        let mut opportunities = vec![opportunity("O1", "CT1")];

        let (deduped, summary) =
            dedupe_contacts(contacts, &mut activities, &mut opportunities);

        assert_eq!(summary.repointed, 2);
        assert_eq!(activities[0].contact_id.as_deref(), Some("CT2"));
        assert_eq!(activities[1].contact_id.as_deref(), Some("CT2"));
        assert_eq!(opportunities[0].contact_id, "CT2");

        // No dependent references a discarded id
        let retained: HashSet<_> = deduped.iter().map(|c| c.id.as_str()).collect();
        assert!(activities
            .iter()
            .all(|a| retained.contains(a.contact_id.as_deref().unwrap())));
        assert!(opportunities.iter().all(|o| retained.contains(o.contact_id.as_str())));
    }

    #[test]
    fn missing_last_modified_loses_to_any_timestamp() {
        let contacts = vec![
            contact("CT1", "jane@example.com", None),
            contact("CT2", "jane@example.com", ts(2020, 1, 1)),
        ];
        let (deduped, _) = dedupe_contacts(contacts, &mut [], &mut []);
        assert_eq!(deduped[0].id, "CT2");
    }

    #[test]
    fn empty_emails_are_never_grouped() {
        let contacts = vec![
            contact("CT1", "", ts(2024, 1, 1)),
            contact("CT2", "", ts(2024, 2, 1)),
        ];
        let (deduped, summary) = dedupe_contacts(contacts, &mut [], &mut []);
        assert_eq!(deduped.len(), 2);
        assert_eq!(summary.merged, 0);
    }
}
