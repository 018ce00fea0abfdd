use crate::domain::{Activity, Opportunity};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkSummary {
    pub linked: usize,
    pub unlinked: usize,
}

/// Fills missing activity→opportunity links. For each activity with a null
/// `opportunity_id` and a non-null `contact_id`, the candidates are that
/// contact's opportunities created on or before the activity's timestamp and
/// not closed before the activity's date. The most recently created candidate
/// wins; ties break to the lowest id. An activity with no candidate stays
/// unlinked, which is not an error. No records are created or deleted.
pub fn link_activities(
    activities: &mut [Activity],
    opportunities: &[Opportunity],
) -> LinkSummary {
    let mut by_contact: HashMap<&str, Vec<&Opportunity>> = HashMap::new();
    for opp in opportunities {
        by_contact.entry(opp.contact_id.as_str()).or_default().push(opp);
    }

    let mut summary = LinkSummary::default();
    for activity in activities.iter_mut() {
        if activity.opportunity_id.is_some() {
            continue;
        }
        let Some(contact_id) = activity.contact_id.as_deref() else {
            continue;
        };
        let Some(ts) = activity.timestamp else {
            // Timestamp was coerced to missing; nothing to match against
            summary.unlinked += 1;
            continue;
        };

        let best = by_contact
            .get(contact_id)
            .into_iter()
            .flatten()
            .filter(|opp| {
                let Some(created) = opp.created_date else {
                    return false;
                };
                if created > ts {
                    return false;
                }
                // An opportunity already closed when the activity happened
                // is not a candidate
                opp.close_date.map_or(true, |close| close >= ts.date())
            })
            .max_by(|a, b| {
                a.created_date
                    .cmp(&b.created_date)
                    .then_with(|| b.id.cmp(&a.id))
            });

        match best {
            Some(opp) => {
                activity.opportunity_id = Some(opp.id.clone());
                summary.linked += 1;
            }
            None => summary.unlinked += 1,
        }
    }

    info!(
        "Linked {} activities to opportunities, {} left unlinked",
        summary.linked, summary.unlinked
    );
    summary
}
