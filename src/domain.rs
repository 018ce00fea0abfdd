use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// The four CRM entity types moved through the pipeline, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Company,
    Contact,
    Opportunity,
    Activity,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Company,
        EntityKind::Contact,
        EntityKind::Opportunity,
        EntityKind::Activity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Company => "companies",
            EntityKind::Contact => "contacts",
            EntityKind::Opportunity => "opportunities",
            EntityKind::Activity => "activities",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// Date fields that the schema declares non-null are still Option here: the
// standardizer coerces unparsable values to an explicit missing marker
// rather than failing the run.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub industry: String,
    pub size: String,
    pub country: String,
    pub created_date: Option<NaiveDateTime>,
    pub is_customer: bool,
    pub annual_revenue: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub title: String,
    pub status: String,
    pub company_id: Option<String>,
    pub created_date: Option<NaiveDateTime>,
    pub last_modified: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub name: String,
    pub contact_id: String,
    pub company_id: String,
    pub amount: Option<f64>,
    pub stage: String,
    pub probability: Option<f64>,
    pub created_date: Option<NaiveDateTime>,
    pub close_date: Option<NaiveDate>,
    pub is_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub contact_id: Option<String>,
    pub opportunity_id: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub subject: String,
    pub timestamp: Option<NaiveDateTime>,
    pub duration_minutes: Option<i64>,
    pub outcome: String,
    pub notes: String,
}

/// The complete state of all four entity sets at a pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct RecordSets {
    pub companies: Vec<Company>,
    pub contacts: Vec<Contact>,
    pub opportunities: Vec<Opportunity>,
    pub activities: Vec<Activity>,
}

impl RecordSets {
    pub fn len_of(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Company => self.companies.len(),
            EntityKind::Contact => self.contacts.len(),
            EntityKind::Opportunity => self.opportunities.len(),
            EntityKind::Activity => self.activities.len(),
        }
    }
}
