use crate::domain::EntityKind;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Kinds of non-fatal data-quality issues attached to retained records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FlagKind {
    /// Phone number could not be reduced to a valid digit count
    InvalidPhone,
    /// Email failed the address-shape check
    InvalidEmail,
    /// Date/timestamp did not match the expected format; coerced to missing
    UnparsableDate,
    /// Numeric or boolean field could not be coerced
    UnparsableValue,
    /// Row arrived without an identifier and was dropped
    MissingId,
}

/// A non-fatal annotation on a record or field. Flagged records stay in the
/// run unless a validation rule later excludes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
    pub entity: EntityKind,
    pub record_id: Option<String>,
    pub field: String,
    pub kind: FlagKind,
    pub message: String,
}

/// Post-validation rules a record can violate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ViolationRule {
    /// A non-null reference field does not resolve in the referenced set
    DanglingReference {
        field: String,
        target: EntityKind,
    },
    /// created_date is after close_date
    DateRange,
}

/// A record excluded from the load, with the rule it violated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    pub entity: EntityKind,
    pub record_id: String,
    pub rule: ViolationRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCount {
    pub entity: EntityKind,
    pub extracted: usize,
    pub loaded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Structured result of a complete pipeline run: per-entity counts plus
/// every flag, exclusion, and link outcome. This is the principal observable
/// output besides the loaded data.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub counts: Vec<EntityCount>,
    pub flags: Vec<Flag>,
    pub exclusions: Vec<Exclusion>,
    pub deduped_contacts: usize,
    pub linked_activities: usize,
    pub unlinked_activities: usize,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Failed,
            counts: Vec::new(),
            flags: Vec::new(),
            exclusions: Vec::new(),
            deduped_contacts: 0,
            linked_activities: 0,
            unlinked_activities: 0,
        }
    }

    pub fn flag(
        &mut self,
        entity: EntityKind,
        record_id: Option<String>,
        field: &str,
        kind: FlagKind,
        message: String,
    ) {
        self.flags.push(Flag {
            entity,
            record_id,
            field: field.to_string(),
            kind,
            message,
        });
    }

    pub fn exclude(&mut self, entity: EntityKind, record_id: String, rule: ViolationRule) {
        self.exclusions.push(Exclusion {
            entity,
            record_id,
            rule,
        });
    }

    pub fn record_extracted(&mut self, entity: EntityKind, extracted: usize) {
        self.counts.push(EntityCount {
            entity,
            extracted,
            loaded: 0,
        });
    }

    pub fn record_loaded(&mut self, entity: EntityKind, loaded: usize) {
        if let Some(count) = self.counts.iter_mut().find(|c| c.entity == entity) {
            count.loaded = loaded;
        } else {
            self.counts.push(EntityCount {
                entity,
                extracted: 0,
                loaded,
            });
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.finished_at = Some(Utc::now());
        self.status = status;
    }

    /// Persist the report to a timestamped JSON file under `output_dir`
    pub fn persist(&self, output_dir: &Path) -> Result<String> {
        fs::create_dir_all(output_dir)?;

        let timestamp = self.started_at.format("%Y%m%d_%H%M%S");
        let filename = format!("etl_report_{timestamp}.json");
        let filepath = output_dir.join(&filename);

        let json_content = serde_json::to_string_pretty(self)?;
        fs::write(&filepath, json_content)?;

        Ok(filepath.to_string_lossy().to_string())
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
