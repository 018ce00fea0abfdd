use crate::config::PipelineConfig;
use crate::domain::{EntityKind, RecordSets};
use crate::error::Result;
use crate::extract::read_table;
use crate::pipeline::dedupe::dedupe_contacts;
use crate::pipeline::link::link_activities;
use crate::pipeline::shape::{
    shape_activities, shape_companies, shape_contacts, shape_opportunities,
};
use crate::pipeline::standardize::standardize_rows;
use crate::pipeline::validate::{post_validate, pre_validate_destination, pre_validate_source};
use crate::report::{RunReport, RunStatus};
use crate::sink::{to_batches, Sink};
use metrics::{counter, histogram};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Orchestrates one single-pass batch run: extract, pre-validate,
/// standardize, shape, dedupe, link, post-validate, load. Stages run
/// strictly sequentially over in-memory record sets; nothing touches the
/// destination store until the final transactional load.
pub struct Pipeline {
    config: PipelineConfig,
    sink: Arc<dyn Sink>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sink: Arc<dyn Sink>) -> Self {
        Self { config, sink }
    }

    /// Extract and pre-validate every entity without transforming or
    /// loading anything.
    pub async fn check(&self) -> Result<()> {
        for kind in EntityKind::ALL {
            self.extract_and_prevalidate(kind, None).await?;
        }
        info!("All source files and destination tables validated");
        Ok(())
    }

    /// Run the complete pipeline and return the run report.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::new();
        counter!("crm_etl_runs_total").increment(1);
        let t_run = std::time::Instant::now();

        info!("Starting ETL run {}", report.run_id);

        // Step 1+2: extract and pre-validate every entity before any
        // transformation; a column mismatch aborts here
        let mut company_rows = self
            .extract_and_prevalidate(EntityKind::Company, Some(&mut report))
            .await?;
        let mut contact_rows = self
            .extract_and_prevalidate(EntityKind::Contact, Some(&mut report))
            .await?;
        let mut opportunity_rows = self
            .extract_and_prevalidate(EntityKind::Opportunity, Some(&mut report))
            .await?;
        let mut activity_rows = self
            .extract_and_prevalidate(EntityKind::Activity, Some(&mut report))
            .await?;

        // Step 3: standardize configured text/phone/email/date fields
        for (kind, rows) in [
            (EntityKind::Company, &mut company_rows),
            (EntityKind::Contact, &mut contact_rows),
            (EntityKind::Opportunity, &mut opportunity_rows),
            (EntityKind::Activity, &mut activity_rows),
        ] {
            standardize_rows(kind, self.config.entity(kind), rows, &mut report);
        }

        // Step 4: raw rows become typed records
        let companies = shape_companies(&company_rows, &mut report);
        let contacts = shape_contacts(&contact_rows, &mut report);
        let mut opportunities = shape_opportunities(&opportunity_rows, &mut report);
        let mut activities = shape_activities(&activity_rows, &mut report);

        // Step 5: collapse duplicate contacts and repair foreign keys
        let (contacts, dedup) =
            dedupe_contacts(contacts, &mut activities, &mut opportunities);
        report.deduped_contacts = dedup.merged;
        counter!("crm_etl_contacts_merged_total").increment(dedup.merged as u64);

        // Step 6: infer missing activity→opportunity links
        let links = link_activities(&mut activities, &opportunities);
        report.linked_activities = links.linked;
        report.unlinked_activities = links.unlinked;
        counter!("crm_etl_activities_linked_total").increment(links.linked as u64);

        // Step 7: referential integrity and date-range checks
        let final_sets = post_validate(
            RecordSets {
                companies,
                contacts,
                opportunities,
                activities,
            },
            self.config.validation.max_violations,
            &mut report,
        )?;

        // Step 8: transactional truncate-and-load
        let batches = to_batches(&final_sets, &self.config);
        let summary = self.sink.load(&batches).await?;
        for kind in EntityKind::ALL {
            report.record_loaded(kind, final_sets.len_of(kind));
            counter!("crm_etl_rows_loaded_total", "entity" => kind.as_str())
                .increment(final_sets.len_of(kind) as u64);
        }

        // Post-check against the store itself
        for kind in EntityKind::ALL {
            let table = &self.config.entity(kind).table;
            let stored = self.sink.table_count(table).await? as usize;
            if stored != final_sets.len_of(kind) {
                warn!(
                    "{} holds {} rows but {} were loaded",
                    table,
                    stored,
                    final_sets.len_of(kind)
                );
            }
        }

        counter!("crm_etl_flags_total").increment(report.flags.len() as u64);
        counter!("crm_etl_exclusions_total").increment(report.exclusions.len() as u64);
        histogram!("crm_etl_run_duration_seconds").record(t_run.elapsed().as_secs_f64());

        report.finish(RunStatus::Succeeded);
        match report.persist(&self.config.output_dir) {
            Ok(path) => info!("Run report written to {}", path),
            Err(e) => warn!("Failed to persist run report: {}", e),
        }

        info!(
            "ETL run {} completed: {} rows loaded, {} flags, {} exclusions",
            report.run_id,
            summary.total(),
            report.flags.len(),
            report.exclusions.len()
        );

        Ok(report)
    }

    async fn extract_and_prevalidate(
        &self,
        kind: EntityKind,
        report: Option<&mut RunReport>,
    ) -> Result<Vec<Map<String, Value>>> {
        let cfg = self.config.entity(kind);
        let table = read_table(&self.config.source_path(kind))?;

        if let Some(report) = report {
            report.record_extracted(kind, table.rows.len());
            counter!("crm_etl_records_extracted_total", "entity" => kind.as_str())
                .increment(table.rows.len() as u64);
        }

        let rows = pre_validate_source(kind, cfg, &table)?;
        let columns = self.sink.table_columns(&cfg.table).await?;
        pre_validate_destination(kind, cfg, &columns)?;
        Ok(rows)
    }
}
