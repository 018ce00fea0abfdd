use crate::config::PipelineConfig;
use crate::domain::{Activity, Company, Contact, EntityKind, Opportunity, RecordSets};
use crate::error::{EtlError, Result};
use crate::pipeline::standardize::{DATETIME_FORMAT, DATE_FORMAT};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Rows ready for insertion into one destination table, in load order
#[derive(Debug, Clone)]
pub struct TableBatch {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub tables: Vec<(String, usize)>,
}

impl LoadSummary {
    pub fn total(&self) -> usize {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// Destination store seam. The pipeline only needs column introspection for
/// pre-validation, an all-or-nothing load, and row counts for post-checks.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;
    async fn table_count(&self, table: &str) -> Result<u64>;
    /// Truncate every table in `batches`, then insert all rows, inside a
    /// single transaction. A failure leaves the store at its pre-run state.
    async fn load(&self, batches: &[TableBatch]) -> Result<LoadSummary>;
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys=ON;
CREATE TABLE IF NOT EXISTS companies (
    id             TEXT PRIMARY KEY,
    name           TEXT UNIQUE,
    domain         TEXT UNIQUE,
    industry       TEXT,
    size           TEXT,
    country        TEXT,
    created_date   TEXT,
    is_customer    INTEGER NOT NULL DEFAULT 0,
    annual_revenue REAL
);
CREATE TABLE IF NOT EXISTS contacts (
    id            TEXT PRIMARY KEY,
    first_name    TEXT,
    last_name     TEXT,
    email         TEXT UNIQUE,
    phone         TEXT UNIQUE,
    title         TEXT,
    status        TEXT,
    company_id    TEXT REFERENCES companies(id) ON DELETE SET NULL,
    created_date  TEXT,
    last_modified TEXT
);
CREATE TABLE IF NOT EXISTS opportunities (
    id           TEXT PRIMARY KEY,
    name         TEXT,
    contact_id   TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
    company_id   TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    amount       REAL,
    stage        TEXT,
    probability  REAL,
    created_date TEXT,
    close_date   TEXT,
    is_closed    INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS activities (
    id               TEXT PRIMARY KEY,
    contact_id       TEXT REFERENCES contacts(id) ON DELETE SET NULL,
    opportunity_id   TEXT REFERENCES opportunities(id) ON DELETE SET NULL,
    type             TEXT,
    subject          TEXT,
    timestamp        TEXT,
    duration_minutes INTEGER,
    outcome          TEXT,
    notes            TEXT
);
"#;

/// SQLite-backed sink. Bootstraps the destination schema on open.
pub struct SqliteSink {
    conn: Mutex<Connection>,
    batch_size: usize,
}

impl SqliteSink {
    pub fn open<P: AsRef<Path>>(db_path: P, batch_size: usize) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            batch_size: batch_size.max(1),
        })
    }

    pub fn in_memory(batch_size: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            batch_size: batch_size.max(1),
        })
    }
}

#[async_trait]
impl Sink for SqliteSink {
    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    async fn table_count(&self, table: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{table}\""),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn load(&self, batches: &[TableBatch]) -> Result<LoadSummary> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // Truncate children before parents so foreign keys stay satisfied
        for batch in batches.iter().rev() {
            tx.execute(&format!("DELETE FROM \"{}\"", batch.table), [])
                .map_err(|e| EtlError::Load {
                    message: format!("truncating {}: {}", batch.table, e),
                })?;
        }

        let mut summary = LoadSummary::default();
        for batch in batches {
            let mut inserted = 0;
            let quoted: Vec<String> = batch.columns.iter().map(|c| format!("\"{c}\"")).collect();
            let row_placeholders = format!(
                "({})",
                vec!["?"; batch.columns.len()].join(", ")
            );

            for chunk in batch.rows.chunks(self.batch_size) {
                let values_clause = vec![row_placeholders.clone(); chunk.len()].join(", ");
                let sql = format!(
                    "INSERT INTO \"{}\" ({}) VALUES {}",
                    batch.table,
                    quoted.join(", "),
                    values_clause
                );
                let params = rusqlite::params_from_iter(chunk.iter().flatten());
                tx.execute(&sql, params).map_err(|e| EtlError::Load {
                    message: format!("inserting into {}: {}", batch.table, e),
                })?;
                inserted += chunk.len();
            }

            debug!("Loaded {} rows into {}", inserted, batch.table);
            summary.tables.push((batch.table.clone(), inserted));
        }

        tx.commit().map_err(|e| EtlError::Load {
            message: format!("commit failed: {e}"),
        })?;

        info!("Load committed: {} rows across {} tables", summary.total(), summary.tables.len());
        Ok(summary)
    }
}

/// Converts the final record sets into per-table batches in dependency
/// order, using each entity's configured destination columns.
pub fn to_batches(sets: &RecordSets, config: &PipelineConfig) -> Vec<TableBatch> {
    EntityKind::ALL
        .iter()
        .map(|&kind| {
            let cfg = config.entity(kind);
            let rows = match kind {
                EntityKind::Company => sets
                    .companies
                    .iter()
                    .map(|c| row_values(&cfg.table_columns, |col| company_value(c, col)))
                    .collect(),
                EntityKind::Contact => sets
                    .contacts
                    .iter()
                    .map(|c| row_values(&cfg.table_columns, |col| contact_value(c, col)))
                    .collect(),
                EntityKind::Opportunity => sets
                    .opportunities
                    .iter()
                    .map(|o| row_values(&cfg.table_columns, |col| opportunity_value(o, col)))
                    .collect(),
                EntityKind::Activity => sets
                    .activities
                    .iter()
                    .map(|a| row_values(&cfg.table_columns, |col| activity_value(a, col)))
                    .collect(),
            };
            TableBatch {
                table: cfg.table.clone(),
                columns: cfg.table_columns.clone(),
                rows,
            }
        })
        .collect()
}

fn row_values<F: Fn(&str) -> SqlValue>(columns: &[String], value_for: F) -> Vec<SqlValue> {
    columns.iter().map(|c| value_for(c)).collect()
}

fn company_value(c: &Company, column: &str) -> SqlValue {
    match column {
        "id" => text(&c.id),
        "name" => text(&c.name),
        "domain" => text(&c.domain),
        "industry" => text(&c.industry),
        "size" => text(&c.size),
        "country" => text(&c.country),
        "created_date" => datetime(c.created_date),
        "is_customer" => SqlValue::Integer(c.is_customer as i64),
        "annual_revenue" => real(c.annual_revenue),
        _ => SqlValue::Null,
    }
}

fn contact_value(c: &Contact, column: &str) -> SqlValue {
    match column {
        "id" => text(&c.id),
        "first_name" => text(&c.first_name),
        "last_name" => text(&c.last_name),
        // Unique columns store missing values as NULL, not ''
        "email" => {
            if c.email.trim().is_empty() {
                SqlValue::Null
            } else {
                text(&c.email)
            }
        }
        "phone" => opt_text(&c.phone),
        "title" => text(&c.title),
        "status" => text(&c.status),
        "company_id" => opt_text(&c.company_id),
        "created_date" => datetime(c.created_date),
        "last_modified" => datetime(c.last_modified),
        _ => SqlValue::Null,
    }
}

fn opportunity_value(o: &Opportunity, column: &str) -> SqlValue {
    match column {
        "id" => text(&o.id),
        "name" => text(&o.name),
        "contact_id" => text(&o.contact_id),
        "company_id" => text(&o.company_id),
        "amount" => real(o.amount),
        "stage" => text(&o.stage),
        "probability" => real(o.probability),
        "created_date" => datetime(o.created_date),
        "close_date" => date(o.close_date),
        "is_closed" => SqlValue::Integer(o.is_closed as i64),
        _ => SqlValue::Null,
    }
}

fn activity_value(a: &Activity, column: &str) -> SqlValue {
    match column {
        "id" => text(&a.id),
        "contact_id" => opt_text(&a.contact_id),
        "opportunity_id" => opt_text(&a.opportunity_id),
        "type" => text(&a.activity_type),
        "subject" => text(&a.subject),
        "timestamp" => datetime(a.timestamp),
        "duration_minutes" => a
            .duration_minutes
            .map(SqlValue::Integer)
            .unwrap_or(SqlValue::Null),
        "outcome" => text(&a.outcome),
        "notes" => text(&a.notes),
        _ => SqlValue::Null,
    }
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

fn opt_text(s: &Option<String>) -> SqlValue {
    match s {
        Some(v) if !v.trim().is_empty() => SqlValue::Text(v.clone()),
        _ => SqlValue::Null,
    }
}

fn real(v: Option<f64>) -> SqlValue {
    v.map(SqlValue::Real).unwrap_or(SqlValue::Null)
}

fn datetime(v: Option<NaiveDateTime>) -> SqlValue {
    v.map(|dt| SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()))
        .unwrap_or(SqlValue::Null)
}

fn date(v: Option<NaiveDate>) -> SqlValue {
    v.map(|d| SqlValue::Text(d.format(DATE_FORMAT).to_string()))
        .unwrap_or(SqlValue::Null)
}
