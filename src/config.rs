use crate::domain::EntityKind;
use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Immutable configuration for a pipeline run. Loaded once from TOML and
/// passed by reference into each stage.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Directory containing the source extract files
    pub data_root: PathBuf,
    /// Directory where run reports are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub entities: EntityConfigs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the destination SQLite database
    pub path: PathBuf,
    /// Rows per INSERT statement during load
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Post-validation violations beyond this count fail the run
    #[serde(default = "default_max_violations")]
    pub max_violations: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfigs {
    pub companies: EntityConfig,
    pub contacts: EntityConfig,
    pub opportunities: EntityConfig,
    pub activities: EntityConfig,
}

/// Per-entity source file, destination table, and field-role mapping
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    /// Source file name under `data_root` (.csv or .json)
    pub source: String,
    /// Destination table name
    pub table: String,
    /// Columns the source file must provide
    pub source_columns: Vec<String>,
    /// Columns the destination table must expose
    pub table_columns: Vec<String>,
    #[serde(default)]
    pub text_fields: Vec<String>,
    #[serde(default)]
    pub phone_fields: Vec<String>,
    #[serde(default)]
    pub email_fields: Vec<String>,
    #[serde(default)]
    pub date_fields: Vec<String>,
}

impl PipelineConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config: PipelineConfig = toml::from_str(&config_content)?;
        Ok(config)
    }

    pub fn entity(&self, kind: EntityKind) -> &EntityConfig {
        match kind {
            EntityKind::Company => &self.entities.companies,
            EntityKind::Contact => &self.entities.contacts,
            EntityKind::Opportunity => &self.entities.opportunities,
            EntityKind::Activity => &self.entities.activities,
        }
    }

    pub fn source_path(&self, kind: EntityKind) -> PathBuf {
        self.data_root.join(&self.entity(kind).source)
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_violations: default_max_violations(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_batch_size() -> usize {
    100
}

fn default_max_violations() -> usize {
    25
}
