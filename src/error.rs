use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("column mismatch for {entity} ({side}): missing {missing:?}")]
    ColumnMismatch {
        entity: &'static str,
        side: &'static str,
        missing: Vec<String>,
    },

    #[error("post-validation recorded {count} violations, exceeding the threshold of {threshold}")]
    ViolationThreshold { count: usize, threshold: usize },

    #[error("load failed: {message}")]
    Load { message: String },
}

pub type Result<T> = std::result::Result<T, EtlError>;
