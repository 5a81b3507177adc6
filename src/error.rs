use thiserror::Error;

#[derive(Error, Debug)]
pub enum CostTrackerError {
    #[error("{kind} sheet not found (tried: {}; available: {})", .tried.join(", "), .available.join(", "))]
    SheetNotFound {
        kind: String,
        tried: Vec<String>,
        available: Vec<String>,
    },

    #[error("Total cost {role} row not found in table '{table}'")]
    MissingTotalRow { table: String, role: String },

    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Table '{table}' does not match the merge template at row {row}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        table: String,
        row: usize,
        expected: String,
        found: String,
    },

    #[error("Nothing to process: {0}")]
    EmptyInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CostTrackerError>;
