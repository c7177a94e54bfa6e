use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("source {location} unavailable: {reason}")]
    SourceUnavailable { location: String, reason: String },

    #[error("dataset is missing required columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("row {row}: cannot parse {column} value {value:?} as a date")]
    DateParse {
        row: usize,
        column: &'static str,
        value: String,
    },
}

impl LoadError {
    pub fn unavailable(location: impl Into<String>, reason: impl ToString) -> Self {
        LoadError::SourceUnavailable {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}
