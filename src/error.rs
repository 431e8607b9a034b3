use thiserror::Error;

/// Domain validation errors. Storage and IO failures travel as `anyhow::Error`
/// or `rusqlite::Error` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResultsError {
    #[error("marks must be between 0 and 100, got {0}")]
    MarkOutOfRange(String),

    #[error("marks may have at most 2 decimal places, got {0}")]
    MarkPrecision(String),

    #[error("marks must be a number, got {0}")]
    MarkNotNumeric(String),

    #[error("unknown grade symbol: {0}")]
    UnknownGrade(String),

    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ResultsError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable protocol code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MarkOutOfRange(_) | Self::MarkPrecision(_) | Self::MarkNotNumeric(_) => {
                "bad_mark"
            }
            Self::UnknownGrade(_) => "bad_grade",
            Self::Invalid { .. } => "bad_params",
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field.as_str()),
            Self::MarkOutOfRange(_) | Self::MarkPrecision(_) | Self::MarkNotNumeric(_) => {
                Some("marks")
            }
            Self::UnknownGrade(_) => Some("grade"),
        }
    }
}
