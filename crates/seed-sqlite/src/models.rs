use serde::Serialize;

/// What to look for after provisioning.
#[derive(Debug, Clone)]
pub struct SanityOptions {
    pub table: String,
    /// Column holding `YYYY-MM-DD` dates; enables the span report.
    pub date_column: Option<String>,
    pub normalize_dates: bool,
}

impl Default for SanityOptions {
    fn default() -> Self {
        SanityOptions {
            table: "race_program".to_string(),
            date_column: Some("date".to_string()),
            normalize_dates: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DateSpan {
    pub min: Option<String>,
    pub max: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SanityReport {
    pub table: String,
    pub present: bool,
    pub rows: Option<i64>,
    pub span: Option<DateSpan>,
    /// Rows rewritten by date normalization.
    pub normalized: Option<usize>,
    /// Steps that failed; reported, not raised.
    pub warnings: Vec<String>,
}
