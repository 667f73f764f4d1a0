/// A telemetry payload could not be turned into a [`Reading`](crate::reading::Reading).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A replacement rule table file could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum RuleFileError {
    #[error("Failed to read rule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse rule file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rule table is invalid: {0}")]
    Invalid(String),
}
