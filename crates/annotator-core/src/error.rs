use thiserror::Error;

/// Upload rejected before any session state was touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Unsupported file type: {0} (expected a PDF)")]
    WrongType(String),

    #[error("File is too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error("File is empty")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No document loaded")]
    NoDocument,

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Document is encrypted")]
    Encrypted,

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormValueError {
    #[error("Unknown form field: {0}")]
    UnknownField(String),

    #[error("Field {0} is read-only")]
    ReadOnly(String),

    #[error("Field {name} expects a {expected} value")]
    KindMismatch { name: String, expected: &'static str },

    #[error("Field {name} accepts at most {max} characters")]
    TooLong { name: String, max: u32 },

    #[error("{value:?} is not an option of field {name}")]
    NotAnOption { name: String, value: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum AnnotatorError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    FormValue(#[from] FormValueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}
