use chrono::NaiveDate;
use thiserror::Error;

/// Caller input that cannot be turned into a valid request. Raised before
/// any fact is read.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required parameter `{0}`")]
    MissingField(&'static str),
    #[error("`{field}` requires `{parent}` to be set")]
    MissingParent { field: &'static str, parent: &'static str },
    #[error("invalid `{field}` value `{value}`: expected {expected}")]
    InvalidValue { field: &'static str, value: String, expected: &'static str },
    #[error("start_date {start} is after end_date {end}")]
    InvertedWindow { start: NaiveDate, end: NaiveDate },
    #[error("unknown territory level `{0}` (expected province|area|subarea|commune)")]
    UnknownLevel(String),
    #[error("unknown metric `{0}` (expected nd|oos|wd|ws|sish|sos|sish_in_shop)")]
    UnknownMetric(String),
    /// The request line itself could not be read (duplicate or malformed
    /// query parameters, undecodable path segments).
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

/// Failure reported by the fact store, carried verbatim.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("fact source query `{operation}` failed for scope [{scope}]: {source}")]
    Source {
        operation: &'static str,
        scope: String,
        #[source]
        source: SourceError,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "The request could not be processed. Check inputs and try again.",
            Self::Internal { .. } => "The metrics could not be computed.",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } | Self::Internal { correlation_id, .. } => {
                correlation_id
            }
        }
    }
}

impl EngineError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ValidationError> for InterfaceError {
    fn from(value: ValidationError) -> Self {
        EngineError::from(value).into()
    }
}

impl From<EngineError> for InterfaceError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Validation(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            // the raw store message is surfaced, not a generic one
            EngineError::Source { source, .. } => {
                Self::Internal { message: source.message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
