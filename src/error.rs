//! Error types for the wfa_share crate.

use std::fmt;

use thiserror::Error;

/// Code carried by a transport level [`WfaError::ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCode {
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// The request never produced an HTTP answer (connect, TLS, timeout...).
    Unexpected,
    /// The server answered with an empty body.
    NoResponse,
}

impl ApiCode {
    /// HTTP status, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiCode::Status(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ApiCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiCode::Status(code) => write!(f, "{}", code),
            ApiCode::Unexpected => write!(f, "unexpected"),
            ApiCode::NoResponse => write!(f, "no response"),
        }
    }
}

/// Broad classification of [`WfaError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Validation,
    Configuration,
    JobFailure,
    Protocol,
    Element,
    Storage,
}

/// Errors that can occur when driving workflows on a WFA server.
#[derive(Error, Debug)]
pub enum WfaError {
    #[error("WFA api failed. Reason - {code}:{message}")]
    ApiError { code: ApiCode, message: String },

    #[error("Request was failed. Probable reasons are: {reasons}. URL: {url}, Data: {data}.")]
    RequestFailed {
        reasons: String,
        url: String,
        data: String,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inputs {names:?} for {operation} is missing.")]
    MissingInputs {
        operation: String,
        names: Vec<String>,
    },

    #[error("Not acceptable key '{key}' is provided. Should be one of {allowed:?}.")]
    UnacceptableInput { key: String, allowed: Vec<String> },

    #[error("Not acceptable value '{value}' for input '{key}'. Should be one of {allowed:?}.")]
    UnacceptableValue {
        key: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("IP address '{value}' for input '{key}' is not valid.")]
    InvalidIp { key: String, value: String },

    #[error("Only NFS protocol is supported by WFA driver, got {0}.")]
    UnsupportedProtocol(String),

    #[error("Only IP access is supported by WFA driver, got {0}.")]
    UnsupportedAccessType(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Workflow for action {operation} was not found. Please, specify correct workflow \
         name in the config file or use default name {default_workflow} for workflow."
    )]
    WorkflowNotConfigured {
        operation: String,
        default_workflow: String,
    },

    #[error("Workflow {0} does not exist on the WFA server.")]
    WorkflowMissing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    JobFailed(String),

    #[error("Malformed WFA response: {0}")]
    MalformedResponse(String),

    #[error("Export location was not returned.")]
    NoExportLocation,

    #[error("XML error: {0}")]
    Xml(String),

    #[error("No element by given name {0}.")]
    ElementNotFound(String),

    #[error("Element name cannot be empty.")]
    InvalidKey,

    #[error("Type cannot be converted into element: {0}")]
    UnsupportedType(String),

    #[error("Private storage error: {0}")]
    Storage(String),

    #[error("Failed to acquire lock {name}: {message}")]
    Lock { name: String, message: String },
}

impl WfaError {
    /// Taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WfaError::ApiError {
                code: ApiCode::NoResponse,
                ..
            } => ErrorKind::Protocol,
            WfaError::ApiError { .. } | WfaError::RequestFailed { .. } | WfaError::Http(_) => {
                ErrorKind::Transport
            }
            WfaError::MissingInputs { .. }
            | WfaError::UnacceptableInput { .. }
            | WfaError::UnacceptableValue { .. }
            | WfaError::InvalidIp { .. }
            | WfaError::UnsupportedProtocol(_)
            | WfaError::UnsupportedAccessType(_) => ErrorKind::Validation,
            WfaError::Configuration(_)
            | WfaError::WorkflowNotConfigured { .. }
            | WfaError::WorkflowMissing(_)
            | WfaError::Json(_) => ErrorKind::Configuration,
            WfaError::JobFailed(_) => ErrorKind::JobFailure,
            WfaError::MalformedResponse(_) | WfaError::NoExportLocation | WfaError::Xml(_) => {
                ErrorKind::Protocol
            }
            WfaError::ElementNotFound(_) | WfaError::InvalidKey | WfaError::UnsupportedType(_) => {
                ErrorKind::Element
            }
            WfaError::Io(_) | WfaError::Storage(_) | WfaError::Lock { .. } => ErrorKind::Storage,
        }
    }
}

/// Result type alias for WfaError.
pub type Result<T> = std::result::Result<T, WfaError>;
