use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type covering every way a strict validation can end without success
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Malformed input: {source_name} - {details}")]
    MalformedInput {
        source_name: String,
        details: String,
    },

    #[error("No schema location found: {document} carries neither an explicit schema nor an xsi hint")]
    SchemaLocationMissing { document: String },

    #[error("Malformed schema reference: \"{hint}\" - {details}")]
    SchemaLocationMalformed { hint: String, details: String },

    #[error("Schema not resolvable: tried {}", .attempted.join(", "))]
    SchemaUnresolvable {
        attempted: Vec<String>,
        failures: Vec<LocatorFailure>,
    },

    #[error("Schema at {location} could not be compiled: {details}")]
    SchemaUncompilable { location: String, details: String },

    #[error("{}", ContentViolations(.violations))]
    ContentInvalid { violations: Vec<String> },

    #[error("Validation could not complete after {attempts} attempt(s): {source}")]
    ValidationUnavailable {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse classification of a [`ValidationError`]
///
/// Callers usually branch on this rather than on individual variants: the
/// remediation for `ContentInvalid` (fix the document) differs from the one
/// for `ValidationUnavailable` (retry later, check connectivity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedInput,
    SchemaLocationMissing,
    SchemaLocationMalformed,
    ContentInvalid,
    ValidationUnavailable,
    Internal,
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::MalformedInput { .. } => ErrorKind::MalformedInput,
            ValidationError::SchemaLocationMissing { .. } => ErrorKind::SchemaLocationMissing,
            ValidationError::SchemaLocationMalformed { .. }
            | ValidationError::SchemaUnresolvable { .. }
            | ValidationError::SchemaUncompilable { .. } => ErrorKind::SchemaLocationMalformed,
            ValidationError::ContentInvalid { .. } => ErrorKind::ContentInvalid,
            ValidationError::ValidationUnavailable { .. } => ErrorKind::ValidationUnavailable,
            ValidationError::LibXml2Internal { .. }
            | ValidationError::Io(_)
            | ValidationError::Config(_) => ErrorKind::Internal,
        }
    }

    /// True when the outcome says nothing about the document itself
    pub fn is_environmental(&self) -> bool {
        self.kind() == ErrorKind::ValidationUnavailable
    }

    /// True when every hinted schema location failed for a transient reason
    ///
    /// The kind stays `SchemaLocationMalformed`; this only tells a caller
    /// that trying again later may find the schema.
    pub fn all_transient(&self) -> bool {
        match self {
            ValidationError::SchemaUnresolvable { attempted, failures } => {
                !attempted.is_empty()
                    && failures.iter().all(|failure| failure.error.is_transient())
                    && attempted
                        .iter()
                        .all(|location| failures.iter().any(|f| &f.location == location))
            }
            _ => false,
        }
    }

    /// Schema-rule violations, empty for every other kind
    pub fn violations(&self) -> &[String] {
        match self {
            ValidationError::ContentInvalid { violations } => violations,
            _ => &[],
        }
    }
}

struct ContentViolations<'a>(&'a [String]);

impl fmt::Display for ContentViolations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} XML validation error(s):", self.0.len())?;
        for violation in self.0 {
            write!(f, "\n  {}", violation)?;
        }
        Ok(())
    }
}

/// One locator's failure to load one hinted location
#[derive(Error, Debug)]
#[error("{location} via {locator}: {error}")]
pub struct LocatorFailure {
    pub location: String,
    pub locator: String,
    #[source]
    pub error: FetchError,
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {}", details_or_none(.messages))]
    SchemaParseFailed { messages: Vec<String> },

    #[error("Document parsing failed: {details}")]
    DocumentParseFailed { details: String },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Input too large for libxml2: {size} bytes")]
    InputTooLarge { size: usize },

    #[error("Invalid base URL for libxml2: {url}")]
    InvalidBaseUrl { url: String },

    #[error("Schema resource could not be loaded: {message}")]
    ResourceUnavailable {
        kind: std::io::ErrorKind,
        message: String,
    },
}

fn details_or_none(messages: &[String]) -> String {
    if messages.is_empty() {
        "null pointer returned".to_string()
    } else {
        messages.join("; ")
    }
}

/// Network-specific error types for schema fetching
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("HTTP status error: {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote schema fetching disabled: {url}")]
    RemoteDisabled { url: String },

    #[error("Unsupported URL scheme: {url}")]
    UnsupportedScheme { url: String },

    #[error("IO error: {path} - {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether the same fetch could succeed on a later try
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::HttpStatus { status, .. } => *status >= 500,
            FetchError::Transport(error) => {
                error.is_timeout() || error.is_connect() || error.is_body() || error.is_decode()
            }
            FetchError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            FetchError::RemoteDisabled { .. } | FetchError::UnsupportedScheme { .. } => false,
        }
    }
}

/// Namespace resolver errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("prefix '{prefix}' already registered for namespace '{namespace}'")]
    AlreadyRegistered { prefix: String, namespace: String },
}

impl From<LibXml2Error> for ValidationError {
    fn from(err: LibXml2Error) -> Self {
        ValidationError::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;
