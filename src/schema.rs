//! Compiled schemas and the validators they hand out
//!
//! [`Schema`] and [`Validator`] are the seam between the strict validation
//! loop and whatever engine checks documents. The loop only ever sees
//! [`AttemptError`], which keeps content violations, I/O trouble and engine
//! faults apart no matter how the engine itself reports them.

use std::fmt;
use std::io;
use std::path::Path;

use url::Url;

use crate::document::Source;
use crate::error::{LibXml2Error, Result, ValidationError};
use crate::libxml2::{EngineOutcome, LibXml2Wrapper, XmlSchemaPtr};
use crate::validator::RetryPolicy;

/// Why a single validation attempt did not pass
#[derive(Debug)]
pub enum AttemptError {
    /// The document breaks schema rules. Retrying cannot change this.
    Invalid { violations: Vec<String> },
    /// I/O failed underneath the validator; may be transient
    Io(io::Error),
    /// The engine itself failed
    Engine { details: String },
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Invalid { violations } => {
                write!(f, "{} schema violation(s)", violations.len())
            }
            AttemptError::Io(err) => write!(f, "I/O failure: {}", err),
            AttemptError::Engine { details } => write!(f, "engine failure: {}", details),
        }
    }
}

impl From<io::Error> for AttemptError {
    fn from(err: io::Error) -> Self {
        AttemptError::Io(err)
    }
}

/// Checks one document source per call
///
/// Implementations are not required to be thread-safe; the strict validator
/// never shares one instance between threads.
#[cfg_attr(test, mockall::automock)]
pub trait Validator {
    fn validate(&mut self, source: &Source) -> std::result::Result<(), AttemptError>;
}

/// A compiled, reusable validity specification
///
/// A schema is shared between threads; every validation attempt asks it for
/// a fresh [`Validator`].
pub trait Schema: Send + Sync {
    fn new_validator(&self) -> Box<dyn Validator + '_>;

    /// Where the schema came from, if known
    fn location(&self) -> Option<&str> {
        None
    }
}

/// XML Schema (XSD) compiled by libxml2
#[derive(Debug, Clone)]
pub struct XsdSchema {
    compiled: XmlSchemaPtr,
    location: Option<String>,
}

impl XsdSchema {
    /// Compile a schema from bytes, resolving relative imports against `base`
    ///
    /// Imports and includes that cannot be fetched are retried under the
    /// default [`RetryPolicy`].
    pub fn compile(data: &[u8], base: Option<&Url>, location: Option<String>) -> Result<Self> {
        Self::compile_with_policy(data, base, location, &RetryPolicy::default())
    }

    /// Compile a schema, retrying transient failures to load its imports
    pub fn compile_with_policy(
        data: &[u8],
        base: Option<&Url>,
        location: Option<String>,
        policy: &RetryPolicy,
    ) -> Result<Self> {
        let engine = LibXml2Wrapper::new();
        let compiled = policy.run(|| {
            engine
                .compile_schema(data, base)
                .map_err(|err| compile_attempt_error(err, location.as_deref()))
        })?;

        Ok(Self { compiled, location })
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::compile(data, None, None)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self> {
        Self::from_bytes(text.as_bytes())
    }

    /// Compile a schema file; its imports resolve relative to the file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let canonical = path.canonicalize()?;
        let base = Url::from_file_path(&canonical).ok();
        Self::compile(&data, base.as_ref(), Some(path.display().to_string()))
    }
}

impl Schema for XsdSchema {
    fn new_validator(&self) -> Box<dyn Validator + '_> {
        Box::new(LibXml2Validator {
            schema: &self.compiled,
            engine: LibXml2Wrapper::new(),
        })
    }

    fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

fn compile_attempt_error(err: LibXml2Error, location: Option<&str>) -> AttemptError {
    match err {
        LibXml2Error::ResourceUnavailable { kind, message } => {
            AttemptError::Io(io::Error::new(kind, message))
        }
        LibXml2Error::SchemaParseFailed { .. } => {
            AttemptError::Rejected(ValidationError::MalformedInput {
                source_name: location.unwrap_or("<schema>").to_string(),
                details: err.to_string(),
            })
        }
        other => AttemptError::Rejected(other.into()),
    }
}

/// Validator backed by a private libxml2 validation context per call
pub struct LibXml2Validator<'s> {
    schema: &'s XmlSchemaPtr,
    engine: LibXml2Wrapper,
}

impl Validator for LibXml2Validator<'_> {
    fn validate(&mut self, source: &Source) -> std::result::Result<(), AttemptError> {
        let outcome = self
            .engine
            .validate_source(
                self.schema,
                source.content().as_bytes(),
                source.system_id(),
            )
            .map_err(|err| match err {
                // roxmltree accepted it but libxml2 did not
                LibXml2Error::DocumentParseFailed { details } => {
                    AttemptError::Rejected(ValidationError::MalformedInput {
                        source_name: source
                            .system_id()
                            .map_or_else(|| "<memory>".to_string(), Url::to_string),
                        details,
                    })
                }
                other => AttemptError::Engine {
                    details: other.to_string(),
                },
            })?;

        match outcome {
            EngineOutcome::Valid => Ok(()),
            EngineOutcome::Invalid { messages } => Err(AttemptError::Invalid {
                violations: messages,
            }),
            EngineOutcome::IoFailure { kind, message } => {
                Err(AttemptError::Io(io::Error::new(kind, message)))
            }
            EngineOutcome::InternalError { code, messages } => Err(AttemptError::Engine {
                details: format!("libxml2 returned {}: {}", code, messages.join("; ")),
            }),
        }
    }
}
