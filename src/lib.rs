//! # strict-xml Library
//!
//! Schema-validating XML documents that are only handed back once libxml2
//! has accepted them.
//!
//! A [`StrictValidator`] validates an [`XmlDocument`] against an explicit
//! [`Schema`] or one discovered from the document's `xsi:schemaLocation` /
//! `xsi:noNamespaceSchemaLocation` hints. Transient I/O failures are retried
//! under a [`RetryPolicy`]; schema violations never are. Errors keep
//! "the document is wrong" ([`ErrorKind::ContentInvalid`]) apart from "validity
//! could not be determined" ([`ErrorKind::ValidationUnavailable`]).
//!
//! [`NamespaceResolver`] is an immutable prefix to namespace URI table for
//! query components.

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod http_client;
pub mod libxml2;
pub mod namespace;
pub mod schema;
pub mod schema_loader;
pub mod validator;

pub use cache::ParsedSchemaCache;
pub use config::{Config, ConfigError, ConfigManager, EnvProvider, SystemEnvProvider};
pub use document::{SchemaHints, SchemaLocationHint, Source, XSI_NAMESPACE, XmlDocument};
pub use error::{
    ErrorKind, FetchError, LibXml2Error, LocatorFailure, NamespaceError, Result, ValidationError,
};
pub use http_client::{HttpClient, HttpClientConfig};
pub use libxml2::{EngineOutcome, LibXml2Wrapper, XmlSchemaPtr};
pub use namespace::{NamespaceLookup, NamespaceResolver};
pub use schema::{AttemptError, Schema, Validator, XsdSchema};
pub use schema_loader::{
    BundleLocator, DirectoryLocator, LoadedSchema, ResourceLocator, SchemaResolver, UriLocator,
};
pub use validator::{RetryPolicy, StrictValidator, StrictXml};
