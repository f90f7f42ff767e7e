//! Strict validation: the document comes back only if the schema accepts it
//!
//! Every call runs a bounded sequence of attempts. Each attempt either
//! passes, finds schema violations, or trips over I/O. Violations end the
//! call at once; I/O failures classified as transient by the [`RetryPolicy`]
//! are retried with exponential backoff until the attempt budget runs out.
//! No state survives between calls.

use std::io;
use std::ops::Deref;
use std::thread::sleep;
use std::time::Duration;

use crate::cache::ParsedSchemaCache;
use crate::config::{Config, ConfigManager};
use crate::document::{Source, XmlDocument};
use crate::error::{Result, ValidationError};
use crate::http_client::HttpClient;
use crate::schema::{AttemptError, Schema, Validator};
use crate::schema_loader::{
    BundleLocator, DirectoryLocator, ResourceLocator, SchemaResolver, UriLocator,
};

/// How many attempts a validation gets and which failures earn another one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; 0 behaves like 1
    pub max_attempts: u32,
    /// Pause after the first failed attempt
    pub retry_delay: Duration,
    /// Upper bound for the doubled pauses
    pub max_retry_delay: Duration,
    /// I/O error kinds treated as temporary
    pub transient_kinds: Vec<io::ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(50),
            max_retry_delay: Duration::from_secs(1),
            transient_kinds: vec![
                io::ErrorKind::ConnectionRefused,
                io::ErrorKind::ConnectionReset,
                io::ErrorKind::ConnectionAborted,
                io::ErrorKind::NotConnected,
                io::ErrorKind::TimedOut,
                io::ErrorKind::Interrupted,
                io::ErrorKind::BrokenPipe,
                io::ErrorKind::UnexpectedEof,
                io::ErrorKind::HostUnreachable,
                io::ErrorKind::NetworkUnreachable,
                io::ErrorKind::NetworkDown,
                io::ErrorKind::WouldBlock,
            ],
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` and the default classification
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn is_transient(&self, error: &io::Error) -> bool {
        self.transient_kinds.contains(&error.kind())
    }

    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause before attempt `failed + 1`: `retry_delay * 2^(failed - 1)`, capped
    pub fn backoff_delay(&self, failed: u32) -> Duration {
        let exponent = failed.saturating_sub(1).min(31);
        self.retry_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_retry_delay)
    }

    /// Run `attempt` until it passes, fails for good, or the budget is spent
    pub fn run<T, F>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, AttemptError>,
    {
        let max_attempts = self.effective_attempts();
        let mut made = 0;

        loop {
            made += 1;
            let error = match attempt() {
                Ok(value) => return Ok(value),
                Err(AttemptError::Invalid { violations }) => {
                    return Err(ValidationError::ContentInvalid { violations });
                }
                Err(AttemptError::Engine { details }) => {
                    return Err(ValidationError::LibXml2Internal { details });
                }
                Err(AttemptError::Rejected(error)) => return Err(error),
                Err(AttemptError::Io(error)) => error,
            };

            if !self.is_transient(&error) {
                return Err(ValidationError::ValidationUnavailable {
                    attempts: made,
                    source: error,
                });
            }

            tracing::warn!(
                attempt = made,
                max_attempts,
                cause = %error,
                "attempt {} of {} failed on I/O",
                made,
                max_attempts
            );

            if made >= max_attempts {
                return Err(ValidationError::ValidationUnavailable {
                    attempts: made,
                    source: error,
                });
            }

            let delay = self.backoff_delay(made);
            if !delay.is_zero() {
                sleep(delay);
            }
        }
    }
}

/// Validates documents against explicit or discovered schemas
pub struct StrictValidator {
    resolver: SchemaResolver,
    policy: RetryPolicy,
}

impl StrictValidator {
    /// The resolver compiles discovered schemas under the same `policy`
    pub fn new(resolver: SchemaResolver, policy: RetryPolicy) -> Self {
        Self {
            resolver: resolver.with_policy(policy.clone()),
            policy,
        }
    }

    /// Build the default locator chain from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::build(config, None)
    }

    /// Like [`from_config`](Self::from_config), with in-memory schemas consulted last
    pub fn from_config_with_bundle(config: &Config, bundle: BundleLocator) -> Result<Self> {
        Self::build(config, Some(bundle))
    }

    fn build(config: &Config, bundle: Option<BundleLocator>) -> Result<Self> {
        ConfigManager::validate_config(config)?;

        let http_client = if config.network.allow_remote {
            let client = HttpClient::new(config.network.to_http_config())
                .map_err(|err| ValidationError::Io(io::Error::other(err)))?;
            Some(client)
        } else {
            None
        };

        let mut locators: Vec<Box<dyn ResourceLocator>> = vec![
            Box::new(UriLocator::new(http_client)),
            Box::new(DirectoryLocator::new(config.resources.roots.clone())),
        ];
        if let Some(bundle) = bundle {
            locators.push(Box::new(bundle));
        }

        let cache = ParsedSchemaCache::new(config.cache.max_entries, config.cache.ttl());
        Ok(Self::new(
            SchemaResolver::new(locators, cache),
            config.retry.to_policy(),
        ))
    }

    pub fn with_policy(self, policy: RetryPolicy) -> Self {
        Self::new(self.resolver, policy)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    /// Validate against an explicit schema
    ///
    /// Each attempt asks the schema for a fresh validator, so concurrent
    /// callers sharing one schema never share validator state.
    pub fn validate<'d>(
        &self,
        document: &'d XmlDocument,
        schema: &dyn Schema,
    ) -> Result<&'d XmlDocument> {
        validate_against(&self.policy, document, schema)?;
        Ok(document)
    }

    /// Validate against the schema named by the document's `xsi:` hints
    pub fn validate_discovered<'d>(&self, document: &'d XmlDocument) -> Result<&'d XmlDocument> {
        let schema = self.resolver.resolve(document)?;
        tracing::debug!(
            document = %document.describe(),
            schema = schema.location().unwrap_or("<unnamed>"),
            "validating against discovered schema"
        );
        self.validate(document, schema.as_ref())
    }

    /// Validate with a caller-owned validator, reused across retries
    pub fn validate_with<'d>(
        &self,
        document: &'d XmlDocument,
        validator: &mut dyn Validator,
    ) -> Result<&'d XmlDocument> {
        let source = document.as_source();
        self.policy.run(|| validator.validate(&source))?;
        Ok(document)
    }
}

fn validate_against(
    policy: &RetryPolicy,
    document: &XmlDocument,
    schema: &dyn Schema,
) -> Result<()> {
    let source: Source = document.as_source();
    policy.run(|| schema.new_validator().validate(&source))
}

/// A document that has passed strict validation
///
/// The only way to obtain one is through a successful validation, so holding
/// a `StrictXml` is proof of validity against the schema used.
#[derive(Debug, Clone)]
pub struct StrictXml {
    document: XmlDocument,
}

impl StrictXml {
    /// Validate `document` against `schema` with the default retry policy
    pub fn new(document: XmlDocument, schema: &dyn Schema) -> Result<Self> {
        validate_against(&RetryPolicy::default(), &document, schema)?;
        Ok(Self { document })
    }

    /// Validate against the schema the document's hints point at
    ///
    /// Uses a validator built from the configuration
    /// [`ConfigManager::load_config`] finds: defaults, then a config file,
    /// then `STRICT_XML_*` variables. Callers that validate many documents
    /// should build one [`StrictValidator`] and use
    /// [`with_validator`](Self::with_validator) so compiled schemas are cached.
    pub fn discover(document: XmlDocument) -> Result<Self> {
        let config = ConfigManager::load_config(None)?;
        let validator = StrictValidator::from_config(&config)?;
        Self::with_validator(document, &validator, None)
    }

    /// Validate through `validator`, discovering the schema when none is given
    pub fn with_validator(
        document: XmlDocument,
        validator: &StrictValidator,
        schema: Option<&dyn Schema>,
    ) -> Result<Self> {
        match schema {
            Some(schema) => validator.validate(&document, schema)?,
            None => validator.validate_discovered(&document)?,
        };
        Ok(Self { document })
    }

    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    pub fn into_inner(self) -> XmlDocument {
        self.document
    }
}

impl Deref for StrictXml {
    type Target = XmlDocument;

    fn deref(&self) -> &XmlDocument {
        &self.document
    }
}

impl AsRef<XmlDocument> for StrictXml {
    fn as_ref(&self) -> &XmlDocument {
        &self.document
    }
}
