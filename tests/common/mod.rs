#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use strict_xml::{
    AttemptError, Config, RetryPolicy, Schema, Source, StrictValidator, Validator, XsdSchema,
};

/// Test fixture paths
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");

        Self { fixtures_dir }
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.fixtures_dir.join("schemas")
    }

    pub fn xml_dir(&self) -> PathBuf {
        self.fixtures_dir.join("xml")
    }

    pub fn payment_schema(&self) -> PathBuf {
        self.schemas_dir().join("payment.xsd")
    }

    pub fn quantity_schema(&self) -> PathBuf {
        self.schemas_dir().join("quantity.xsd")
    }

    pub fn xml(&self, name: &str) -> PathBuf {
        self.xml_dir().join(name)
    }
}

/// Retry policy without pauses, so retry tests stay fast
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        retry_delay: Duration::ZERO,
        max_retry_delay: Duration::ZERO,
        ..RetryPolicy::default()
    }
}

/// Validator that never touches the network and looks in the fixture schemas
pub fn local_validator() -> StrictValidator {
    let mut config = Config::default();
    config.network.allow_remote = false;
    config.resources.roots = vec![TestFixtures::new().schemas_dir()];

    StrictValidator::from_config(&config)
        .expect("fixture configuration is valid")
        .with_policy(fast_policy(3))
}

/// Schema wrapper whose validators fail with a transient I/O error for the
/// first `failures` attempts, then defer to the real schema
pub struct FlakySchema {
    inner: XsdSchema,
    failures: usize,
    kind: io::ErrorKind,
    attempts: Arc<AtomicUsize>,
}

impl FlakySchema {
    pub fn new(inner: XsdSchema, failures: usize) -> Self {
        Self::with_kind(inner, failures, io::ErrorKind::ConnectionReset)
    }

    pub fn with_kind(inner: XsdSchema, failures: usize, kind: io::ErrorKind) -> Self {
        Self {
            inner,
            failures,
            kind,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Schema for FlakySchema {
    fn new_validator(&self) -> Box<dyn Validator + '_> {
        Box::new(FlakyValidator {
            inner: self.inner.new_validator(),
            failures: self.failures,
            kind: self.kind,
            attempts: Arc::clone(&self.attempts),
        })
    }
}

struct FlakyValidator<'s> {
    inner: Box<dyn Validator + 's>,
    failures: usize,
    kind: io::ErrorKind,
    attempts: Arc<AtomicUsize>,
}

impl Validator for FlakyValidator<'_> {
    fn validate(&mut self, source: &Source) -> Result<(), AttemptError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(AttemptError::Io(io::Error::new(
                self.kind,
                format!("simulated failure on attempt {}", attempt),
            )));
        }
        self.inner.validate(source)
    }
}
