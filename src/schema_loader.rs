//! Schema discovery from in-document hints
//!
//! A hinted location is handed to each [`ResourceLocator`] in turn until one
//! of them produces bytes. The built-in chain is:
//!
//! 1. [`UriLocator`]: absolute `http`, `https` and `file` URIs, and relative
//!    locations joined onto the document's own URL when it has one.
//! 2. [`DirectoryLocator`]: relative locations looked up under configured
//!    resource roots, the way bundled resources are found on a search path.
//! 3. [`BundleLocator`]: named resources registered in memory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::cache::ParsedSchemaCache;
use crate::document::{
    SchemaLocationHint, XmlDocument, parse_no_namespace_location, parse_schema_location,
};
use crate::error::{FetchError, FetchResult, LocatorFailure, Result, ValidationError};
use crate::http_client::HttpClient;
use crate::libxml2::LibXml2Wrapper;
use crate::schema::XsdSchema;
use crate::validator::RetryPolicy;

/// Schema bytes produced by a locator
#[derive(Debug, Clone)]
pub struct LoadedSchema {
    /// Resolved identifier of the schema (URL, path or resource name)
    pub location: String,
    pub data: Vec<u8>,
    /// URL relative imports inside the schema resolve against
    pub base: Option<Url>,
}

/// One strategy for turning a hinted location into schema bytes
pub trait ResourceLocator: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means this locator does not know the location
    fn locate(&self, location: &str, base: Option<&Url>) -> FetchResult<Option<LoadedSchema>>;
}

/// Fetches absolute URIs and locations relative to the document URL
pub struct UriLocator {
    http_client: Option<HttpClient>,
}

impl UriLocator {
    /// `http_client` of `None` disables remote fetching
    pub fn new(http_client: Option<HttpClient>) -> Self {
        Self { http_client }
    }

    fn target(location: &str, base: Option<&Url>) -> Option<Url> {
        match Url::parse(location) {
            // Single-letter schemes are Windows drive letters, not URIs
            Ok(url) if url.scheme().len() > 1 => Some(url),
            _ => base.and_then(|base| base.join(location).ok()),
        }
    }
}

impl ResourceLocator for UriLocator {
    fn name(&self) -> &str {
        "uri"
    }

    fn locate(&self, location: &str, base: Option<&Url>) -> FetchResult<Option<LoadedSchema>> {
        let Some(url) = Self::target(location, base) else {
            return Ok(None);
        };

        match url.scheme() {
            "http" | "https" => {
                let client = self
                    .http_client
                    .as_ref()
                    .ok_or_else(|| FetchError::RemoteDisabled {
                        url: url.to_string(),
                    })?;
                let data = client.download_schema(url.as_str())?;
                Ok(Some(LoadedSchema {
                    location: url.to_string(),
                    data,
                    base: Some(url),
                }))
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| FetchError::UnsupportedScheme {
                        url: url.to_string(),
                    })?;
                read_schema_file(path, url).map(Some)
            }
            _ => Err(FetchError::UnsupportedScheme {
                url: url.to_string(),
            }),
        }
    }
}

fn read_schema_file(path: PathBuf, url: Url) -> FetchResult<LoadedSchema> {
    let data = std::fs::read(&path).map_err(|source| FetchError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(LoadedSchema {
        location: path.display().to_string(),
        data,
        base: Some(url),
    })
}

/// Looks relative locations up under a list of resource roots
pub struct DirectoryLocator {
    roots: Vec<PathBuf>,
}

impl DirectoryLocator {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl ResourceLocator for DirectoryLocator {
    fn name(&self) -> &str {
        "resources"
    }

    fn locate(&self, location: &str, _base: Option<&Url>) -> FetchResult<Option<LoadedSchema>> {
        let relative = location.trim_start_matches('/');
        for root in &self.roots {
            let candidate = root.join(relative);
            if !candidate.is_file() {
                continue;
            }
            let canonical = candidate.canonicalize().map_err(|source| FetchError::Io {
                path: candidate.display().to_string(),
                source,
            })?;
            let Ok(url) = Url::from_file_path(&canonical) else {
                continue;
            };
            return read_schema_file(canonical, url).map(Some);
        }
        Ok(None)
    }
}

/// Named schema resources held in memory
#[derive(Default)]
pub struct BundleLocator {
    resources: HashMap<String, Arc<[u8]>>,
}

impl BundleLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.resources
            .insert(name.into(), Arc::from(data.into().into_boxed_slice()));
        self
    }
}

impl ResourceLocator for BundleLocator {
    fn name(&self) -> &str {
        "bundle"
    }

    fn locate(&self, location: &str, _base: Option<&Url>) -> FetchResult<Option<LoadedSchema>> {
        let key = location.trim_start_matches('/');
        Ok(self.resources.get(key).map(|data| LoadedSchema {
            location: format!("bundle:{}", key),
            data: data.to_vec(),
            base: None,
        }))
    }
}

/// Resolves the schema a document asks for through its `xsi:` hints
pub struct SchemaResolver {
    locators: Vec<Box<dyn ResourceLocator>>,
    cache: ParsedSchemaCache,
    policy: RetryPolicy,
}

impl SchemaResolver {
    pub fn new(locators: Vec<Box<dyn ResourceLocator>>, cache: ParsedSchemaCache) -> Self {
        // Make sure libxml2 is initialised before any thread compiles
        let _ = LibXml2Wrapper::new();
        Self {
            locators,
            cache,
            policy: RetryPolicy::default(),
        }
    }

    /// Retry policy for compiling schemas whose imports fail to load
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &ParsedSchemaCache {
        &self.cache
    }

    pub fn locator_names(&self) -> Vec<&str> {
        self.locators.iter().map(|locator| locator.name()).collect()
    }

    /// Find and compile the schema a document points at
    ///
    /// `xsi:schemaLocation` pairs are tried first, in order, falling back to
    /// `xsi:noNamespaceSchemaLocation`. The first location any locator can
    /// load wins; failures of earlier locations are only reported when every
    /// location fails.
    pub fn resolve(&self, document: &XmlDocument) -> Result<Arc<XsdSchema>> {
        let candidates = Self::candidates(document)?;
        let base = document.base();

        let mut attempted = Vec::with_capacity(candidates.len());
        let mut failures = Vec::new();

        for hint in &candidates {
            let location = hint.location();
            let key = ParsedSchemaCache::key(base, location);
            if let Some(schema) = self.cache.get(&key) {
                tracing::debug!(location, "schema served from cache");
                return Ok(schema);
            }

            attempted.push(location.to_string());
            let Some(loaded) = self.load(location, base, &mut failures) else {
                continue;
            };

            let schema = Arc::new(self.compile(loaded)?);
            self.cache.insert(key, Arc::clone(&schema));
            return Ok(schema);
        }

        Err(ValidationError::SchemaUnresolvable {
            attempted,
            failures,
        })
    }

    fn candidates(document: &XmlDocument) -> Result<Vec<SchemaLocationHint>> {
        let hints = document.schema_hints();

        if !hints.schema_locations.is_empty() {
            let mut pairs = Vec::new();
            for value in &hints.schema_locations {
                pairs.extend(parse_schema_location(value)?);
            }
            return Ok(pairs);
        }

        if let Some(value) = &hints.no_namespace_location {
            return Ok(vec![parse_no_namespace_location(value)?]);
        }

        Err(ValidationError::SchemaLocationMissing {
            document: document.describe(),
        })
    }

    fn load(
        &self,
        location: &str,
        base: Option<&Url>,
        failures: &mut Vec<LocatorFailure>,
    ) -> Option<LoadedSchema> {
        for locator in &self.locators {
            match locator.locate(location, base) {
                Ok(Some(loaded)) => {
                    tracing::debug!(
                        location,
                        locator = locator.name(),
                        resolved = %loaded.location,
                        "schema location resolved"
                    );
                    return Some(loaded);
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::debug!(location, locator = locator.name(), %error, "schema locator failed");
                    failures.push(LocatorFailure {
                        location: location.to_string(),
                        locator: locator.name().to_string(),
                        error,
                    });
                }
            }
        }
        None
    }

    fn compile(&self, loaded: LoadedSchema) -> Result<XsdSchema> {
        XsdSchema::compile_with_policy(
            &loaded.data,
            loaded.base.as_ref(),
            Some(loaded.location.clone()),
            &self.policy,
        )
        .map_err(|err| match err {
            ValidationError::MalformedInput { details, .. } => {
                ValidationError::SchemaUncompilable {
                    location: loaded.location,
                    details,
                }
            }
            other => other,
        })
    }
}
