//! Prefix to namespace URI lookup for namespace-qualified queries
//!
//! A [`NamespaceResolver`] never changes after construction. [`add`] and
//! [`merge`] build a new resolver that shares the old one's data; the old
//! resolver keeps answering exactly as before, so resolvers can be handed to
//! any number of threads without locking.
//!
//! [`add`]: NamespaceResolver::add
//! [`merge`]: NamespaceResolver::merge

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::NamespaceError;

/// Reserved `xml` prefix
pub const XML_NS_PREFIX: &str = "xml";
/// URI permanently bound to the `xml` prefix
pub const XML_NS_URI: &str = "http://www.w3.org/XML/1998/namespace";
/// Reserved `xmlns` prefix
pub const XMLNS_ATTRIBUTE: &str = "xmlns";
/// URI permanently bound to the `xmlns` prefix
pub const XMLNS_ATTRIBUTE_NS_URI: &str = "http://www.w3.org/2000/xmlns/";
/// Returned for prefixes bound to nothing
pub const NULL_NS_URI: &str = "";

/// Prefixes every default resolver starts with
pub const DEFAULT_NAMESPACES: [(&str, &str); 5] = [
    ("xhtml", "http://www.w3.org/1999/xhtml"),
    ("xs", "http://www.w3.org/2001/XMLSchema"),
    ("xsi", "http://www.w3.org/2001/XMLSchema-instance"),
    ("xsl", "http://www.w3.org/1999/XSL/Transform"),
    ("svg", "http://www.w3.org/2000/svg"),
];

/// Lookup capability a resolver can delegate to
pub trait NamespaceLookup: Send + Sync {
    /// URI bound to `prefix`, `None` when unbound
    fn lookup(&self, prefix: &str) -> Option<&str>;

    /// Every prefix bound to `uri`
    fn prefixes_for(&self, uri: &str) -> Vec<String>;
}

/// Immutable prefix to namespace URI table with delegation
///
/// `NamespaceResolver::new()` (and `default()`) knows these prefixes:
///
/// | prefix  | namespace                                   |
/// |---------|---------------------------------------------|
/// | `xhtml` | `http://www.w3.org/1999/xhtml`              |
/// | `xs`    | `http://www.w3.org/2001/XMLSchema`          |
/// | `xsi`   | `http://www.w3.org/2001/XMLSchema-instance` |
/// | `xsl`   | `http://www.w3.org/1999/XSL/Transform`      |
/// | `svg`   | `http://www.w3.org/2000/svg`                |
///
/// `xml` and `xmlns` always resolve to their fixed URIs, after the local
/// table and every delegate have been consulted.
#[derive(Clone)]
pub struct NamespaceResolver {
    map: Arc<IndexMap<String, String>>,
    contexts: Arc<[Arc<dyn NamespaceLookup>]>,
}

impl NamespaceResolver {
    pub fn new() -> Self {
        Self::from_map(
            DEFAULT_NAMESPACES
                .iter()
                .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
                .collect(),
        )
    }

    /// A resolver with no prefixes of its own
    pub fn empty() -> Self {
        Self::from_map(IndexMap::new())
    }

    /// Bind `ns1`, `ns2`, ... to the given URIs in order
    ///
    /// The default prefixes are not included.
    pub fn from_namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        Self::from_map(
            namespaces
                .into_iter()
                .enumerate()
                .map(|(pos, uri)| (format!("ns{}", pos + 1), uri.to_string()))
                .collect(),
        )
    }

    fn from_map(map: IndexMap<String, String>) -> Self {
        Self {
            map: Arc::new(map),
            contexts: Arc::from(Vec::new()),
        }
    }

    /// Namespace URI for `prefix`, or [`NULL_NS_URI`] when unbound
    pub fn namespace_uri(&self, prefix: &str) -> &str {
        self.lookup(prefix)
            .or_else(|| reserved_uri(prefix))
            .unwrap_or(NULL_NS_URI)
    }

    /// Some prefix bound to `uri`
    ///
    /// When several prefixes share a URI, which one is returned is not part
    /// of the contract.
    pub fn prefix(&self, uri: &str) -> Option<String> {
        self.prefixes(uri).into_iter().next()
    }

    /// Every prefix bound to `uri`: local bindings in insertion order, then
    /// each delegate's in merge order, then the reserved prefixes
    pub fn prefixes(&self, uri: &str) -> Vec<String> {
        let mut prefixes = self.prefixes_for(uri);
        if uri == XML_NS_URI {
            prefixes.push(XML_NS_PREFIX.to_string());
        }
        if uri == XMLNS_ATTRIBUTE_NS_URI {
            prefixes.push(XMLNS_ATTRIBUTE.to_string());
        }
        prefixes
    }

    /// New resolver with one more local binding
    ///
    /// Fails when `prefix` is already bound in this resolver's own table.
    /// Prefixes known only through delegates may be shadowed. Delegates are
    /// carried over unchanged.
    pub fn add(&self, prefix: &str, namespace: impl fmt::Display) -> Result<Self, NamespaceError> {
        if let Some(existing) = self.map.get(prefix) {
            return Err(NamespaceError::AlreadyRegistered {
                prefix: prefix.to_string(),
                namespace: existing.clone(),
            });
        }

        let mut map = IndexMap::clone(&self.map);
        map.insert(prefix.to_string(), namespace.to_string());
        Ok(Self {
            map: Arc::new(map),
            contexts: Arc::clone(&self.contexts),
        })
    }

    /// New resolver that falls back to `context` after its current delegates
    pub fn merge<C>(&self, context: C) -> Self
    where
        C: NamespaceLookup + 'static,
    {
        self.merge_shared(Arc::new(context))
    }

    pub fn merge_shared(&self, context: Arc<dyn NamespaceLookup>) -> Self {
        let mut contexts = Vec::with_capacity(self.contexts.len() + 1);
        contexts.extend(self.contexts.iter().cloned());
        contexts.push(context);
        Self {
            map: Arc::clone(&self.map),
            contexts: Arc::from(contexts),
        }
    }

    /// Prefixes bound locally, in insertion order
    pub fn local_prefixes(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }
}

fn reserved_uri(prefix: &str) -> Option<&'static str> {
    match prefix {
        XML_NS_PREFIX => Some(XML_NS_URI),
        XMLNS_ATTRIBUTE => Some(XMLNS_ATTRIBUTE_NS_URI),
        _ => None,
    }
}

impl NamespaceLookup for NamespaceResolver {
    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.map.get(prefix).map(String::as_str).or_else(|| {
            self.contexts
                .iter()
                .find_map(|context| context.lookup(prefix))
        })
    }

    fn prefixes_for(&self, uri: &str) -> Vec<String> {
        let mut prefixes: Vec<String> = self
            .map
            .iter()
            .filter(|(_, value)| value.as_str() == uri)
            .map(|(prefix, _)| prefix.clone())
            .collect();
        for context in self.contexts.iter() {
            prefixes.extend(context.prefixes_for(uri));
        }
        prefixes
    }
}

impl NamespaceLookup for IndexMap<String, String> {
    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.get(prefix).map(String::as_str)
    }

    fn prefixes_for(&self, uri: &str) -> Vec<String> {
        self.iter()
            .filter(|(_, value)| value.as_str() == uri)
            .map(|(prefix, _)| prefix.clone())
            .collect()
    }
}

impl Default for NamespaceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NamespaceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (pos, prefix) in self.local_prefixes().enumerate() {
            if pos > 0 {
                f.write_str(", ")?;
            }
            f.write_str(prefix)?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for NamespaceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceResolver")
            .field("map", &self.map)
            .field("delegates", &self.contexts.len())
            .finish()
    }
}
