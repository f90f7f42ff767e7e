//! Immutable XML documents and the schema-location hints they carry

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use roxmltree::{Document, ParsingOptions};
use url::Url;

use crate::error::{Result, ValidationError};

/// Namespace of the `xsi:` hint attributes
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// An immutable, well-formed XML document
///
/// The text is checked for well-formedness on construction and never changes
/// afterwards. Clones share the same text.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    content: Arc<str>,
    base: Option<Url>,
    root_name: String,
    hints: SchemaHints,
}

impl XmlDocument {
    /// Parse a document from text
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        Self::build(Arc::from(text.into()), None, "<memory>")
    }

    /// Parse a document from UTF-8 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| ValidationError::MalformedInput {
            source_name: "<memory>".to_string(),
            details: format!("document is not valid UTF-8: {}", e),
        })?;
        Self::parse(text)
    }

    /// Read and parse a document from disk
    ///
    /// The canonical `file:` URL of the path becomes the document's base, so
    /// relative schema hints resolve next to the file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let canonical = path.canonicalize()?;
        let base = Url::from_file_path(&canonical).map_err(|_| ValidationError::MalformedInput {
            source_name: path.display().to_string(),
            details: "path cannot be expressed as a file URL".to_string(),
        })?;
        Self::build(Arc::from(text), Some(base), &path.display().to_string())
    }

    /// Same document, resolved against a different base URL
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    fn build(content: Arc<str>, base: Option<Url>, source_name: &str) -> Result<Self> {
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let tree = Document::parse_with_options(&content, options).map_err(|e| {
            ValidationError::MalformedInput {
                source_name: source_name.to_string(),
                details: e.to_string(),
            }
        })?;

        let root_name = tree.root_element().tag_name().name().to_string();
        let hints = SchemaHints::collect(&tree);
        drop(tree);

        Ok(Self {
            content,
            base,
            root_name,
            hints,
        })
    }

    /// Validation-ready view of this document
    pub fn as_source(&self) -> Source {
        Source {
            content: Arc::clone(&self.content),
            system_id: self.base.clone(),
        }
    }

    pub fn text(&self) -> &str {
        &self.content
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Local name of the root element
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn schema_hints(&self) -> &SchemaHints {
        &self.hints
    }

    /// Short human label used in error messages
    pub fn describe(&self) -> String {
        match &self.base {
            Some(base) => base.to_string(),
            None => format!("<{}> document", self.root_name),
        }
    }
}

impl fmt::Display for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// What a validator reads: the document text plus where it came from
#[derive(Debug, Clone)]
pub struct Source {
    content: Arc<str>,
    system_id: Option<Url>,
}

impl Source {
    pub fn new(content: impl Into<String>, system_id: Option<Url>) -> Self {
        Self {
            content: Arc::from(content.into()),
            system_id,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn system_id(&self) -> Option<&Url> {
        self.system_id.as_ref()
    }
}

/// Raw `xsi:` hint attribute values found in a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaHints {
    /// Every `xsi:schemaLocation` value, in document order
    pub schema_locations: Vec<String>,
    /// The first `xsi:noNamespaceSchemaLocation` value
    pub no_namespace_location: Option<String>,
}

impl SchemaHints {
    fn collect(tree: &Document<'_>) -> Self {
        let mut hints = SchemaHints::default();
        for element in tree.descendants().filter(|node| node.is_element()) {
            if let Some(value) = element.attribute((XSI_NAMESPACE, "schemaLocation")) {
                hints.schema_locations.push(value.to_string());
            }
            if hints.no_namespace_location.is_none() {
                if let Some(value) = element.attribute((XSI_NAMESPACE, "noNamespaceSchemaLocation"))
                {
                    hints.no_namespace_location = Some(value.to_string());
                }
            }
        }
        hints
    }

    pub fn is_empty(&self) -> bool {
        self.schema_locations.is_empty() && self.no_namespace_location.is_none()
    }
}

/// One schema location a document points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaLocationHint {
    Namespaced { namespace: String, location: String },
    NoNamespace { location: String },
}

impl SchemaLocationHint {
    pub fn location(&self) -> &str {
        match self {
            SchemaLocationHint::Namespaced { location, .. }
            | SchemaLocationHint::NoNamespace { location } => location,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            SchemaLocationHint::Namespaced { namespace, .. } => Some(namespace),
            SchemaLocationHint::NoNamespace { .. } => None,
        }
    }
}

fn tokens(value: &str) -> Vec<&str> {
    value
        .split([' ', '\t', '\n', '\r'])
        .filter(|token| !token.is_empty())
        .collect()
}

/// Split an `xsi:schemaLocation` value into `(namespace, location)` pairs
pub fn parse_schema_location(value: &str) -> Result<Vec<SchemaLocationHint>> {
    let tokens = tokens(value);
    if tokens.is_empty() {
        return Err(ValidationError::SchemaLocationMalformed {
            hint: value.to_string(),
            details: "xsi:schemaLocation is empty".to_string(),
        });
    }
    if tokens.len() % 2 != 0 {
        return Err(ValidationError::SchemaLocationMalformed {
            hint: value.to_string(),
            details: format!(
                "xsi:schemaLocation needs namespace/location pairs, found {} token(s)",
                tokens.len()
            ),
        });
    }

    Ok(tokens
        .chunks(2)
        .map(|pair| SchemaLocationHint::Namespaced {
            namespace: pair[0].to_string(),
            location: pair[1].to_string(),
        })
        .collect())
}

/// Read an `xsi:noNamespaceSchemaLocation` value, which must be one token
pub fn parse_no_namespace_location(value: &str) -> Result<SchemaLocationHint> {
    match tokens(value).as_slice() {
        [location] => Ok(SchemaLocationHint::NoNamespace {
            location: location.to_string(),
        }),
        other => Err(ValidationError::SchemaLocationMalformed {
            hint: value.to_string(),
            details: format!(
                "xsi:noNamespaceSchemaLocation needs exactly one location, found {} token(s)",
                other.len()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_well_formed() {
        let doc = XmlDocument::parse("<root>hello</root>").unwrap();
        assert_eq!(doc.root_name(), "root");
        assert_eq!(doc.text(), "<root>hello</root>");
        assert!(doc.schema_hints().is_empty());
        assert!(doc.base().is_none());
    }

    #[test]
    fn test_parse_malformed() {
        let error = XmlDocument::parse("<root><open></root>").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_from_bytes_rejects_invalid_utf8() {
        let error = XmlDocument::from_bytes(&[0x3c, 0xFF, 0xFE]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_collects_hints() {
        let doc = XmlDocument::parse(
            r#"<payment xmlns="urn:example:payment"
                xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                xsi:schemaLocation="urn:example:payment payment.xsd">
                <note xsi:noNamespaceSchemaLocation="note.xsd"/>
            </payment>"#,
        )
        .unwrap();

        let hints = doc.schema_hints();
        assert_eq!(hints.schema_locations, vec!["urn:example:payment payment.xsd"]);
        assert_eq!(hints.no_namespace_location.as_deref(), Some("note.xsd"));
    }

    #[test]
    fn test_ignores_unprefixed_schema_location() {
        let doc = XmlDocument::parse(r#"<root schemaLocation="a b"/>"#).unwrap();
        assert!(doc.schema_hints().is_empty());
    }

    #[test]
    fn test_parse_schema_location_pairs() {
        let hints = parse_schema_location("urn:a  a.xsd\n\turn:b b.xsd").unwrap();
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].namespace(), Some("urn:a"));
        assert_eq!(hints[0].location(), "a.xsd");
        assert_eq!(hints[1].location(), "b.xsd");
    }

    #[test]
    fn test_parse_schema_location_odd_tokens() {
        let error = parse_schema_location("urn:a a.xsd urn:b").unwrap_err();
        match error {
            ValidationError::SchemaLocationMalformed { details, .. } => {
                assert!(details.contains("3 token(s)"))
            }
            other => panic!("Expected SchemaLocationMalformed, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_schema_location_empty() {
        let error = parse_schema_location("   ").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::SchemaLocationMalformed);
    }

    #[test]
    fn test_parse_no_namespace_location() {
        assert_eq!(
            parse_no_namespace_location(" schema.xsd ").unwrap(),
            SchemaLocationHint::NoNamespace {
                location: "schema.xsd".to_string()
            }
        );
        assert!(parse_no_namespace_location("a.xsd b.xsd").is_err());
    }

    #[test]
    fn test_from_path_sets_file_base() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "<root/>").unwrap();
        file.flush().unwrap();

        let doc = XmlDocument::from_path(file.path()).unwrap();
        let base = doc.base().unwrap();
        assert_eq!(base.scheme(), "file");
        assert_eq!(doc.describe(), base.to_string());
    }

    #[test]
    fn test_source_shares_content() {
        let doc = XmlDocument::parse("<root/>").unwrap();
        let source = doc.as_source();
        assert_eq!(source.content(), doc.text());
        assert!(source.system_id().is_none());
    }
}
