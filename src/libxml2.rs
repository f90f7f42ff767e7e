//! LibXML2 FFI Wrapper Module
//!
//! This module is the only place that talks to libxml2. It exposes three
//! capabilities and nothing more: compiling a schema from bytes, parsing a
//! document from memory, and validating a parsed document against a compiled
//! schema. Everything above it works with safe Rust types.
//!
//! ## Thread Safety Strategy
//!
//! According to the libxml2 threading notes (http://xmlsoft.org/threads.html):
//!
//! - **Schema parsing** is NOT thread-safe and is serialized here behind a
//!   process-wide lock.
//! - **Compiled schemas** are read-only after parsing and may be shared
//!   across threads.
//! - **Validation contexts** are NOT shareable. Every call to
//!   [`LibXml2Wrapper::validate_source`] creates its own context and its own
//!   parsed copy of the document, and frees both before returning. Two
//!   threads validating against the same [`XmlSchemaPtr`] therefore never
//!   touch each other's state.
//! - **Diagnostics** raised outside a context callback (document parser,
//!   `xs:import` loads) go to the thread-local structured error handler,
//!   which each call installs for its own duration.

use std::ffi::{CStr, CString};
use std::io;
use std::marker::PhantomData;
use std::ptr;
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int, c_void};
use url::Url;

use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// Serializes schema compilation across the process
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

/// Forbid network access while parsing instance documents
const XML_PARSE_NONET: c_int = 1 << 11;
/// Ignore the `encoding=` pseudo-attribute; content is always UTF-8 here
const XML_PARSE_IGNORE_ENC: c_int = 1 << 21;

// libxml2 xmlErrorDomain values
const XML_FROM_IO: c_int = 8;
const XML_FROM_FTP: c_int = 9;
const XML_FROM_HTTP: c_int = 10;

// libxml2 xmlParserErrors values reported when a schema document cannot be loaded
const XML_IO_ENOENT: c_int = 1524;
const XML_SCHEMAP_FAILED_LOAD: c_int = 1757;
const XML_SCHEMAP_WARN_UNLOCATED_SCHEMA: c_int = 3084;

/// ## Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);

    // Document parsing
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    // Schema parsing functions
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaNewDocParserCtxt(doc: *mut XmlDoc) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;
}

#[allow(non_camel_case_types)]
#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

/// A single diagnostic reported by libxml2 through the structured error hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineMessage {
    pub domain: i32,
    pub code: i32,
    pub line: i32,
    pub message: String,
}

impl EngineMessage {
    /// Whether libxml2 raised this while doing I/O rather than checking content
    pub fn is_io(&self) -> bool {
        matches!(self.domain, XML_FROM_IO | XML_FROM_FTP | XML_FROM_HTTP)
    }

    /// Whether the schema parser gave up on a document it could not load
    fn is_schema_load(&self) -> bool {
        matches!(
            self.code,
            XML_SCHEMAP_FAILED_LOAD | XML_SCHEMAP_WARN_UNLOCATED_SCHEMA
        )
    }

    fn names_remote_resource(&self) -> bool {
        ["http://", "https://", "ftp://"]
            .iter()
            .any(|scheme| self.message.contains(scheme))
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self.domain {
            XML_FROM_FTP | XML_FROM_HTTP => io::ErrorKind::NetworkUnreachable,
            _ if self.names_remote_resource() => io::ErrorKind::NetworkUnreachable,
            _ if self.code == XML_IO_ENOENT => io::ErrorKind::NotFound,
            _ => io::ErrorKind::Other,
        }
    }
}

/// Pick the I/O diagnostic that explains a failure, preferring network ones
fn io_failure(messages: &[EngineMessage]) -> Option<(io::ErrorKind, String)> {
    let io_messages: Vec<&EngineMessage> = messages.iter().filter(|m| m.is_io()).collect();
    let chosen = io_messages
        .iter()
        .find(|m| m.io_kind() == io::ErrorKind::NetworkUnreachable)
        .or_else(|| io_messages.first())?;
    Some((chosen.io_kind(), chosen.message.clone()))
}

/// Callback for libxml2 to report errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    let messages = unsafe { &mut *(user_data as *mut Vec<EngineMessage>) };

    if error.is_null() {
        return;
    }

    let (domain, code, line, msg_ptr) =
        unsafe { ((*error).domain, (*error).code, (*error).line, (*error).message) };
    if msg_ptr.is_null() {
        return;
    }

    let c_str = unsafe { CStr::from_ptr(msg_ptr) };
    messages.push(EngineMessage {
        domain,
        code,
        line,
        message: c_str.to_string_lossy().trim().to_string(),
    });
}

/// Collects every libxml2 diagnostic raised on the current thread until dropped
///
/// libxml2 keeps its structured error handler in thread-local state, so the
/// sink never sees another thread's messages. Dropping it restores the
/// default handler.
struct DiagnosticSink {
    messages: *mut Vec<EngineMessage>,
}

impl DiagnosticSink {
    fn install() -> Self {
        let messages = Box::into_raw(Box::new(Vec::new()));
        unsafe {
            xmlSetStructuredErrorFunc(messages as *mut c_void, Some(structured_error_callback));
        }
        DiagnosticSink { messages }
    }

    /// User data for context-level structured error hooks
    fn user_data(&self) -> *mut c_void {
        self.messages as *mut c_void
    }

    fn take(&mut self) -> Vec<EngineMessage> {
        // Safety: libxml2 only writes through the pointer during calls made
        // on this thread, and none is in progress here.
        unsafe { std::mem::take(&mut *self.messages) }
    }
}

impl Drop for DiagnosticSink {
    fn drop(&mut self) {
        unsafe {
            xmlSetStructuredErrorFunc(ptr::null_mut(), None);
            drop(Box::from_raw(self.messages));
        }
    }
}

/// Thread-safe wrapper for a compiled libxml2 schema
///
/// Owns the schema and, when the schema was compiled against a base URL, the
/// parsed schema document it was built from. Both are freed on last drop.
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    doc: *mut XmlDoc,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: compiled xmlSchema structures are read-only after parsing, and the
// backing document is never touched again once the schema is built.
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// `ptr` must come from `xmlSchemaParse`, `doc` must be null or the
    /// document the schema was parsed from, and nothing else may free either.
    unsafe fn from_raw(ptr: *mut XmlSchema, doc: *mut XmlDoc) -> Self {
        XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                doc,
                _phantom: PhantomData,
            }),
        }
    }

    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    /// Check if the schema pointer is valid (non-null)
    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        unsafe {
            if !self.ptr.is_null() {
                xmlSchemaFree(self.ptr);
                self.ptr = ptr::null_mut();
            }
            if !self.doc.is_null() {
                xmlFreeDoc(self.doc);
                self.doc = ptr::null_mut();
            }
        }
    }
}

/// Raw outcome of one libxml2 validation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// Return code 0
    Valid,
    /// Return code > 0 with schema-rule diagnostics
    Invalid { messages: Vec<String> },
    /// libxml2 reported I/O trouble while validating
    IoFailure { kind: io::ErrorKind, message: String },
    /// Return code < 0 without I/O diagnostics
    InternalError { code: i32, messages: Vec<String> },
}

impl EngineOutcome {
    /// Classify a libxml2 return code together with the diagnostics captured
    /// during the same run
    pub fn classify(code: c_int, messages: Vec<EngineMessage>) -> Self {
        if code == 0 {
            return EngineOutcome::Valid;
        }

        if let Some((kind, message)) = io_failure(&messages) {
            return EngineOutcome::IoFailure { kind, message };
        }

        let texts = messages.into_iter().map(|m| m.message).collect();
        if code > 0 {
            EngineOutcome::Invalid { messages: texts }
        } else {
            EngineOutcome::InternalError {
                code,
                messages: texts,
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, EngineOutcome::Valid)
    }
}

/// Safe entry point to the libxml2 capabilities used by this crate
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Create a wrapper, initialising libxml2 exactly once per process
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Compile an XML schema from bytes
    ///
    /// With a `base` URL the schema document is parsed under that URL, so
    /// relative `xs:include` and `xs:import` locations resolve against it.
    /// Without one, relative locations resolve against the working directory.
    pub fn compile_schema(
        &self,
        schema_data: &[u8],
        base: Option<&Url>,
    ) -> LibXml2Result<XmlSchemaPtr> {
        let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::InputTooLarge {
            size: schema_data.len(),
        })?;
        let base_url = base
            .map(|url| {
                CString::new(url.as_str()).map_err(|_| LibXml2Error::InvalidBaseUrl {
                    url: url.to_string(),
                })
            })
            .transpose()?;

        let _guard = SCHEMA_PARSE_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut sink = DiagnosticSink::install();

        unsafe {
            let (parser_ctxt, schema_doc) = match &base_url {
                Some(url) => {
                    let doc = xmlReadMemory(
                        schema_data.as_ptr() as *const c_char,
                        size,
                        url.as_ptr(),
                        ptr::null(),
                        0,
                    );
                    if doc.is_null() {
                        let mut messages: Vec<String> =
                            sink.take().into_iter().map(|m| m.message).collect();
                        messages.push(format!("{} is not well-formed XML", url.to_string_lossy()));
                        return Err(LibXml2Error::SchemaParseFailed { messages });
                    }
                    let ctxt = xmlSchemaNewDocParserCtxt(doc);
                    if ctxt.is_null() {
                        xmlFreeDoc(doc);
                    }
                    (ctxt, doc)
                }
                None => (
                    xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size),
                    ptr::null_mut(),
                ),
            };

            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(structured_error_callback),
                sink.user_data(),
            );

            let schema_ptr = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);

            if schema_ptr.is_null() {
                if !schema_doc.is_null() {
                    xmlFreeDoc(schema_doc);
                }
                return Err(compile_failure(sink.take()));
            }

            Ok(XmlSchemaPtr::from_raw(schema_ptr, schema_doc))
        }
    }

    /// Validate in-memory XML content against a compiled schema
    ///
    /// Safe to call concurrently with the same `schema`: the content is parsed
    /// into a private document and checked with a private validation context.
    pub fn validate_source(
        &self,
        schema: &XmlSchemaPtr,
        content: &[u8],
        base: Option<&Url>,
    ) -> LibXml2Result<EngineOutcome> {
        let size = c_int::try_from(content.len()).map_err(|_| LibXml2Error::InputTooLarge {
            size: content.len(),
        })?;
        let base_url = base
            .map(|url| {
                CString::new(url.as_str()).map_err(|_| LibXml2Error::InvalidBaseUrl {
                    url: url.to_string(),
                })
            })
            .transpose()?;

        let mut sink = DiagnosticSink::install();

        unsafe {
            let doc = xmlReadMemory(
                content.as_ptr() as *const c_char,
                size,
                base_url.as_ref().map_or(ptr::null(), |url| url.as_ptr()),
                c"UTF-8".as_ptr(),
                XML_PARSE_NONET | XML_PARSE_IGNORE_ENC,
            );
            if doc.is_null() {
                let messages = sink.take();
                if let Some((kind, message)) = io_failure(&messages) {
                    return Ok(EngineOutcome::IoFailure { kind, message });
                }
                return Err(LibXml2Error::DocumentParseFailed {
                    details: details_or_default(messages, "not well-formed"),
                });
            }

            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                xmlFreeDoc(doc);
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            // Parser warnings on an accepted document are not violations
            sink.take();
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                sink.user_data(),
            );

            let result_code = xmlSchemaValidateDoc(valid_ctxt, doc);

            xmlSchemaFreeValidCtxt(valid_ctxt);
            xmlFreeDoc(doc);

            Ok(EngineOutcome::classify(result_code, sink.take()))
        }
    }
}

/// Turn the diagnostics of a failed `xmlSchemaParse` into an error
///
/// A schema whose `xs:include` or `xs:import` targets could not be fetched is
/// an I/O failure, not a broken schema.
fn compile_failure(messages: Vec<EngineMessage>) -> LibXml2Error {
    if let Some((kind, message)) = io_failure(&messages) {
        return LibXml2Error::ResourceUnavailable { kind, message };
    }

    if let Some(load) = messages.iter().find(|m| m.is_schema_load()) {
        let kind = if load.names_remote_resource() {
            io::ErrorKind::NetworkUnreachable
        } else {
            io::ErrorKind::NotFound
        };
        return LibXml2Error::ResourceUnavailable {
            kind,
            message: load.message.clone(),
        };
    }

    LibXml2Error::SchemaParseFailed {
        messages: messages.into_iter().map(|m| m.message).collect(),
    }
}

fn details_or_default(messages: Vec<EngineMessage>, fallback: &str) -> String {
    if messages.is_empty() {
        return fallback.to_string();
    }
    messages
        .into_iter()
        .map(|m| format!("line {}: {}", m.line, m.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}
