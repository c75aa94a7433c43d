//! Error types shared by every stage of the pipeline.

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A position in an entity, snapshotted at error-report time from the
/// *outermost* enclosing entity (not the innermost expansion), per the
/// propagation policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locator {
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    pub line: u64,
    pub column: u64,
}

impl Locator {
    pub fn new() -> Self {
        Self {
            system_id: None,
            public_id: None,
            line: 1,
            column: 1,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.system_id, &self.public_id) {
            (Some(sid), _) => write!(f, "{}:{}:{}", sid, self.line, self.column),
            _ => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Whether a constraint violation stops the parse or merely gets reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A Well-Formedness Constraint violation or lexical error. Parsing stops.
    Fatal,
    /// A Validity Constraint violation. Parsing continues.
    Recoverable,
    /// Informational; never stops anything.
    Warning,
}

/// The structured well-formedness/validity error kind, independent of where
/// in the pipeline it was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Byte stream ended in the middle of a multi-byte codepoint.
    TruncatedEncoding,
    /// The declared encoding contradicts a detected BOM family.
    EncodingMismatch { declared: String, detected: String },
    /// Named encoding is not supported by the decoder.
    UnsupportedEncoding(String),
    /// Version string in a declaration is syntactically invalid or not `1.x`.
    InvalidVersion(String),
    /// A `standalone` value other than `yes`/`no`.
    InvalidStandalone(String),
    /// A character outside of `Char`/`RestrictedChar` for the active XML version.
    InvalidChar(u32),
    /// The two-level state table had no entry for this (state, class) pair.
    LexicalError(&'static str),
    /// A literal sequence (`OCTYPE`, `CDATA[`, ...) did not match.
    MismatchedLiteral { expected: &'static str },
    /// Unterminated construct (comment, PI, CDATA, element, DOCTYPE) at `close()`.
    UnterminatedConstruct(&'static str),
    /// `]]>` appearing in character content outside a CDATA section.
    CDataEndInContent,
    /// WFC Element Type Match: end-tag name does not match the open start-tag.
    TagMismatch { start: String, end: String },
    /// Duplicate attribute on one start-tag.
    DuplicateAttribute(String),
    /// Attempt to use an unbound, non-default namespace prefix.
    UnboundPrefix(String),
    /// Malformed or reserved `xmlns`/`xmlns:*` declaration.
    InvalidNamespaceDeclaration(String),
    /// Reference to an entity that was never declared.
    UndefinedEntity(String),
    /// Entity directly or indirectly references itself.
    RecursiveEntity(String),
    /// WFC Parsed Entity: an element opened inside an entity did not close
    /// inside the same entity.
    UnclosedEntityElement(String),
    /// WFC PEs in Internal Subset: a parameter-entity reference inside a
    /// markup declaration in the internal subset.
    PeInInternalSubsetDeclaration,
    /// WFC/VC Conditional Section/PE Nesting violation.
    ConditionalSectionPeNesting,
    /// VC/WFC Proper Declaration/PE or Proper Group/PE nesting violation.
    ImproperPeNesting,
    /// External parameter entity never declared by end of external subset.
    UndefinedParameterEntity(String),
    /// VC Unique Element Type Declaration: element declared more than once.
    DuplicateElementDeclaration(String),
    /// Malformed declaration body (ELEMENT/ATTLIST/ENTITY/NOTATION).
    MalformedDeclaration(&'static str),
    /// `PubidChar`/SystemLiteral production violation.
    InvalidExternalId(&'static str),
    /// Validity: element not declared, content model mismatch, etc.
    ElementNotDeclared(String),
    ContentModelViolation { element: String, detail: String },
    AttributeTypeMismatch { attribute: String, detail: String },
    DuplicateId(String),
    DanglingIdref(String),
    /// Generic catch-all for messages produced deep in a sub-parser.
    Other(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TruncatedEncoding => write!(f, "byte stream ended mid-codepoint"),
            ErrorKind::EncodingMismatch { declared, detected } => write!(
                f,
                "declared encoding '{}' contradicts detected encoding '{}'",
                declared, detected
            ),
            ErrorKind::UnsupportedEncoding(name) => write!(f, "unsupported encoding '{}'", name),
            ErrorKind::InvalidVersion(v) => write!(f, "invalid XML version '{}'", v),
            ErrorKind::InvalidStandalone(v) => write!(f, "invalid standalone value '{}'", v),
            ErrorKind::InvalidChar(c) => write!(f, "character U+{:04X} is not allowed here", c),
            ErrorKind::LexicalError(ctx) => write!(f, "lexical error in {}", ctx),
            ErrorKind::MismatchedLiteral { expected } => {
                write!(f, "expected literal '{}'", expected)
            }
            ErrorKind::UnterminatedConstruct(what) => write!(f, "unterminated {}", what),
            ErrorKind::CDataEndInContent => write!(f, "']]>' is not allowed in content"),
            ErrorKind::TagMismatch { start, end } => {
                write!(f, "end tag '{}' does not match start tag '{}'", end, start)
            }
            ErrorKind::DuplicateAttribute(name) => write!(f, "duplicate attribute '{}'", name),
            ErrorKind::UnboundPrefix(p) => write!(f, "unbound namespace prefix '{}'", p),
            ErrorKind::InvalidNamespaceDeclaration(m) => {
                write!(f, "invalid namespace declaration: {}", m)
            }
            ErrorKind::UndefinedEntity(name) => write!(f, "undefined entity '{}'", name),
            ErrorKind::RecursiveEntity(name) => write!(f, "recursive entity reference '{}'", name),
            ErrorKind::UnclosedEntityElement(name) => write!(
                f,
                "element opened inside entity '{}' was not closed inside it",
                name
            ),
            ErrorKind::PeInInternalSubsetDeclaration => write!(
                f,
                "parameter entity reference inside a markup declaration in the internal subset"
            ),
            ErrorKind::ConditionalSectionPeNesting => {
                write!(f, "conditional section not properly nested within a single parameter-entity expansion")
            }
            ErrorKind::ImproperPeNesting => {
                write!(f, "declaration or group not properly nested within a parameter-entity expansion")
            }
            ErrorKind::UndefinedParameterEntity(name) => {
                write!(f, "undefined parameter entity '{}'", name)
            }
            ErrorKind::DuplicateElementDeclaration(name) => {
                write!(f, "element type '{}' declared more than once", name)
            }
            ErrorKind::MalformedDeclaration(what) => write!(f, "malformed {} declaration", what),
            ErrorKind::InvalidExternalId(what) => write!(f, "invalid external identifier: {}", what),
            ErrorKind::ElementNotDeclared(name) => write!(f, "element '{}' not declared", name),
            ErrorKind::ContentModelViolation { element, detail } => {
                write!(f, "content of '{}' does not match its model: {}", element, detail)
            }
            ErrorKind::AttributeTypeMismatch { attribute, detail } => {
                write!(f, "attribute '{}' {}", attribute, detail)
            }
            ErrorKind::DuplicateId(id) => write!(f, "ID '{}' used more than once", id),
            ErrorKind::DanglingIdref(id) => write!(f, "IDREF '{}' has no matching ID", id),
            ErrorKind::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// A structured, located XML well-formedness/validity error.
#[derive(Debug, Clone)]
pub struct XmlError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub locator: Locator,
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.locator)
    }
}

/// The top-level error type returned from any fallible operation in this crate.
#[derive(Debug)]
pub enum Error {
    /// Failure of the underlying byte stream or an external entity resolution.
    Io(io::Error),
    /// A structured well-formedness or validity violation.
    Xml(XmlError),
}

impl Error {
    pub fn fatal(kind: ErrorKind, locator: Locator) -> Self {
        Error::Xml(XmlError {
            kind,
            severity: Severity::Fatal,
            locator,
        })
    }

    pub fn recoverable(kind: ErrorKind, locator: Locator) -> Self {
        Error::Xml(XmlError {
            kind,
            severity: Severity::Recoverable,
            locator,
        })
    }

    pub fn severity(&self) -> Severity {
        match self {
            Error::Io(_) => Severity::Fatal,
            Error::Xml(e) => e.severity,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Xml(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Xml(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
