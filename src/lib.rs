//! A streaming, push-mode XML 1.0/1.1 parser: namespaces, DTD processing,
//! and optional validity checking, without building an in-memory document
//! tree.
//!
//! The pipeline is `bytes -> `[`encoding::Decoder`]` -> (chars) ->
//! `[`tokenizer::Tokenizer`]` -> (tokens) -> `[`content_parser::ContentParser`]`
//! (which owns a `[`dtd::DtdParser`]` for the DOCTYPE) -> `[`handler`] callbacks`,
//! with nested tokenizers spun up on entity expansion. [`Parser`] wires the
//! whole pipeline together; everything else in this crate is a collaborator
//! it owns.
//!
//! ```
//! use xmlcore::{Handlers, NullHandler, Parser};
//! use xmlcore::handler::ContentHandler;
//!
//! #[derive(Default)]
//! struct PrintElements;
//! impl ContentHandler for PrintElements {
//!     fn start_element(
//!         &mut self,
//!         _uri: Option<&str>,
//!         local_name: &str,
//!         _qname: &str,
//!         _attrs: &xmlcore::attributes::AttributeList,
//!     ) {
//!         println!("<{}>", local_name);
//!     }
//! }
//!
//! let parser = Parser::default();
//! let mut content = PrintElements::default();
//! let mut dtd = NullHandler;
//! let mut lexical = NullHandler;
//! let mut error = NullHandler;
//! let mut handlers = Handlers { content: &mut content, dtd: &mut dtd, lexical: &mut lexical, error: &mut error };
//! parser.parse_str("<root><child/></root>", &mut handlers).unwrap();
//! ```

pub mod attributes;
pub mod char_buffer;
pub mod config;
pub mod content_model;
pub mod content_parser;
pub mod dtd;
pub mod encoding;
pub mod entity;
pub mod errors;
pub mod handler;
pub mod intern;
pub mod namespace;
pub mod parser;
pub mod pool;
pub mod qname;
pub mod token;
pub mod tokenizer;

pub use config::{ParserConfig, ParserConfigBuilder};
pub use entity::{DefaultEntityResolver, EntityResolver, ResolvedEntity};
pub use errors::{Error, ErrorKind, Locator, Result, Severity, XmlError};
pub use handler::{ContentHandler, DtdHandler, ErrorHandler, Handlers, LexicalHandler, NullHandler};
pub use parser::{Parser, ParserBuilder};
