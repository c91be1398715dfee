//! A mutable, standards-conformant XML DOM with live collections,
//! DOM traversal and ranges, and an XPath 1.0 engine evaluated over the
//! live tree.
//!
//! ```
//! use xmldom::parse_str;
//!
//! let doc = parse_str("<root><item id='a'/><item id='b'/></root>").unwrap();
//! let items = doc.evaluate("//item").unwrap().into_nodeset().unwrap();
//! assert_eq!(items.len(), 2);
//!
//! let root = doc.document_element().unwrap();
//! root.append_child(&doc.create_element("item").unwrap()).unwrap();
//! assert_eq!(root.children().length(), 3);
//! ```

pub mod attr;
pub mod chardata;
pub mod decoder;
pub mod document;
pub mod error;
pub mod live;
pub mod mutation;
pub mod name;
pub mod node;
pub mod range;
pub mod serialize;
pub mod traversal;
pub mod xpath;

pub use attr::NamedNodeMap;
pub use decoder::{parse_document, parse_document_with, parse_str, ParseOptions};
pub use document::Document;
pub use error::{DomException, ParseError, Result, XPathError};
pub use live::NodeList;
pub use mutation::NodeOrText;
pub use name::{QualName, XML_NAMESPACE, XMLNS_NAMESPACE};
pub use node::{document_position, node_type, NodeData, NodeRef};
pub use range::{boundary_mode, Range};
pub use serialize::{escape_str, unescape_str};
pub use traversal::{what_to_show, FilterResult, NodeFilter, NodeIterator, TreeWalker};
pub use xpath::{result_type, EvalOptions, Value, XPathResult};
