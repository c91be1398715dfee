//! Result shaping. A caller asks for one of ten result kinds; iterator
//! kinds watch the document's mutation counter and refuse to advance once
//! it moves, snapshot kinds copy out and stay valid.

use std::cell::Cell;

use crate::document::Document;
use crate::error::{DomException, XPathError};
use crate::node::NodeRef;
use crate::xpath::value::{Nodeset, Value};

/// Stable result-kind codes.
pub mod result_type {
    pub const ANY: u16 = 0;
    pub const NUMBER: u16 = 1;
    pub const STRING: u16 = 2;
    pub const BOOLEAN: u16 = 3;
    pub const UNORDERED_NODE_ITERATOR: u16 = 4;
    pub const ORDERED_NODE_ITERATOR: u16 = 5;
    pub const UNORDERED_NODE_SNAPSHOT: u16 = 6;
    pub const ORDERED_NODE_SNAPSHOT: u16 = 7;
    pub const ANY_UNORDERED_NODE: u16 = 8;
    pub const FIRST_ORDERED_NODE: u16 = 9;
}

use result_type::*;

enum Shape {
    Number(f64),
    String(String),
    Boolean(bool),
    Nodes {
        nodes: Vec<NodeRef>,
        doc: Document,
        created_version: u64,
        cursor: Cell<usize>,
    },
    Single(Option<NodeRef>),
}

pub struct XPathResult {
    kind: u16,
    shape: Shape,
}

impl XPathResult {
    /// Shapes an evaluation result. Primitive kinds coerce among each
    /// other, but a node-set can only fill node kinds and vice versa.
    pub(crate) fn from_value(
        value: Value,
        requested: u16,
        doc: &Document,
    ) -> Result<XPathResult, XPathError> {
        let kind = match requested {
            ANY => match &value {
                Value::Nodeset(_) => UNORDERED_NODE_ITERATOR,
                Value::Number(_) => NUMBER,
                Value::String(_) => STRING,
                Value::Boolean(_) => BOOLEAN,
            },
            other => other,
        };

        let shape = match kind {
            NUMBER | STRING | BOOLEAN => {
                if value.is_nodeset() {
                    return Err(XPathError::Type(
                        "expression produced a node-set; a primitive result was requested".into(),
                    ));
                }
                match kind {
                    NUMBER => Shape::Number(value.number()),
                    STRING => Shape::String(value.string()),
                    _ => Shape::Boolean(value.boolean()),
                }
            }

            UNORDERED_NODE_ITERATOR | ORDERED_NODE_ITERATOR | UNORDERED_NODE_SNAPSHOT
            | ORDERED_NODE_SNAPSHOT | ANY_UNORDERED_NODE | FIRST_ORDERED_NODE => {
                let mut set: Nodeset = value.into_nodeset().map_err(|_| {
                    XPathError::Type(
                        "expression produced a primitive; a node result was requested".into(),
                    )
                })?;
                // Evaluation already delivers document order; re-sorting
                // here keeps the ordered kinds honest regardless.
                set.sort_document_order();
                let nodes = set.into_vec();
                match kind {
                    ANY_UNORDERED_NODE | FIRST_ORDERED_NODE => {
                        Shape::Single(nodes.into_iter().next())
                    }
                    _ => Shape::Nodes {
                        nodes,
                        doc: doc.clone(),
                        created_version: doc.version(),
                        cursor: Cell::new(0),
                    },
                }
            }

            unknown => {
                return Err(XPathError::Type(format!(
                    "unknown result type code {unknown}"
                )))
            }
        };

        Ok(XPathResult { kind, shape })
    }

    pub fn result_type(&self) -> u16 {
        self.kind
    }

    pub fn number_value(&self) -> Result<f64, XPathError> {
        match &self.shape {
            Shape::Number(v) => Ok(*v),
            _ => Err(XPathError::Type("result is not a number".into())),
        }
    }

    pub fn string_value(&self) -> Result<String, XPathError> {
        match &self.shape {
            Shape::String(v) => Ok(v.clone()),
            _ => Err(XPathError::Type("result is not a string".into())),
        }
    }

    pub fn boolean_value(&self) -> Result<bool, XPathError> {
        match &self.shape {
            Shape::Boolean(v) => Ok(*v),
            _ => Err(XPathError::Type("result is not a boolean".into())),
        }
    }

    /// For the two single-node kinds.
    pub fn single_node_value(&self) -> Result<Option<NodeRef>, XPathError> {
        match &self.shape {
            Shape::Single(node) => Ok(node.clone()),
            _ => Err(XPathError::Type("result is not a single node".into())),
        }
    }

    pub fn snapshot_length(&self) -> Result<usize, XPathError> {
        match (&self.shape, self.kind) {
            (Shape::Nodes { nodes, .. }, UNORDERED_NODE_SNAPSHOT | ORDERED_NODE_SNAPSHOT) => {
                Ok(nodes.len())
            }
            _ => Err(XPathError::Type("result is not a snapshot".into())),
        }
    }

    /// Out-of-range indices yield `None`, never an error.
    pub fn snapshot_item(&self, index: usize) -> Result<Option<NodeRef>, XPathError> {
        match (&self.shape, self.kind) {
            (Shape::Nodes { nodes, .. }, UNORDERED_NODE_SNAPSHOT | ORDERED_NODE_SNAPSHOT) => {
                Ok(nodes.get(index).cloned())
            }
            _ => Err(XPathError::Type("result is not a snapshot".into())),
        }
    }

    /// Advances an iterator result. Any document mutation after the
    /// evaluation invalidates the iterator permanently.
    pub fn iterate_next(&self) -> Result<Option<NodeRef>, DomException> {
        match (&self.shape, self.kind) {
            (
                Shape::Nodes {
                    nodes,
                    doc,
                    created_version,
                    cursor,
                },
                UNORDERED_NODE_ITERATOR | ORDERED_NODE_ITERATOR,
            ) => {
                if doc.version() != *created_version {
                    return Err(DomException::InvalidState(
                        "the document has mutated since this iterator was created".into(),
                    ));
                }
                let at = cursor.get();
                cursor.set(at + 1);
                Ok(nodes.get(at).cloned())
            }
            _ => Err(DomException::NotSupported(
                "result is not an iterator".into(),
            )),
        }
    }
}
