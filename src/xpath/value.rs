//! The four XPath value kinds and the coercions between them, plus the
//! node-set container with document-order sorting and identity dedup.

use std::cmp::Ordering;
use std::fmt;

use crate::error::XPathError;
use crate::node::{NodeData, NodeRef};

#[derive(Debug, Clone)]
pub enum Value {
    Nodeset(Nodeset),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nodeset(_) => "node-set",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }

    pub fn is_nodeset(&self) -> bool {
        matches!(self, Value::Nodeset(_))
    }

    /// `boolean()` coercion: a number is true unless zero or NaN, a
    /// node-set unless empty, a string unless empty.
    pub fn boolean(&self) -> bool {
        match self {
            Value::Boolean(v) => *v,
            Value::Number(v) => *v != 0.0 && !v.is_nan(),
            Value::String(v) => !v.is_empty(),
            Value::Nodeset(set) => !set.is_empty(),
        }
    }

    /// `number()` coercion; a node-set converts through its string-value.
    pub fn number(&self) -> f64 {
        match self {
            Value::Boolean(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(v) => *v,
            Value::String(v) => parse_number(v),
            Value::Nodeset(_) => parse_number(&self.string()),
        }
    }

    /// `string()` coercion; a node-set converts to the string-value of its
    /// first node in document order, or `""` when empty.
    pub fn string(&self) -> String {
        match self {
            Value::Boolean(v) => if *v { "true" } else { "false" }.to_owned(),
            Value::Number(v) => format_number(*v),
            Value::String(v) => v.clone(),
            Value::Nodeset(set) => set.first().map(|node| string_value(&node)).unwrap_or_default(),
        }
    }

    pub fn into_nodeset(self) -> Result<Nodeset, XPathError> {
        match self {
            Value::Nodeset(set) => Ok(set),
            other => Err(XPathError::Type(format!(
                "expected a node-set, found a {}",
                other.kind_name()
            ))),
        }
    }

    pub fn as_nodeset(&self) -> Result<&Nodeset, XPathError> {
        match self {
            Value::Nodeset(set) => Ok(set),
            other => Err(XPathError::Type(format!(
                "expected a node-set, found a {}",
                other.kind_name()
            ))),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<Nodeset> for Value {
    fn from(value: Nodeset) -> Self {
        Value::Nodeset(value)
    }
}

/// The XPath string-value of a node: concatenated descendant text for
/// elements and roots, the payload for everything else.
pub fn string_value(node: &NodeRef) -> String {
    match node.data_ref() {
        NodeData::Document(_) | NodeData::DocumentFragment | NodeData::Element(_) => {
            let mut out = String::new();
            node.collect_text(&mut out);
            out
        }
        NodeData::EntityReference(_) => {
            let mut out = String::new();
            node.collect_text(&mut out);
            out
        }
        _ => node.node_value().unwrap_or_default(),
    }
}

/// `number()` string parsing: optional minus, decimal digits with an
/// optional fraction, surrounded by whitespace. Anything else is NaN.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim_matches([' ', '\t', '\n', '\r']);
    let body = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if body.is_empty() {
        return f64::NAN;
    }
    let valid = match body.split_once('.') {
        Some((whole, frac)) => {
            (!whole.is_empty() || !frac.is_empty())
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => body.bytes().all(|b| b.is_ascii_digit()),
    };
    if !valid {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// XPath 1.0 number-to-string: no exponent for finite values, no trailing
/// zeros, `"NaN"` / `"Infinity"` / `"-Infinity"`, and both zeros as `"0"`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value == f64::INFINITY {
        "Infinity".to_owned()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_owned()
    } else if value == 0.0 {
        "0".to_owned()
    } else {
        format!("{value}")
    }
}

/// Identity key used for dedup. Synthetic namespace nodes for the same
/// `(owner, prefix)` binding count as the same node even across separate
/// materializations of the axis.
fn identity(node: &NodeRef) -> (usize, Option<String>) {
    match node.data_ref() {
        NodeData::Namespace(ns) => (
            ns.owner_element
                .upgrade()
                .map(|owner| owner.addr())
                .unwrap_or_default(),
            Some(ns.prefix.clone().unwrap_or_default()),
        ),
        _ => (node.addr(), None),
    }
}

/// An ordered collection of distinct nodes.
#[derive(Clone, Default)]
pub struct Nodeset {
    nodes: Vec<NodeRef>,
}

impl Nodeset {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_node(&mut self, node: NodeRef) {
        self.nodes.push(node);
    }

    pub fn extend(&mut self, other: Nodeset) {
        self.nodes.extend(other.nodes);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn first(&self) -> Option<NodeRef> {
        self.nodes.first().cloned()
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        let key = identity(node);
        self.nodes.iter().any(|candidate| identity(candidate) == key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeRef> {
        self.nodes.iter()
    }

    /// Re-sorts into document order and drops duplicate identities.
    pub fn sort_document_order(&mut self) {
        self.nodes.sort_by(compare_document_order);
        let mut seen = std::collections::HashSet::new();
        self.nodes.retain(|node| seen.insert(identity(node)));
    }

    pub fn into_vec(self) -> Vec<NodeRef> {
        self.nodes
    }
}

pub(crate) fn compare_document_order(a: &NodeRef, b: &NodeRef) -> Ordering {
    a.compare_order(b)
}

impl From<Vec<NodeRef>> for Nodeset {
    fn from(nodes: Vec<NodeRef>) -> Self {
        Self { nodes }
    }
}

impl IntoIterator for Nodeset {
    type Item = NodeRef;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl fmt::Debug for Nodeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.nodes.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_parsing() {
        assert_eq!(parse_number("12"), 12.0);
        assert_eq!(parse_number(" -3.5 "), -3.5);
        assert_eq!(parse_number(".5"), 0.5);
        assert_eq!(parse_number("5."), 5.0);
        assert!(parse_number("").is_nan());
        assert!(parse_number("1e3").is_nan());
        assert!(parse_number("12px").is_nan());
        assert!(parse_number("- 2").is_nan());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-5.0), "-5");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e21), "1000000000000000000000");
    }

    #[test]
    fn coercions() {
        assert!(Value::from("x").boolean());
        assert!(!Value::from("").boolean());
        assert!(!Value::Number(f64::NAN).boolean());
        assert!(Value::Number(-0.5).boolean());
        assert_eq!(Value::Boolean(true).number(), 1.0);
        assert_eq!(Value::Boolean(false).string(), "false");
        assert_eq!(Value::Number(0.25).string(), "0.25");
        assert!(Value::from("q").into_nodeset().is_err());
    }

    #[test]
    fn sort_dedups_by_identity() {
        let doc = crate::document::Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        root.append_child(&a).unwrap();
        root.append_child(&b).unwrap();

        let mut set = Nodeset::new();
        set.add_node(b.clone());
        set.add_node(a.clone());
        set.add_node(b.clone());
        set.sort_document_order();
        assert_eq!(set.len(), 2);
        assert!(set.first().unwrap().is_same_node(&a));
    }
}
