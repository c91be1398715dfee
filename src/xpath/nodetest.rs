// https://www.w3.org/TR/1999/REC-xpath-19991116/#node-tests

use std::fmt;

use crate::error::XPathError;
use crate::name::XMLNS_NAMESPACE;
use crate::node::{NodeData, NodeRef};
use crate::xpath::context::Evaluation;
use crate::xpath::tokens::{NameTest, PrincipalNodeType};

pub trait NodeTest: fmt::Debug {
    fn matches(&self, eval: &Evaluation<'_>, node: &NodeRef) -> Result<bool, XPathError>;
}

/// A name test against the axis's principal node type. An unprefixed name
/// matches only nodes with no namespace; a prefixed one resolves the
/// prefix through the evaluation's namespace resolver.
#[derive(Debug)]
pub struct Name {
    principal: PrincipalNodeType,
    test: NameTest,
}

impl Name {
    pub fn new(principal: PrincipalNodeType, test: NameTest) -> Self {
        Self { principal, test }
    }

    fn expected_namespace(&self, eval: &Evaluation<'_>) -> Result<Option<String>, XPathError> {
        let Some(prefix) = &self.test.prefix else {
            return Ok(None);
        };
        match eval.resolve_prefix(prefix) {
            // No resolver configured: fall back to literal prefix
            // comparison, signalled by the sentinel below.
            None => Ok(None),
            Some(Some(uri)) => Ok(Some(uri)),
            Some(None) => Err(XPathError::Type(format!(
                "undeclared namespace prefix '{prefix}'"
            ))),
        }
    }

    fn name_matches(
        &self,
        eval: &Evaluation<'_>,
        ns: Option<&str>,
        prefix: Option<&str>,
        local: &str,
    ) -> Result<bool, XPathError> {
        if self.test.is_wildcard_local() && self.test.prefix.is_none() {
            return Ok(true);
        }

        if let Some(test_prefix) = &self.test.prefix {
            let matches_ns = if eval.resolver.is_some() {
                self.expected_namespace(eval)?.as_deref() == ns
            } else {
                // Lenient mode: compare prefixes verbatim.
                Some(test_prefix.as_str()) == prefix
            };
            return Ok(matches_ns && (self.test.is_wildcard_local() || self.test.local == local));
        }

        Ok(ns.is_none() && self.test.local == local)
    }
}

impl NodeTest for Name {
    fn matches(&self, eval: &Evaluation<'_>, node: &NodeRef) -> Result<bool, XPathError> {
        match (self.principal, node.data_ref()) {
            (PrincipalNodeType::Element, NodeData::Element(el)) => {
                let name = el.name.borrow().clone();
                self.name_matches(eval, name.ns.as_deref(), name.prefix.as_deref(), &name.local)
            }
            (PrincipalNodeType::Attribute, NodeData::Attribute(attr)) => {
                let name = attr.name.borrow().clone();
                // Namespace declarations are not attribute-axis nodes.
                if name.ns.as_deref() == Some(XMLNS_NAMESPACE)
                    || name.qualified() == "xmlns"
                    || name.prefix.as_deref() == Some("xmlns")
                {
                    return Ok(false);
                }
                self.name_matches(eval, name.ns.as_deref(), name.prefix.as_deref(), &name.local)
            }
            (PrincipalNodeType::Namespace, NodeData::Namespace(ns)) => {
                // A namespace node's name is its prefix; it carries no
                // namespace of its own.
                if self.test.is_wildcard_local() && self.test.prefix.is_none() {
                    return Ok(true);
                }
                Ok(self.test.prefix.is_none()
                    && ns.prefix.as_deref().unwrap_or("") == self.test.local)
            }
            _ => Ok(false),
        }
    }
}

/// `node()`
#[derive(Debug)]
pub struct Node;

impl NodeTest for Node {
    fn matches(&self, _: &Evaluation<'_>, _: &NodeRef) -> Result<bool, XPathError> {
        Ok(true)
    }
}

/// `text()`; CDATA sections are text nodes in the XPath data model.
#[derive(Debug)]
pub struct Text;

impl NodeTest for Text {
    fn matches(&self, _: &Evaluation<'_>, node: &NodeRef) -> Result<bool, XPathError> {
        Ok(matches!(
            node.data_ref(),
            NodeData::Text(_) | NodeData::CDataSection(_)
        ))
    }
}

/// `comment()`
#[derive(Debug)]
pub struct Comment;

impl NodeTest for Comment {
    fn matches(&self, _: &Evaluation<'_>, node: &NodeRef) -> Result<bool, XPathError> {
        Ok(matches!(node.data_ref(), NodeData::Comment(_)))
    }
}

/// `processing-instruction()` with an optional target literal.
#[derive(Debug)]
pub struct ProcessingInstruction {
    target: Option<String>,
}

impl ProcessingInstruction {
    pub fn new(target: Option<String>) -> Self {
        Self { target }
    }
}

impl NodeTest for ProcessingInstruction {
    fn matches(&self, _: &Evaluation<'_>, node: &NodeRef) -> Result<bool, XPathError> {
        match node.data_ref() {
            NodeData::ProcessingInstruction { target, .. } => match &self.target {
                Some(wanted) => Ok(wanted == target),
                None => Ok(true),
            },
            _ => Ok(false),
        }
    }
}
