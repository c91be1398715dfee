//! Evaluation context and axis walking. An axis materializes its nodes in
//! the axis's natural order: forward axes in document order, reverse axes
//! closest-to-the-context-node first. Predicate positions number along
//! that order; the step's final output is re-sorted afterwards.

use std::collections::HashMap;

use crate::document::Document;
use crate::name::XML_NAMESPACE;
use crate::node::{descendants, new_node, NamespaceData, NodeData, NodeRef};
use crate::xpath::tokens::AxisName;
use crate::xpath::value::Value;

pub type NamespaceResolver = dyn Fn(&str) -> Option<String>;

/// The 5-tuple an expression evaluates against: context node, position,
/// size, variable bindings and namespace resolver.
pub struct Evaluation<'a> {
    pub document: &'a Document,
    pub node: NodeRef,
    /// 1-based position within the current candidate list.
    pub position: usize,
    pub size: usize,
    pub(crate) variables: &'a HashMap<String, Value>,
    pub(crate) resolver: Option<&'a NamespaceResolver>,
}

impl<'a> Evaluation<'a> {
    pub fn new(
        document: &'a Document,
        node: NodeRef,
        variables: &'a HashMap<String, Value>,
        resolver: Option<&'a NamespaceResolver>,
    ) -> Evaluation<'a> {
        Evaluation {
            document,
            node,
            position: 1,
            size: 1,
            variables,
            resolver,
        }
    }

    pub fn root(&self) -> NodeRef {
        self.node.tree_root()
    }

    pub fn new_evaluation_from(&self, node: NodeRef) -> Evaluation<'a> {
        Evaluation {
            document: self.document,
            node,
            position: 1,
            size: 1,
            variables: self.variables,
            resolver: self.resolver,
        }
    }

    pub fn new_evaluation_with_position(
        &self,
        node: NodeRef,
        position: usize,
        size: usize,
    ) -> Evaluation<'a> {
        Evaluation {
            document: self.document,
            node,
            position,
            size,
            variables: self.variables,
            resolver: self.resolver,
        }
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    pub fn resolve_prefix(&self, prefix: &str) -> Option<Option<String>> {
        self.resolver.map(|resolve| resolve(prefix))
    }
}

/// All nodes on `axis` from `node`, in the axis's natural order.
pub fn axis_nodes(axis: AxisName, node: &NodeRef) -> Vec<NodeRef> {
    match axis {
        AxisName::SelfAxis => vec![node.clone()],

        AxisName::Child => children_of(node),

        AxisName::Descendant => descendant_content(node),

        AxisName::DescendantOrSelf => {
            let mut nodes = vec![node.clone()];
            nodes.extend(descendant_content(node));
            nodes
        }

        AxisName::Parent => node.parent_or_owner().into_iter().collect(),

        AxisName::Ancestor => ancestors_of(node),

        AxisName::AncestorOrSelf => {
            let mut nodes = vec![node.clone()];
            nodes.extend(ancestors_of(node));
            nodes
        }

        AxisName::FollowingSibling => {
            if node.is_attribute() || matches!(node.data_ref(), NodeData::Namespace(_)) {
                return Vec::new();
            }
            let mut nodes = Vec::new();
            let mut current = node.next_sibling();
            while let Some(sibling) = current {
                current = sibling.next_sibling();
                nodes.push(sibling);
            }
            nodes
        }

        AxisName::PrecedingSibling => {
            if node.is_attribute() || matches!(node.data_ref(), NodeData::Namespace(_)) {
                return Vec::new();
            }
            let mut nodes = Vec::new();
            let mut current = node.previous_sibling();
            while let Some(sibling) = current {
                current = sibling.previous_sibling();
                nodes.push(sibling);
            }
            nodes
        }

        AxisName::Following => following_of(node),

        AxisName::Preceding => preceding_of(node),

        AxisName::Attribute => match node.data_ref() {
            NodeData::Element(el) => el.attrs.borrow().clone(),
            _ => Vec::new(),
        },

        AxisName::Namespace => namespace_nodes(node),
    }
}

fn children_of(node: &NodeRef) -> Vec<NodeRef> {
    match node.data_ref() {
        NodeData::Attribute(_) | NodeData::Namespace(_) => Vec::new(),
        _ => node.children_snapshot(),
    }
}

/// Descendants in document order; attribute and namespace context nodes
/// have none.
fn descendant_content(node: &NodeRef) -> Vec<NodeRef> {
    match node.data_ref() {
        NodeData::Attribute(_) | NodeData::Namespace(_) => Vec::new(),
        _ => descendants(node),
    }
}

/// Closest first: the natural order of a reverse axis.
fn ancestors_of(node: &NodeRef) -> Vec<NodeRef> {
    let mut nodes = Vec::new();
    let mut current = node.parent_or_owner();
    while let Some(ancestor) = current {
        current = ancestor.parent_node();
        nodes.push(ancestor);
    }
    nodes
}

/// Everything after the context node in document order, minus descendants.
/// For attribute and namespace nodes the owner element's content counts
/// as following.
fn following_of(node: &NodeRef) -> Vec<NodeRef> {
    let mut nodes = Vec::new();
    let anchor = match node.data_ref() {
        NodeData::Attribute(attr) => match attr.owner_element() {
            Some(owner) => {
                nodes.extend(descendants(&owner));
                owner
            }
            None => return nodes,
        },
        NodeData::Namespace(ns) => match ns.owner_element.upgrade() {
            Some(owner) => {
                nodes.extend(descendants(&owner));
                owner
            }
            None => return nodes,
        },
        _ => node.clone(),
    };

    let mut current = anchor;
    loop {
        let mut sibling = current.next_sibling();
        while let Some(next) = sibling {
            nodes.push(next.clone());
            nodes.extend(descendants(&next));
            sibling = next.next_sibling();
        }
        match current.parent_node() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    nodes
}

/// Everything before the context node in document order, minus ancestors,
/// in reverse document order (closest first).
fn preceding_of(node: &NodeRef) -> Vec<NodeRef> {
    let anchor = match node.data_ref() {
        NodeData::Attribute(attr) => attr.owner_element(),
        NodeData::Namespace(ns) => ns.owner_element.upgrade(),
        _ => Some(node.clone()),
    };
    let Some(mut current) = anchor else {
        return Vec::new();
    };

    let mut nodes = Vec::new();
    loop {
        let mut sibling = current.previous_sibling();
        while let Some(previous) = sibling {
            let mut subtree = vec![previous.clone()];
            subtree.extend(descendants(&previous));
            subtree.reverse();
            nodes.extend(subtree);
            sibling = previous.previous_sibling();
        }
        match current.parent_node() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    nodes
}

/// Synthesizes the namespace nodes in scope at an element: every prefix
/// bound on the element or an ancestor (nearest declaration wins), the
/// implicit `xml` binding, and the default namespace iff one is in scope.
fn namespace_nodes(node: &NodeRef) -> Vec<NodeRef> {
    if !node.is_element() {
        return Vec::new();
    }

    // prefix -> uri; None key is the default namespace.
    let mut bindings: HashMap<Option<String>, String> = HashMap::new();
    let mut undeclared_default = false;
    let mut current = Some(node.clone());
    while let Some(element) = current {
        if let NodeData::Element(el) = element.data_ref() {
            for attr in el.attrs.borrow().iter() {
                let name = attr.qual_name().expect("attribute has a name");
                let value = attr.node_value().unwrap_or_default();
                match (&name.prefix, name.local.as_str()) {
                    (None, "xmlns") => {
                        if !bindings.contains_key(&None) && !undeclared_default {
                            if value.is_empty() {
                                undeclared_default = true;
                            } else {
                                bindings.insert(None, value);
                            }
                        }
                    }
                    (Some(prefix), local) if prefix == "xmlns" => {
                        bindings
                            .entry(Some(local.to_owned()))
                            .or_insert(value);
                    }
                    _ => {}
                }
            }
        }
        current = element.parent_node().filter(NodeRef::is_element);
    }
    bindings.insert(Some("xml".to_owned()), XML_NAMESPACE.to_owned());

    let mut sorted: Vec<(Option<String>, String)> = bindings.into_iter().collect();
    sorted.sort_by(|(a, _), (b, _)| a.cmp(b));

    sorted
        .into_iter()
        .enumerate()
        .map(|(index, (prefix, uri))| {
            new_node(NodeData::Namespace(NamespaceData {
                prefix,
                uri,
                owner_element: node.downgrade(),
                index,
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::parse_str;
    use crate::node::node_type;

    fn names(nodes: &[NodeRef]) -> Vec<String> {
        nodes.iter().map(|node| node.node_name()).collect()
    }

    #[test]
    fn sibling_axes_order() {
        let doc = parse_str("<r><a/><b/><c/><d/></r>").unwrap();
        let root = doc.document_element().unwrap();
        let c = root.child_at(2).unwrap();

        assert_eq!(names(&axis_nodes(AxisName::FollowingSibling, &c)), ["d"]);
        // Reverse axis: closest predecessor first.
        assert_eq!(
            names(&axis_nodes(AxisName::PrecedingSibling, &c)),
            ["b", "a"]
        );
    }

    #[test]
    fn following_and_preceding_exclude_lines_of_descent() {
        let doc = parse_str("<r><a><a1/></a><b><b1/><b2/></b><c/></r>").unwrap();
        let root = doc.document_element().unwrap();
        let b = root.child_at(1).unwrap();

        assert_eq!(names(&axis_nodes(AxisName::Following, &b)), ["c"]);
        // Preceding excludes ancestors but includes prior subtrees,
        // deepest-last-first.
        assert_eq!(names(&axis_nodes(AxisName::Preceding, &b)), ["a1", "a"]);
        assert_eq!(
            names(&axis_nodes(AxisName::Ancestor, &b)),
            ["r", "#document"]
        );
    }

    #[test]
    fn namespace_axis_includes_xml_and_default() {
        let doc = parse_str(
            r#"<r xmlns="urn:d" xmlns:p="urn:p"><inner xmlns:q="urn:q"/></r>"#,
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        let inner = root.first_element_child().unwrap();

        let nodes = axis_nodes(AxisName::Namespace, &inner);
        let mut pairs: Vec<(String, String)> = nodes
            .iter()
            .map(|ns| (ns.node_name(), ns.node_value().unwrap_or_default()))
            .collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                (String::new(), "urn:d".to_owned()),
                ("p".to_owned(), "urn:p".to_owned()),
                ("q".to_owned(), "urn:q".to_owned()),
                ("xml".to_owned(), XML_NAMESPACE.to_owned()),
            ]
        );
        assert!(nodes.iter().all(|ns| ns.node_type() == node_type::NAMESPACE));
    }

    #[test]
    fn undeclared_default_namespace_disappears() {
        let doc = parse_str(r#"<r xmlns="urn:d"><inner xmlns=""/></r>"#).unwrap();
        let inner = doc
            .document_element()
            .unwrap()
            .first_element_child()
            .unwrap();
        let nodes = axis_nodes(AxisName::Namespace, &inner);
        assert!(nodes.iter().all(|ns| !ns.node_name().is_empty()));
    }
}
