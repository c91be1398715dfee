//! The four mutation primitives and the convenience layer on top. Every
//! path validates before touching the tree, so a failed call leaves the
//! graph exactly as it was.

use crate::error::{DomException, Result};
use crate::node::{NodeData, NodeRef};

/// A node, or a string to be wrapped in a text node, for the variadic
/// convenience operations.
pub enum NodeOrText {
    Node(NodeRef),
    Text(String),
}

impl From<NodeRef> for NodeOrText {
    fn from(node: NodeRef) -> Self {
        Self::Node(node)
    }
}

impl From<&NodeRef> for NodeOrText {
    fn from(node: &NodeRef) -> Self {
        Self::Node(node.clone())
    }
}

impl From<&str> for NodeOrText {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for NodeOrText {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

fn same_document(parent: &NodeRef, child: &NodeRef) -> Result<()> {
    let matches = match (parent.owner_document_node(), child.owner_document_node()) {
        (Some(a), Some(b)) => a.is_same_node(&b),
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(DomException::WrongDocument(
            "node belongs to a different document; adopt it first".into(),
        ))
    }
}

fn can_have_children(parent: &NodeRef) -> bool {
    matches!(
        parent.data_ref(),
        NodeData::Document(_)
            | NodeData::DocumentFragment
            | NodeData::Element(_)
            | NodeData::EntityReference(_)
    )
}

/// Whether `child`'s kind may sit under `parent`, taking into account the
/// node about to be displaced by a replace.
fn child_kind_permitted(
    parent: &NodeRef,
    child: &NodeRef,
    replacing: Option<&NodeRef>,
) -> Result<()> {
    match child.data_ref() {
        NodeData::Document(_)
        | NodeData::Attribute(_)
        | NodeData::Entity { .. }
        | NodeData::Notation { .. }
        | NodeData::Namespace(_) => {
            return Err(DomException::HierarchyRequest(format!(
                "a {:?} node cannot be inserted into a tree",
                child.node_type()
            )));
        }
        NodeData::DocumentType(_) => {
            if !parent.is_document() {
                return Err(DomException::HierarchyRequest(
                    "a doctype may only sit under a document".into(),
                ));
            }
            let displaced = |node: &NodeRef| replacing.is_some_and(|old| old.is_same_node(node));
            let existing = parent
                .children_snapshot()
                .into_iter()
                .any(|c| matches!(c.data_ref(), NodeData::DocumentType(_)) && !displaced(&c));
            if existing {
                return Err(DomException::HierarchyRequest(
                    "document already has a doctype".into(),
                ));
            }
        }
        NodeData::Element(_) if parent.is_document() => {
            let displaced = |node: &NodeRef| replacing.is_some_and(|old| old.is_same_node(node));
            let existing = parent
                .children_snapshot()
                .into_iter()
                .any(|c| c.is_element() && !displaced(&c));
            if existing {
                return Err(DomException::HierarchyRequest(
                    "document already has a document element".into(),
                ));
            }
        }
        NodeData::Text(_) | NodeData::CDataSection(_) if parent.is_document() => {
            return Err(DomException::HierarchyRequest(
                "text is not permitted directly under a document".into(),
            ));
        }
        _ => {}
    }
    Ok(())
}

fn validate_insertion(
    parent: &NodeRef,
    new_child: &NodeRef,
    replacing: Option<&NodeRef>,
) -> Result<()> {
    same_document(parent, new_child)?;

    if new_child.is_inclusive_ancestor_of(parent) {
        return Err(DomException::HierarchyRequest(
            "node is the parent or an ancestor of the insertion point".into(),
        ));
    }
    if !can_have_children(parent) {
        return Err(DomException::HierarchyRequest(format!(
            "{:?} cannot hold children",
            parent
        )));
    }

    if matches!(new_child.data_ref(), NodeData::DocumentFragment) {
        // Whole-fragment validation up front; flattening must not be able
        // to fail half-way.
        let children = new_child.children_snapshot();
        if parent.is_document() {
            let displaced = |node: &NodeRef| replacing.is_some_and(|old| old.is_same_node(node));
            let mut incoming_elements = 0;
            for child in &children {
                if child.is_element() {
                    incoming_elements += 1;
                }
                child_kind_permitted(parent, child, replacing)?;
            }
            let existing = parent
                .children_snapshot()
                .into_iter()
                .any(|c| c.is_element() && !displaced(&c));
            if incoming_elements > 1 || (incoming_elements == 1 && existing) {
                return Err(DomException::HierarchyRequest(
                    "fragment would give the document more than one document element".into(),
                ));
            }
        } else {
            for child in &children {
                child_kind_permitted(parent, child, replacing)?;
            }
        }
        Ok(())
    } else {
        child_kind_permitted(parent, new_child, replacing)
    }
}

fn position_of(parent: &NodeRef, reference: &NodeRef) -> Result<usize> {
    parent
        .children_snapshot()
        .iter()
        .position(|child| child.is_same_node(reference))
        .ok_or_else(|| {
            DomException::NotFound("reference node is not a child of this parent".into())
        })
}

/// Raw placement once validation has passed: detach, splice in, re-link.
fn place(parent: &NodeRef, new_child: &NodeRef, reference: Option<&NodeRef>) -> Result<()> {
    new_child.detach();
    let index = match reference {
        Some(reference) => position_of(parent, reference)?,
        None => parent.child_count(),
    };
    new_child.set_parent(Some(parent));
    parent.0.children.borrow_mut().insert(index, new_child.clone());
    Ok(())
}

/// `insertBefore(newChild, referenceChild)`. `None` appends. Inserting a
/// node before itself is a successful no-op.
pub fn insert_before(
    parent: &NodeRef,
    new_child: &NodeRef,
    reference: Option<&NodeRef>,
) -> Result<NodeRef> {
    if reference.is_some_and(|r| r.is_same_node(new_child)) {
        return Ok(new_child.clone());
    }

    validate_insertion(parent, new_child, None)?;
    if let Some(reference) = reference {
        position_of(parent, reference)?;
    }

    if matches!(new_child.data_ref(), NodeData::DocumentFragment) {
        for child in new_child.children_snapshot() {
            place(parent, &child, reference)?;
        }
    } else {
        place(parent, new_child, reference)?;
    }
    parent.bump_version();
    Ok(new_child.clone())
}

pub fn append_child(parent: &NodeRef, new_child: &NodeRef) -> Result<NodeRef> {
    insert_before(parent, new_child, None)
}

pub fn remove_child(parent: &NodeRef, child: &NodeRef) -> Result<NodeRef> {
    let attached = child
        .parent_node()
        .is_some_and(|actual| actual.is_same_node(parent));
    if !attached {
        return Err(DomException::NotFound(
            "node to remove is not a child of this parent".into(),
        ));
    }
    child.detach();
    parent.bump_version();
    Ok(child.clone())
}

/// `replaceChild(newChild, oldChild)`. Replacing a node with itself is a
/// successful no-op.
pub fn replace_child(parent: &NodeRef, new_child: &NodeRef, old_child: &NodeRef) -> Result<NodeRef> {
    let attached = old_child
        .parent_node()
        .is_some_and(|actual| actual.is_same_node(parent));
    if !attached {
        return Err(DomException::NotFound(
            "node to replace is not a child of this parent".into(),
        ));
    }
    if new_child.is_same_node(old_child) {
        return Ok(old_child.clone());
    }

    validate_insertion(parent, new_child, Some(old_child))?;

    let next = old_child.next_sibling();
    old_child.detach();
    // The reference may have been the new child itself (it was old's next
    // sibling); in that case old is already out and nothing moves.
    let reference = next.filter(|n| !n.is_same_node(new_child));
    if matches!(new_child.data_ref(), NodeData::DocumentFragment) {
        for child in new_child.children_snapshot() {
            place(parent, &child, reference.as_ref())?;
        }
    } else {
        place(parent, new_child, reference.as_ref())?;
    }
    parent.bump_version();
    Ok(old_child.clone())
}

impl NodeRef {
    pub fn insert_before(&self, new_child: &NodeRef, reference: Option<&NodeRef>) -> Result<NodeRef> {
        insert_before(self, new_child, reference)
    }

    pub fn append_child(&self, new_child: &NodeRef) -> Result<NodeRef> {
        append_child(self, new_child)
    }

    pub fn remove_child(&self, child: &NodeRef) -> Result<NodeRef> {
        remove_child(self, child)
    }

    pub fn replace_child(&self, new_child: &NodeRef, old_child: &NodeRef) -> Result<NodeRef> {
        replace_child(self, new_child, old_child)
    }

    /// Detaches this node from its parent, if it has one.
    pub fn remove(&self) {
        self.detach();
        self.bump_version();
    }

    fn resolve_items(&self, items: &[NodeOrText]) -> Result<Vec<NodeRef>> {
        let doc = self
            .owner_document()
            .ok_or_else(|| DomException::NotFound("node has no owner document".into()))?;
        Ok(items
            .iter()
            .map(|item| match item {
                NodeOrText::Node(node) => node.clone(),
                NodeOrText::Text(text) => doc.create_text_node(text),
            })
            .collect())
    }

    /// Inserts the given nodes/strings immediately before this node.
    pub fn before(&self, items: &[NodeOrText]) -> Result<()> {
        let parent = self
            .parent_node()
            .ok_or_else(|| DomException::NotFound("node has no parent".into()))?;
        for node in self.resolve_items(items)? {
            insert_before(&parent, &node, Some(self))?;
        }
        Ok(())
    }

    /// Inserts the given nodes/strings immediately after this node.
    pub fn after(&self, items: &[NodeOrText]) -> Result<()> {
        let parent = self
            .parent_node()
            .ok_or_else(|| DomException::NotFound("node has no parent".into()))?;
        let mut anchor = self.next_sibling();
        for node in self.resolve_items(items)? {
            insert_before(&parent, &node, anchor.as_ref())?;
            anchor = node.next_sibling();
        }
        Ok(())
    }

    /// Inserts at the front of this node's child list, preserving order.
    pub fn prepend(&self, items: &[NodeOrText]) -> Result<()> {
        let first = self.first_child();
        for node in self.resolve_items(items)? {
            insert_before(self, &node, first.as_ref())?;
        }
        Ok(())
    }

    /// Appends to this node's child list.
    pub fn append(&self, items: &[NodeOrText]) -> Result<()> {
        for node in self.resolve_items(items)? {
            append_child(self, &node)?;
        }
        Ok(())
    }

    /// Atomically swaps this node for the given sequence.
    pub fn replace_with(&self, items: &[NodeOrText]) -> Result<()> {
        self.before(items)?;
        self.remove();
        Ok(())
    }

    /// Merges adjacent text children and drops empty ones, recursively.
    /// CDATA sections, comments and PIs are left untouched. Idempotent.
    pub fn normalize(&self) {
        let mut previous_text: Option<NodeRef> = None;
        for child in self.children_snapshot() {
            if child.is_text() {
                let data = child.data().unwrap_or_default();
                if data.is_empty() {
                    child.detach();
                    continue;
                }
                if let Some(prev) = &previous_text {
                    // Infallible: prev is a text node.
                    let _ = prev.append_data(&data);
                    child.detach();
                    continue;
                }
                previous_text = Some(child);
            } else {
                previous_text = None;
                child.normalize();
            }
        }
        self.bump_version();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn doc_with_root() -> (Document, NodeRef) {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        (doc, root)
    }

    #[test]
    fn hierarchy_guard_rejects_ancestor_insertion() {
        let (doc, root) = doc_with_root();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        append_child(&root, &a).unwrap();
        append_child(&a, &b).unwrap();

        let err = append_child(&b, &root).unwrap_err();
        assert!(matches!(err, DomException::HierarchyRequest(_)));
        // Tree unchanged.
        assert!(root.parent_node().unwrap().is_document());
        assert!(b.parent_node().unwrap().is_same_node(&a));
        assert_eq!(b.child_count(), 0);
    }

    #[test]
    fn self_insertion_is_a_noop() {
        let (doc, root) = doc_with_root();
        let a = doc.create_element("a").unwrap();
        append_child(&root, &a).unwrap();

        insert_before(&root, &a, Some(&a)).unwrap();
        replace_child(&root, &a, &a).unwrap();
        assert_eq!(root.child_count(), 1);
        assert!(a.parent_node().unwrap().is_same_node(&root));
    }

    #[test]
    fn insertion_detaches_from_previous_parent() {
        let (doc, root) = doc_with_root();
        let left = doc.create_element("left").unwrap();
        let right = doc.create_element("right").unwrap();
        let child = doc.create_element("c").unwrap();
        append_child(&root, &left).unwrap();
        append_child(&root, &right).unwrap();
        append_child(&left, &child).unwrap();

        append_child(&right, &child).unwrap();
        assert_eq!(left.child_count(), 0);
        assert!(child.parent_node().unwrap().is_same_node(&right));
    }

    #[test]
    fn fragment_flattens_in_order_and_empties() {
        let (doc, root) = doc_with_root();
        let frag = doc.create_document_fragment();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        append_child(&frag, &a).unwrap();
        append_child(&frag, &b).unwrap();

        append_child(&root, &frag).unwrap();
        assert_eq!(frag.child_count(), 0);
        assert_eq!(root.child_count(), 2);
        assert!(root.first_child().unwrap().is_same_node(&a));
        assert!(root.last_child().unwrap().is_same_node(&b));
    }

    #[test]
    fn document_rejects_second_element_and_text() {
        let (doc, _root) = doc_with_root();
        let extra = doc.create_element("extra").unwrap();
        assert!(matches!(
            doc.append_child(&extra),
            Err(DomException::HierarchyRequest(_))
        ));
        let text = doc.create_text_node("loose");
        assert!(matches!(
            doc.append_child(&text),
            Err(DomException::HierarchyRequest(_))
        ));
    }

    #[test]
    fn replace_child_returns_old() {
        let (doc, root) = doc_with_root();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        append_child(&root, &a).unwrap();

        let old = replace_child(&root, &b, &a).unwrap();
        assert!(old.is_same_node(&a));
        assert!(a.parent_node().is_none());
        assert!(root.first_child().unwrap().is_same_node(&b));
    }

    #[test]
    fn normalize_merges_and_drops() {
        let (doc, root) = doc_with_root();
        root.append(&["foo".into(), "".into(), "bar".into()]).unwrap();
        let cdata = doc.create_cdata_section("keep").unwrap();
        append_child(&root, &cdata).unwrap();
        root.append(&["baz".into()]).unwrap();

        root.normalize();
        assert_eq!(root.child_count(), 3);
        assert_eq!(root.first_child().unwrap().data().as_deref(), Some("foobar"));

        // Idempotent.
        root.normalize();
        assert_eq!(root.child_count(), 3);
    }

    #[test]
    fn replace_with_swaps_sequence() {
        let (doc, root) = doc_with_root();
        let a = doc.create_element("a").unwrap();
        append_child(&root, &a).unwrap();
        let b = doc.create_element("b").unwrap();

        a.replace_with(&[(&b).into(), "tail".into()]).unwrap();
        assert_eq!(root.child_count(), 2);
        assert!(root.first_child().unwrap().is_same_node(&b));
        assert_eq!(root.last_child().unwrap().data().as_deref(), Some("tail"));
    }
}
