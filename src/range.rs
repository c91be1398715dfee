//! DOM Range: a pair of boundary points over the tree, boundary ordering,
//! and the content algorithms (`delete`/`extract`/`clone`/`insert`/
//! `surround`).

use std::cell::RefCell;
use std::cmp::Ordering;

use crate::error::{DomException, Result};
use crate::node::{NodeData, NodeRef};

/// `compareBoundaryPoints` modes.
pub mod boundary_mode {
    pub const START_TO_START: u16 = 0;
    pub const START_TO_END: u16 = 1;
    pub const END_TO_END: u16 = 2;
    pub const END_TO_START: u16 = 3;
}

#[derive(Clone)]
struct Boundary {
    node: NodeRef,
    offset: usize,
}

impl Boundary {
    /// Child-index path from the tree root, with the offset appended.
    /// Lexicographic comparison of these keys is boundary order.
    fn key(&self) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = self.node.clone();
        while let Some(parent) = current.parent_node() {
            path.push(current.index_in_parent().unwrap_or(0));
            current = parent;
        }
        path.reverse();
        path.push(self.offset);
        path
    }

    fn cmp(&self, other: &Boundary) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Offset ceiling for a boundary container: UTF-16 length for character
/// data, child count otherwise.
fn node_length(node: &NodeRef) -> usize {
    if node.is_character_data() {
        node.length().unwrap_or(0)
    } else {
        node.child_count()
    }
}

fn validate_boundary(node: &NodeRef, offset: usize) -> Result<()> {
    if matches!(node.data_ref(), NodeData::DocumentType(_)) {
        return Err(DomException::NotSupported(
            "a doctype cannot contain a range boundary".into(),
        ));
    }
    let length = node_length(node);
    if offset > length {
        return Err(DomException::IndexSize(format!(
            "offset {offset} exceeds boundary container length {length}"
        )));
    }
    Ok(())
}

/// A contiguous region of the tree delimited by two boundary points.
pub struct Range {
    start: RefCell<Boundary>,
    end: RefCell<Boundary>,
}

impl Range {
    pub(crate) fn new(container: NodeRef) -> Self {
        let boundary = Boundary {
            node: container,
            offset: 0,
        };
        Self {
            start: RefCell::new(boundary.clone()),
            end: RefCell::new(boundary),
        }
    }

    pub fn start_container(&self) -> NodeRef {
        self.start.borrow().node.clone()
    }

    pub fn start_offset(&self) -> usize {
        self.start.borrow().offset
    }

    pub fn end_container(&self) -> NodeRef {
        self.end.borrow().node.clone()
    }

    pub fn end_offset(&self) -> usize {
        self.end.borrow().offset
    }

    pub fn collapsed(&self) -> bool {
        let start = self.start.borrow();
        let end = self.end.borrow();
        start.node.is_same_node(&end.node) && start.offset == end.offset
    }

    /// Moves the start. If that would invert the range (or move it into a
    /// different tree) the end is pulled along to the same point.
    pub fn set_start(&self, node: &NodeRef, offset: usize) -> Result<()> {
        validate_boundary(node, offset)?;
        let boundary = Boundary {
            node: node.clone(),
            offset,
        };
        let same_tree = self
            .end
            .borrow()
            .node
            .tree_root()
            .is_same_node(&boundary.node.tree_root());
        if !same_tree || boundary.cmp(&self.end.borrow()) == Ordering::Greater {
            *self.end.borrow_mut() = boundary.clone();
        }
        *self.start.borrow_mut() = boundary;
        Ok(())
    }

    /// Moves the end, pulling the start along when ordering would break.
    pub fn set_end(&self, node: &NodeRef, offset: usize) -> Result<()> {
        validate_boundary(node, offset)?;
        let boundary = Boundary {
            node: node.clone(),
            offset,
        };
        let same_tree = self
            .start
            .borrow()
            .node
            .tree_root()
            .is_same_node(&boundary.node.tree_root());
        if !same_tree || boundary.cmp(&self.start.borrow()) == Ordering::Less {
            *self.start.borrow_mut() = boundary.clone();
        }
        *self.end.borrow_mut() = boundary;
        Ok(())
    }

    pub fn set_start_before(&self, node: &NodeRef) -> Result<()> {
        let (parent, index) = parent_and_index(node)?;
        self.set_start(&parent, index)
    }

    pub fn set_start_after(&self, node: &NodeRef) -> Result<()> {
        let (parent, index) = parent_and_index(node)?;
        self.set_start(&parent, index + 1)
    }

    pub fn set_end_before(&self, node: &NodeRef) -> Result<()> {
        let (parent, index) = parent_and_index(node)?;
        self.set_end(&parent, index)
    }

    pub fn set_end_after(&self, node: &NodeRef) -> Result<()> {
        let (parent, index) = parent_and_index(node)?;
        self.set_end(&parent, index + 1)
    }

    pub fn collapse(&self, to_start: bool) {
        if to_start {
            *self.end.borrow_mut() = self.start.borrow().clone();
        } else {
            *self.start.borrow_mut() = self.end.borrow().clone();
        }
    }

    /// Selects `node` itself: start before it, end after it.
    pub fn select_node(&self, node: &NodeRef) -> Result<()> {
        let (parent, index) = parent_and_index(node)?;
        *self.start.borrow_mut() = Boundary {
            node: parent.clone(),
            offset: index,
        };
        *self.end.borrow_mut() = Boundary {
            node: parent,
            offset: index + 1,
        };
        Ok(())
    }

    /// Selects the contents of `node`.
    pub fn select_node_contents(&self, node: &NodeRef) -> Result<()> {
        if matches!(node.data_ref(), NodeData::DocumentType(_)) {
            return Err(DomException::NotSupported(
                "a doctype cannot contain a range boundary".into(),
            ));
        }
        *self.start.borrow_mut() = Boundary {
            node: node.clone(),
            offset: 0,
        };
        *self.end.borrow_mut() = Boundary {
            node: node.clone(),
            offset: node_length(node),
        };
        Ok(())
    }

    /// The lowest node whose subtree holds both boundary points.
    pub fn common_ancestor_container(&self) -> NodeRef {
        let start = self.start.borrow().node.clone();
        let end = self.end.borrow().node.clone();

        let mut candidate = Some(start);
        while let Some(node) = candidate {
            if node.contains(&end) {
                return node;
            }
            candidate = node.parent_node();
        }
        // Both boundaries share a root by construction.
        self.start.borrow().node.tree_root()
    }

    /// `compareBoundaryPoints(how, other)`: −1, 0 or +1.
    pub fn compare_boundary_points(&self, how: u16, other: &Range) -> Result<i8> {
        let same_tree = self
            .start
            .borrow()
            .node
            .tree_root()
            .is_same_node(&other.start.borrow().node.tree_root());
        if !same_tree {
            return Err(DomException::WrongDocument(
                "ranges live in different trees".into(),
            ));
        }

        let (this_point, other_point) = match how {
            boundary_mode::START_TO_START => (self.start.borrow(), other.start.borrow()),
            boundary_mode::START_TO_END => (self.end.borrow(), other.start.borrow()),
            boundary_mode::END_TO_END => (self.end.borrow(), other.end.borrow()),
            boundary_mode::END_TO_START => (self.start.borrow(), other.end.borrow()),
            _ => {
                return Err(DomException::NotSupported(format!(
                    "unknown comparison mode {how}"
                )))
            }
        };
        Ok(match this_point.cmp(&other_point) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        })
    }

    /// The text the range covers: the in-range slice of every text node.
    pub fn to_text(&self) -> String {
        let start = self.start.borrow().clone();
        let end = self.end.borrow().clone();

        if start.node.is_same_node(&end.node) && start.node.is_text() {
            return start
                .node
                .substring_data(start.offset, end.offset - start.offset)
                .unwrap_or_default();
        }

        let mut out = String::new();
        let root = self.common_ancestor_container();
        collect_range_text(&root, &start, &end, &mut out);
        out
    }

    /// Removes the covered contents from the tree.
    pub fn delete_contents(&self) -> Result<()> {
        self.extract_or_clone(true).map(|_| ())
    }

    /// Moves the covered contents into a new fragment and collapses.
    pub fn extract_contents(&self) -> Result<NodeRef> {
        self.extract_or_clone(true)
    }

    /// Copies the covered contents into a new fragment; boundaries and the
    /// source tree are untouched.
    pub fn clone_contents(&self) -> Result<NodeRef> {
        self.extract_or_clone(false)
    }

    fn owner_document(&self) -> Result<crate::document::Document> {
        let node = self.start.borrow().node.clone();
        if node.is_document() {
            return Ok(crate::document::Document::from_node(node));
        }
        node.owner_document()
            .ok_or_else(|| DomException::NotFound("range container has no document".into()))
    }

    fn extract_or_clone(&self, remove: bool) -> Result<NodeRef> {
        let doc = self.owner_document()?;
        let fragment = doc.create_document_fragment();
        let start = self.start.borrow().clone();
        let end = self.end.borrow().clone();

        if self.collapsed() {
            return Ok(fragment);
        }

        // Single character-data container: slice it.
        if start.node.is_same_node(&end.node) && start.node.is_character_data() {
            let piece = start
                .node
                .substring_data(start.offset, end.offset - start.offset)?;
            let clone = start.node.clone_node(false)?;
            clone.set_data(&piece)?;
            fragment.append_child(&clone)?;
            if remove {
                start
                    .node
                    .replace_data(start.offset, end.offset - start.offset, "")?;
                self.collapse(true);
            }
            return Ok(fragment);
        }

        // The collapse target, computed before any removal shifts indices.
        let new_boundary = if start.node.contains(&end.node) {
            start.clone()
        } else {
            let mut reference = start.node.clone();
            while let Some(parent) = reference.parent_node() {
                if parent.contains(&end.node) {
                    break;
                }
                reference = parent;
            }
            Boundary {
                node: reference
                    .parent_node()
                    .expect("boundaries share a common ancestor"),
                offset: reference.index_in_parent().unwrap_or(0) + 1,
            }
        };

        let common = self.common_ancestor_container();
        extract_between(&common, &start, &end, &fragment, remove)?;

        if remove {
            *self.start.borrow_mut() = new_boundary.clone();
            *self.end.borrow_mut() = new_boundary;
        }
        Ok(fragment)
    }

    /// Inserts `node` at the start boundary, splitting a text container.
    pub fn insert_node(&self, node: &NodeRef) -> Result<()> {
        let start = self.start.borrow().clone();

        if matches!(
            start.node.data_ref(),
            NodeData::Comment(_) | NodeData::ProcessingInstruction { .. }
        ) || (start.node.is_text() && start.node.parent_node().is_none())
        {
            return Err(DomException::HierarchyRequest(
                "cannot insert at this boundary".into(),
            ));
        }

        let (parent, reference) = if start.node.is_text() {
            let tail = start.node.split_text(start.offset)?;
            (
                start
                    .node
                    .parent_node()
                    .ok_or_else(|| DomException::HierarchyRequest("text node has no parent".into()))?,
                Some(tail),
            )
        } else {
            (start.node.clone(), start.node.child_at(start.offset))
        };

        let reference = reference.filter(|r| !r.is_same_node(node));
        crate::mutation::insert_before(&parent, node, reference.as_ref())?;

        // A collapsed range grows to cover the insertion.
        if self.collapsed() {
            let offset = match &reference {
                Some(reference) => reference.index_in_parent().unwrap_or(parent.child_count()),
                None => parent.child_count(),
            };
            *self.end.borrow_mut() = Boundary {
                node: parent,
                offset,
            };
        }
        Ok(())
    }

    /// Re-parents the covered contents under `new_parent`, which replaces
    /// them at the range position. Partially covered non-text nodes make
    /// this ambiguous, which is an error.
    pub fn surround_contents(&self, new_parent: &NodeRef) -> Result<()> {
        let start = self.start.borrow().clone();
        let end = self.end.borrow().clone();
        let common = self.common_ancestor_container();

        let splits_cleanly = |boundary: &Boundary| {
            boundary.node.is_same_node(&common)
                || (boundary.node.is_text()
                    && boundary
                        .node
                        .parent_node()
                        .is_some_and(|parent| parent.is_same_node(&common)))
        };
        if !splits_cleanly(&start) || !splits_cleanly(&end) {
            return Err(DomException::InvalidState(
                "range partially selects a non-text node".into(),
            ));
        }
        if matches!(
            new_parent.data_ref(),
            NodeData::Document(_) | NodeData::DocumentType(_) | NodeData::DocumentFragment
        ) {
            return Err(DomException::NotSupported(
                "invalid surround container".into(),
            ));
        }

        let fragment = self.extract_contents()?;
        for child in new_parent.children_snapshot() {
            child.detach();
        }
        self.insert_node(new_parent)?;
        new_parent.append_child(&fragment)?;
        self.select_node(new_parent)
    }

    /// A new range with the same boundary points.
    pub fn clone_range(&self) -> Range {
        Range {
            start: RefCell::new(self.start.borrow().clone()),
            end: RefCell::new(self.end.borrow().clone()),
        }
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn parent_and_index(node: &NodeRef) -> Result<(NodeRef, usize)> {
    let parent = node
        .parent_node()
        .ok_or_else(|| DomException::NotFound("node has no parent".into()))?;
    let index = node
        .index_in_parent()
        .ok_or_else(|| DomException::NotFound("node has no parent".into()))?;
    Ok((parent, index))
}

fn collect_range_text(node: &NodeRef, start: &Boundary, end: &Boundary, out: &mut String) {
    for child in node.children_snapshot() {
        if child.is_text() || matches!(child.data_ref(), NodeData::CDataSection(_)) {
            let data = child.data().unwrap_or_default();
            if child.is_same_node(&start.node) {
                out.push_str(&child.substring_data(start.offset, usize::MAX).unwrap_or_default());
            } else if child.is_same_node(&end.node) {
                out.push_str(&child.substring_data(0, end.offset).unwrap_or_default());
            } else {
                let position = Boundary {
                    node: child.clone(),
                    offset: 0,
                };
                let position_end = Boundary {
                    node: child.clone(),
                    offset: node_length(&child),
                };
                if position.cmp(start) != Ordering::Less && position_end.cmp(end) != Ordering::Greater
                {
                    out.push_str(&data);
                }
            }
        } else {
            collect_range_text(&child, start, end, out);
        }
    }
}

/// Whether the child slot `(parent, index..index+1)` lies entirely inside
/// `[start, end]`.
fn slot_contained(parent: &NodeRef, index: usize, start: &Boundary, end: &Boundary) -> bool {
    let before = Boundary {
        node: parent.clone(),
        offset: index,
    };
    let after = Boundary {
        node: parent.clone(),
        offset: index + 1,
    };
    before.cmp(start) != Ordering::Less && after.cmp(end) != Ordering::Greater
}

/// Recursive extraction/cloning between two boundaries, walking down from
/// `container`. Wholly contained children move (or copy) as-is; partially
/// contained ones are cloned as shells and recursed into.
fn extract_between(
    container: &NodeRef,
    start: &Boundary,
    end: &Boundary,
    into: &NodeRef,
    remove: bool,
) -> Result<()> {
    for (index, child) in container.children_snapshot().into_iter().enumerate() {
        if slot_contained(container, index, start, end) {
            if remove {
                into.append_child(&child)?;
            } else {
                let copy = child.clone_node(true)?;
                into.append_child(&copy)?;
            }
            continue;
        }

        let holds_start = child.contains(&start.node) || child.is_same_node(&start.node);
        let holds_end = child.contains(&end.node) || child.is_same_node(&end.node);
        if !holds_start && !holds_end {
            continue;
        }

        if child.is_character_data() {
            // A partially covered character-data node: slice the covered
            // part out.
            let length = node_length(&child);
            let (from, to) = if child.is_same_node(&start.node) && child.is_same_node(&end.node) {
                (start.offset, end.offset)
            } else if child.is_same_node(&start.node) {
                (start.offset, length)
            } else {
                (0, end.offset)
            };
            let piece = child.substring_data(from, to - from)?;
            let clone = child.clone_node(false)?;
            clone.set_data(&piece)?;
            into.append_child(&clone)?;
            if remove {
                child.replace_data(from, to - from, "")?;
            }
        } else {
            let shell = child.clone_node(false)?;
            into.append_child(&shell)?;
            extract_between(&child, start, end, &shell, remove)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::node::NodeRef;

    fn sample() -> (Document, NodeRef, NodeRef, NodeRef) {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        let first = doc.create_text_node("hello ");
        let em = doc.create_element("em").unwrap();
        em.append(&["brave".into()]).unwrap();
        let last = doc.create_text_node(" world");
        root.append_child(&first).unwrap();
        root.append_child(&em).unwrap();
        root.append_child(&last).unwrap();
        (doc, root, first, last)
    }

    #[test]
    fn boundary_validation() {
        let (doc, _root, first, _last) = sample();
        let range = doc.create_range();
        assert!(range.set_start(&first, 6).is_ok());
        assert!(matches!(
            range.set_start(&first, 7),
            Err(DomException::IndexSize(_))
        ));
    }

    #[test]
    fn endpoint_ordering_is_corrected() {
        let (doc, root, first, last) = sample();
        let range = doc.create_range();
        range.set_start(&last, 3).unwrap();
        // Setting the end before the start pulls the start along.
        range.set_end(&first, 2).unwrap();
        assert!(range.collapsed());
        assert!(range.start_container().is_same_node(&first));

        range.select_node_contents(&root).unwrap();
        assert_eq!(range.start_offset(), 0);
        assert_eq!(range.end_offset(), 3);
    }

    #[test]
    fn common_ancestor_and_text() {
        let (doc, root, first, last) = sample();
        let range = doc.create_range();
        range.set_start(&first, 2).unwrap();
        range.set_end(&last, 3).unwrap();
        assert!(range.common_ancestor_container().is_same_node(&root));
        assert_eq!(range.to_text(), "llo brave wo");
    }

    #[test]
    fn compare_boundary_points_modes() {
        let (doc, _root, first, last) = sample();
        let a = doc.create_range();
        a.set_start(&first, 0).unwrap();
        a.set_end(&first, 3).unwrap();
        let b = doc.create_range();
        b.set_start(&first, 3).unwrap();
        b.set_end(&last, 0).unwrap();

        assert_eq!(
            a.compare_boundary_points(boundary_mode::START_TO_START, &b)
                .unwrap(),
            -1
        );
        assert_eq!(
            a.compare_boundary_points(boundary_mode::START_TO_END, &b)
                .unwrap(),
            0
        );
        assert_eq!(
            a.compare_boundary_points(boundary_mode::END_TO_END, &b).unwrap(),
            -1
        );
    }

    #[test]
    fn extract_moves_and_collapses() {
        let (doc, root, first, last) = sample();
        let range = doc.create_range();
        range.set_start(&first, 2).unwrap();
        range.set_end(&last, 3).unwrap();

        let fragment = range.extract_contents().unwrap();
        // Partial text stays behind, trimmed.
        assert_eq!(first.data().as_deref(), Some("he"));
        assert_eq!(last.data().as_deref(), Some("rld"));
        assert_eq!(root.text_content().as_deref(), Some("herld"));
        // The fragment holds the sliced-out middle.
        assert_eq!(fragment.text_content().as_deref(), Some("llo brave wo"));
        assert!(range.collapsed());
    }

    #[test]
    fn clone_contents_leaves_source_intact() {
        let (doc, root, first, last) = sample();
        let range = doc.create_range();
        range.set_start(&first, 0).unwrap();
        range.set_end(&last, 6).unwrap();

        let fragment = range.clone_contents().unwrap();
        assert_eq!(fragment.text_content().as_deref(), Some("hello brave world"));
        assert_eq!(root.text_content().as_deref(), Some("hello brave world"));
        assert!(!range.collapsed());
    }

    #[test]
    fn surround_contents_wraps_text() {
        let (doc, root, first, _last) = sample();
        let range = doc.create_range();
        range.set_start(&first, 0).unwrap();
        range.set_end(&first, 5).unwrap();

        let wrapper = doc.create_element("b").unwrap();
        range.surround_contents(&wrapper).unwrap();
        assert!(root.first_child().unwrap().is_same_node(&wrapper));
        assert_eq!(wrapper.text_content().as_deref(), Some("hello"));
        assert_eq!(root.text_content().as_deref(), Some("hello brave world"));
    }

    #[test]
    fn insert_node_splits_text() {
        let (doc, root, first, _last) = sample();
        let range = doc.create_range();
        range.set_start(&first, 5).unwrap();
        range.collapse(true);

        let mark = doc.create_element("mark").unwrap();
        range.insert_node(&mark).unwrap();
        assert_eq!(root.child_count(), 5);
        assert!(root.child_at(1).unwrap().is_same_node(&mark));
        assert_eq!(root.child_at(0).unwrap().data().as_deref(), Some("hello"));
        assert_eq!(root.child_at(2).unwrap().data().as_deref(), Some(" "));
    }
}
