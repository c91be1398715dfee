//! Filtered pre-order traversal: the bidirectional `NodeIterator` and the
//! positioned `TreeWalker`. Both surface only nodes whose type bit is set
//! in `whatToShow` and which the optional filter accepts; `Reject` prunes
//! subtrees in the walker but equals `Skip` in the iterator.

use std::cell::{Cell, RefCell};

use crate::error::{DomException, Result};
use crate::node::NodeRef;

/// `whatToShow` bit flags; bit `1 << (nodeType - 1)`.
pub mod what_to_show {
    pub const ALL: u32 = 0xFFFF_FFFF;
    pub const ELEMENT: u32 = 0x1;
    pub const ATTRIBUTE: u32 = 0x2;
    pub const TEXT: u32 = 0x4;
    pub const CDATA_SECTION: u32 = 0x8;
    pub const ENTITY_REFERENCE: u32 = 0x10;
    pub const ENTITY: u32 = 0x20;
    pub const PROCESSING_INSTRUCTION: u32 = 0x40;
    pub const COMMENT: u32 = 0x80;
    pub const DOCUMENT: u32 = 0x100;
    pub const DOCUMENT_TYPE: u32 = 0x200;
    pub const DOCUMENT_FRAGMENT: u32 = 0x400;
    pub const NOTATION: u32 = 0x800;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    Accept,
    Reject,
    Skip,
}

pub type FilterCallback = Box<dyn Fn(&NodeRef) -> FilterResult>;

/// Combined `whatToShow` mask and optional callback filter.
pub struct NodeFilter {
    what_to_show: u32,
    callback: Option<FilterCallback>,
}

impl NodeFilter {
    pub fn all() -> Self {
        Self::show(what_to_show::ALL)
    }

    pub fn show(what_to_show: u32) -> Self {
        Self {
            what_to_show,
            callback: None,
        }
    }

    pub fn new(what_to_show: u32, callback: FilterCallback) -> Self {
        Self {
            what_to_show,
            callback: Some(callback),
        }
    }

    /// A type bit that is not set means "skip", never "reject"; only the
    /// callback can prune.
    fn check(&self, node: &NodeRef) -> FilterResult {
        let bit = 1u32 << (node.node_type() - 1);
        if self.what_to_show & bit == 0 {
            return FilterResult::Skip;
        }
        match &self.callback {
            Some(callback) => callback(node),
            None => FilterResult::Accept,
        }
    }
}

/// Pre-order successor within the subtree rooted at `root`.
fn following(node: &NodeRef, root: &NodeRef) -> Option<NodeRef> {
    if let Some(child) = node.first_child() {
        return Some(child);
    }
    let mut current = node.clone();
    loop {
        if current.is_same_node(root) {
            return None;
        }
        if let Some(sibling) = current.next_sibling() {
            return Some(sibling);
        }
        current = current.parent_node()?;
    }
}

/// Pre-order predecessor within the subtree rooted at `root`.
fn preceding(node: &NodeRef, root: &NodeRef) -> Option<NodeRef> {
    if node.is_same_node(root) {
        return None;
    }
    match node.previous_sibling() {
        Some(mut sibling) => {
            while let Some(last) = sibling.last_child() {
                sibling = last;
            }
            Some(sibling)
        }
        None => node.parent_node(),
    }
}

/// A bidirectional cursor over the subtree of `root` in document order.
/// The cursor sits before or after a reference node and `next_node` /
/// `previous_node` move it across accepted nodes.
pub struct NodeIterator {
    root: NodeRef,
    reference: RefCell<NodeRef>,
    pointer_before_reference: Cell<bool>,
    filter: NodeFilter,
    detached: Cell<bool>,
}

impl NodeIterator {
    pub(crate) fn new(root: NodeRef, filter: NodeFilter) -> Self {
        Self {
            reference: RefCell::new(root.clone()),
            root,
            pointer_before_reference: Cell::new(true),
            filter,
            detached: Cell::new(false),
        }
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.detached.get() {
            Err(DomException::InvalidState(
                "iterator has been detached".into(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn next_node(&self) -> Result<Option<NodeRef>> {
        self.ensure_attached()?;
        let mut node = self.reference.borrow().clone();
        let mut before = self.pointer_before_reference.get();

        loop {
            if before {
                before = false;
            } else {
                node = match following(&node, &self.root) {
                    Some(next) => next,
                    None => return Ok(None),
                };
            }
            if self.filter.check(&node) == FilterResult::Accept {
                break;
            }
        }

        *self.reference.borrow_mut() = node.clone();
        self.pointer_before_reference.set(false);
        Ok(Some(node))
    }

    pub fn previous_node(&self) -> Result<Option<NodeRef>> {
        self.ensure_attached()?;
        let mut node = self.reference.borrow().clone();
        let mut before = self.pointer_before_reference.get();

        loop {
            if !before {
                before = true;
            } else {
                node = match preceding(&node, &self.root) {
                    Some(previous) => previous,
                    None => return Ok(None),
                };
            }
            if self.filter.check(&node) == FilterResult::Accept {
                break;
            }
        }

        *self.reference.borrow_mut() = node.clone();
        self.pointer_before_reference.set(true);
        Ok(Some(node))
    }

    /// Invalidates the iterator; both stepping calls fail afterwards.
    pub fn detach(&self) {
        self.detached.set(true);
    }

    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }
}

/// A positioned cursor. Unlike the iterator it has a current node, and
/// `Reject` prunes whole subtrees. Traversal never leaves `root`.
pub struct TreeWalker {
    root: NodeRef,
    current: RefCell<NodeRef>,
    filter: NodeFilter,
}

enum ChildEnd {
    First,
    Last,
}

enum SiblingSide {
    Next,
    Previous,
}

impl TreeWalker {
    pub(crate) fn new(root: NodeRef, filter: NodeFilter) -> Self {
        Self {
            current: RefCell::new(root.clone()),
            root,
            filter,
        }
    }

    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }

    pub fn current_node(&self) -> NodeRef {
        self.current.borrow().clone()
    }

    pub fn set_current_node(&self, node: NodeRef) {
        *self.current.borrow_mut() = node;
    }

    pub fn parent_node(&self) -> Option<NodeRef> {
        let mut node = self.current.borrow().clone();
        while !node.is_same_node(&self.root) {
            node = node.parent_node()?;
            if self.filter.check(&node) == FilterResult::Accept {
                *self.current.borrow_mut() = node.clone();
                return Some(node);
            }
        }
        None
    }

    pub fn first_child(&self) -> Option<NodeRef> {
        self.traverse_children(ChildEnd::First)
    }

    pub fn last_child(&self) -> Option<NodeRef> {
        self.traverse_children(ChildEnd::Last)
    }

    pub fn next_sibling(&self) -> Option<NodeRef> {
        self.traverse_siblings(SiblingSide::Next)
    }

    pub fn previous_sibling(&self) -> Option<NodeRef> {
        self.traverse_siblings(SiblingSide::Previous)
    }

    fn traverse_children(&self, end: ChildEnd) -> Option<NodeRef> {
        let start = self.current.borrow().clone();
        let pick = |node: &NodeRef| match end {
            ChildEnd::First => node.first_child(),
            ChildEnd::Last => node.last_child(),
        };
        let step = |node: &NodeRef| match end {
            ChildEnd::First => node.next_sibling(),
            ChildEnd::Last => node.previous_sibling(),
        };

        let mut node = pick(&start)?;
        loop {
            match self.filter.check(&node) {
                FilterResult::Accept => {
                    *self.current.borrow_mut() = node.clone();
                    return Some(node);
                }
                FilterResult::Skip => {
                    // Descend through skipped nodes.
                    if let Some(child) = pick(&node) {
                        node = child;
                        continue;
                    }
                }
                FilterResult::Reject => {}
            }
            // Rejected subtree (or skipped leaf): move sideways, climbing
            // back out without passing the starting node.
            loop {
                if let Some(sibling) = step(&node) {
                    node = sibling;
                    break;
                }
                let parent = node.parent_node()?;
                if parent.is_same_node(&self.root) || parent.is_same_node(&start) {
                    return None;
                }
                node = parent;
            }
        }
    }

    fn traverse_siblings(&self, side: SiblingSide) -> Option<NodeRef> {
        let mut node = self.current.borrow().clone();
        if node.is_same_node(&self.root) {
            return None;
        }
        let step = |node: &NodeRef| match side {
            SiblingSide::Next => node.next_sibling(),
            SiblingSide::Previous => node.previous_sibling(),
        };
        let descend = |node: &NodeRef| match side {
            SiblingSide::Next => node.first_child(),
            SiblingSide::Previous => node.last_child(),
        };

        loop {
            let mut sibling = step(&node);
            while let Some(candidate) = sibling {
                node = candidate;
                let result = self.filter.check(&node);
                if result == FilterResult::Accept {
                    *self.current.borrow_mut() = node.clone();
                    return Some(node);
                }
                // Skipped nodes are transparent: look inside them first.
                sibling = match descend(&node) {
                    Some(child) if result != FilterResult::Reject => Some(child),
                    _ => step(&node),
                };
            }
            node = node.parent_node()?;
            if node.is_same_node(&self.root) {
                return None;
            }
            if self.filter.check(&node) == FilterResult::Accept {
                return None;
            }
        }
    }

    pub fn next_node(&self) -> Option<NodeRef> {
        let mut node = self.current.borrow().clone();
        let mut result = FilterResult::Accept;

        loop {
            while result != FilterResult::Reject {
                let Some(child) = node.first_child() else {
                    break;
                };
                node = child;
                result = self.filter.check(&node);
                if result == FilterResult::Accept {
                    *self.current.borrow_mut() = node.clone();
                    return Some(node);
                }
            }

            let mut temp = node.clone();
            let sibling = loop {
                if temp.is_same_node(&self.root) {
                    return None;
                }
                if let Some(sibling) = temp.next_sibling() {
                    break sibling;
                }
                temp = temp.parent_node()?;
            };
            node = sibling;
            result = self.filter.check(&node);
            if result == FilterResult::Accept {
                *self.current.borrow_mut() = node.clone();
                return Some(node);
            }
        }
    }

    pub fn previous_node(&self) -> Option<NodeRef> {
        let mut node = self.current.borrow().clone();

        while !node.is_same_node(&self.root) {
            let mut sibling = node.previous_sibling();
            while let Some(candidate) = sibling {
                node = candidate;
                let mut result = self.filter.check(&node);
                // Dive to the last visible descendant.
                while result != FilterResult::Reject {
                    let Some(last) = node.last_child() else {
                        break;
                    };
                    node = last;
                    result = self.filter.check(&node);
                }
                if result == FilterResult::Accept {
                    *self.current.borrow_mut() = node.clone();
                    return Some(node);
                }
                sibling = node.previous_sibling();
            }
            node = node.parent_node()?;
            if node.is_same_node(&self.root) {
                return None;
            }
            if self.filter.check(&node) == FilterResult::Accept {
                *self.current.borrow_mut() = node.clone();
                return Some(node);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::node::NodeRef;

    fn sample() -> (Document, NodeRef) {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        // <r><a>one<b/></a><!--note--><c>two</c></r>
        let a = doc.create_element("a").unwrap();
        root.append_child(&a).unwrap();
        a.append(&["one".into()]).unwrap();
        a.append_child(&doc.create_element("b").unwrap()).unwrap();
        root.append_child(&doc.create_comment("note")).unwrap();
        let c = doc.create_element("c").unwrap();
        root.append_child(&c).unwrap();
        c.append(&["two".into()]).unwrap();
        (doc, root)
    }

    #[test]
    fn iterator_walks_in_document_order() {
        let (doc, root) = sample();
        let iter = doc.create_node_iterator(&root, NodeFilter::show(what_to_show::ELEMENT));
        let names: Vec<String> = std::iter::from_fn(|| iter.next_node().unwrap())
            .map(|node| node.node_name())
            .collect();
        assert_eq!(names, ["r", "a", "b", "c"]);

        // And back again.
        let back: Vec<String> = std::iter::from_fn(|| iter.previous_node().unwrap())
            .map(|node| node.node_name())
            .collect();
        assert_eq!(back, ["c", "b", "a", "r"]);
    }

    #[test]
    fn iterator_matches_walker_with_same_mask() {
        let (doc, root) = sample();
        let iter = doc.create_node_iterator(&root, NodeFilter::show(what_to_show::TEXT));
        let from_iter: Vec<String> = std::iter::from_fn(|| iter.next_node().unwrap())
            .filter_map(|node| node.data())
            .collect();

        let walker = doc.create_tree_walker(&root, NodeFilter::show(what_to_show::TEXT));
        let mut from_walker = Vec::new();
        while let Some(node) = walker.next_node() {
            from_walker.extend(node.data());
        }
        assert_eq!(from_iter, from_walker);
        assert_eq!(from_iter, ["one", "two"]);
    }

    #[test]
    fn detach_invalidates() {
        let (doc, root) = sample();
        let iter = doc.create_node_iterator(&root, NodeFilter::all());
        iter.next_node().unwrap();
        iter.detach();
        assert!(iter.next_node().is_err());
        assert!(iter.previous_node().is_err());
    }

    #[test]
    fn walker_reject_prunes_but_skip_descends() {
        let (doc, root) = sample();

        // Reject <a>: its children disappear.
        let reject = doc.create_tree_walker(
            &root,
            NodeFilter::new(
                what_to_show::ELEMENT,
                Box::new(|node| {
                    if node.node_name() == "a" {
                        FilterResult::Reject
                    } else {
                        FilterResult::Accept
                    }
                }),
            ),
        );
        let mut seen = Vec::new();
        while let Some(node) = reject.next_node() {
            seen.push(node.node_name());
        }
        assert_eq!(seen, ["c"]);

        // Skip <a>: its children remain visible.
        let skip = doc.create_tree_walker(
            &root,
            NodeFilter::new(
                what_to_show::ELEMENT,
                Box::new(|node| {
                    if node.node_name() == "a" {
                        FilterResult::Skip
                    } else {
                        FilterResult::Accept
                    }
                }),
            ),
        );
        let mut seen = Vec::new();
        while let Some(node) = skip.next_node() {
            seen.push(node.node_name());
        }
        assert_eq!(seen, ["b", "c"]);
    }

    #[test]
    fn walker_family_moves() {
        let (doc, root) = sample();
        let walker = doc.create_tree_walker(&root, NodeFilter::show(what_to_show::ELEMENT));

        let a = walker.first_child().unwrap();
        assert_eq!(a.node_name(), "a");
        let c = walker.next_sibling().unwrap();
        assert_eq!(c.node_name(), "c");
        assert_eq!(walker.previous_sibling().unwrap().node_name(), "a");
        assert_eq!(walker.first_child().unwrap().node_name(), "b");
        assert_eq!(walker.parent_node().unwrap().node_name(), "a");
        assert_eq!(walker.last_child().unwrap().node_name(), "b");
    }
}
