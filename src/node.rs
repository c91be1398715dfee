//! The node graph: a reference-counted tree with strong child edges and weak
//! parent / owner-document back-edges, so removing the last external handle
//! to a document releases the whole graph.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::attr::{AttrData, ElementData};
use crate::document::{Document, DocumentData};
use crate::error::{DomException, Result};
use crate::live::NodeList;
use crate::name::{QualName, XML_NAMESPACE, XMLNS_NAMESPACE};

/// DOM Level 2 node-type codes, plus the XPath-only namespace node.
pub mod node_type {
    pub const ELEMENT: u16 = 1;
    pub const ATTRIBUTE: u16 = 2;
    pub const TEXT: u16 = 3;
    pub const CDATA_SECTION: u16 = 4;
    pub const ENTITY_REFERENCE: u16 = 5;
    pub const ENTITY: u16 = 6;
    pub const PROCESSING_INSTRUCTION: u16 = 7;
    pub const COMMENT: u16 = 8;
    pub const DOCUMENT: u16 = 9;
    pub const DOCUMENT_TYPE: u16 = 10;
    pub const DOCUMENT_FRAGMENT: u16 = 11;
    pub const NOTATION: u16 = 12;
    /// Synthetic; only ever produced by the XPath `namespace` axis.
    pub const NAMESPACE: u16 = 13;
}

/// `compareDocumentPosition` bitmask flags.
pub mod document_position {
    pub const DISCONNECTED: u16 = 0x01;
    pub const PRECEDING: u16 = 0x02;
    pub const FOLLOWING: u16 = 0x04;
    pub const CONTAINS: u16 = 0x08;
    pub const CONTAINED_BY: u16 = 0x10;
    pub const IMPLEMENTATION_SPECIFIC: u16 = 0x20;
}

pub struct DoctypeData {
    pub name: String,
    pub public_id: String,
    pub system_id: String,
    /// Entity nodes declared in the internal subset, in declaration order.
    pub entities: RefCell<Vec<NodeRef>>,
    pub notations: RefCell<Vec<NodeRef>>,
}

/// Payload of a synthetic namespace node. It never joins a sibling chain;
/// document ordering goes through the owner element.
pub struct NamespaceData {
    pub prefix: Option<String>,
    pub uri: String,
    pub owner_element: WeakNodeRef,
    /// Position among the in-scope bindings of the owner, for ordering.
    pub index: usize,
}

/// The tagged variant carried by every tree node.
pub enum NodeData {
    Document(DocumentData),
    DocumentType(DoctypeData),
    DocumentFragment,
    Element(ElementData),
    Attribute(AttrData),
    Text(RefCell<String>),
    CDataSection(RefCell<String>),
    Comment(RefCell<String>),
    ProcessingInstruction {
        target: String,
        data: RefCell<String>,
    },
    EntityReference(String),
    Entity {
        name: String,
        value: String,
    },
    Notation {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    Namespace(NamespaceData),
}

pub(crate) struct TreeNode {
    pub(crate) data: NodeData,
    /// Weak back-reference; `None` while detached.
    pub(crate) parent: Cell<Option<WeakNodeRef>>,
    pub(crate) children: RefCell<Vec<NodeRef>>,
    /// Weak reference to the owner document node. `None` on documents
    /// themselves (a document owns itself).
    pub(crate) owner: RefCell<Option<WeakNodeRef>>,
}

/// A strong handle to a node. Cloning the handle clones the reference, not
/// the node; identity is pointer identity.
#[derive(Clone)]
pub struct NodeRef(pub(crate) Rc<TreeNode>);

/// Weak counterpart of [`NodeRef`], used for every upward edge.
#[derive(Clone)]
pub struct WeakNodeRef(pub(crate) Weak<TreeNode>);

impl WeakNodeRef {
    pub fn upgrade(&self) -> Option<NodeRef> {
        self.0.upgrade().map(NodeRef)
    }
}

pub(crate) fn new_node(data: NodeData) -> NodeRef {
    NodeRef(Rc::new(TreeNode {
        data,
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        owner: RefCell::new(None),
    }))
}

impl NodeRef {
    pub fn downgrade(&self) -> WeakNodeRef {
        WeakNodeRef(Rc::downgrade(&self.0))
    }

    pub(crate) fn data_ref(&self) -> &NodeData {
        &self.0.data
    }

    /// Two handles denote the same node iff they share the allocation.
    pub fn is_same_node(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable per-node key; used for dedup and disconnected-tree ordering.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn node_type(&self) -> u16 {
        match &self.0.data {
            NodeData::Element(_) => node_type::ELEMENT,
            NodeData::Attribute(_) => node_type::ATTRIBUTE,
            NodeData::Text(_) => node_type::TEXT,
            NodeData::CDataSection(_) => node_type::CDATA_SECTION,
            NodeData::EntityReference(_) => node_type::ENTITY_REFERENCE,
            NodeData::Entity { .. } => node_type::ENTITY,
            NodeData::ProcessingInstruction { .. } => node_type::PROCESSING_INSTRUCTION,
            NodeData::Comment(_) => node_type::COMMENT,
            NodeData::Document(_) => node_type::DOCUMENT,
            NodeData::DocumentType(_) => node_type::DOCUMENT_TYPE,
            NodeData::DocumentFragment => node_type::DOCUMENT_FRAGMENT,
            NodeData::Notation { .. } => node_type::NOTATION,
            NodeData::Namespace(_) => node_type::NAMESPACE,
        }
    }

    pub fn node_name(&self) -> String {
        match &self.0.data {
            NodeData::Element(el) => el.name.borrow().qualified(),
            NodeData::Attribute(attr) => attr.name.borrow().qualified(),
            NodeData::Text(_) => "#text".into(),
            NodeData::CDataSection(_) => "#cdata-section".into(),
            NodeData::Comment(_) => "#comment".into(),
            NodeData::ProcessingInstruction { target, .. } => target.clone(),
            NodeData::Document(_) => "#document".into(),
            NodeData::DocumentType(dt) => dt.name.clone(),
            NodeData::DocumentFragment => "#document-fragment".into(),
            NodeData::EntityReference(name) => name.clone(),
            NodeData::Entity { name, .. } => name.clone(),
            NodeData::Notation { name, .. } => name.clone(),
            NodeData::Namespace(ns) => ns.prefix.clone().unwrap_or_default(),
        }
    }

    pub fn node_value(&self) -> Option<String> {
        match &self.0.data {
            NodeData::Attribute(attr) => Some(attr.value.borrow().clone()),
            NodeData::Text(data) | NodeData::CDataSection(data) | NodeData::Comment(data) => {
                Some(data.borrow().clone())
            }
            NodeData::ProcessingInstruction { data, .. } => Some(data.borrow().clone()),
            NodeData::Entity { value, .. } => Some(value.clone()),
            NodeData::Namespace(ns) => Some(ns.uri.clone()),
            _ => None,
        }
    }

    pub fn set_node_value(&self, value: &str) -> Result<()> {
        match &self.0.data {
            NodeData::Attribute(_) => {
                crate::attr::set_attr_value(self, value);
                Ok(())
            }
            NodeData::Text(data) | NodeData::CDataSection(data) | NodeData::Comment(data) => {
                *data.borrow_mut() = value.to_owned();
                self.bump_version();
                Ok(())
            }
            NodeData::ProcessingInstruction { data, .. } => {
                *data.borrow_mut() = value.to_owned();
                self.bump_version();
                Ok(())
            }
            NodeData::Entity { .. } | NodeData::Notation { .. } | NodeData::Namespace(_) => Err(
                DomException::NoModificationAllowed("node value is read-only".into()),
            ),
            // Document, doctype, element, fragment, entity reference: a
            // no-op per DOM (value is defined as null).
            _ => Ok(()),
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.data, NodeData::Element(_))
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.0.data, NodeData::Attribute(_))
    }

    pub fn is_document(&self) -> bool {
        matches!(self.0.data, NodeData::Document(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.0.data, NodeData::Text(_))
    }

    pub fn is_character_data(&self) -> bool {
        matches!(
            self.0.data,
            NodeData::Text(_)
                | NodeData::CDataSection(_)
                | NodeData::Comment(_)
                | NodeData::ProcessingInstruction { .. }
        )
    }

    /// The element name, for element nodes.
    pub fn qual_name(&self) -> Option<QualName> {
        match &self.0.data {
            NodeData::Element(el) => Some(el.name.borrow().clone()),
            NodeData::Attribute(attr) => Some(attr.name.borrow().clone()),
            _ => None,
        }
    }

    pub fn local_name(&self) -> Option<String> {
        self.qual_name().map(|name| name.local)
    }

    pub fn prefix(&self) -> Option<String> {
        self.qual_name().and_then(|name| name.prefix)
    }

    pub fn namespace_uri(&self) -> Option<String> {
        match &self.0.data {
            NodeData::Element(el) => el.name.borrow().ns.clone(),
            NodeData::Attribute(attr) => attr.name.borrow().ns.clone(),
            _ => None,
        }
    }

    /// Re-prefixes an element or attribute. The reserved pairings are
    /// re-checked against the node's current namespace.
    pub fn set_prefix(&self, prefix: Option<&str>) -> Result<()> {
        let name = match &self.0.data {
            NodeData::Element(el) => &el.name,
            NodeData::Attribute(attr) => &attr.name,
            _ => {
                return Err(DomException::NotSupported(
                    "only elements and attributes carry a prefix".into(),
                ))
            }
        };

        let qualified = match prefix {
            Some(p) => format!("{p}:{}", name.borrow().local),
            None => name.borrow().local.clone(),
        };
        let ns = name.borrow().ns.clone();
        crate::name::validate_qualified_name(ns.as_deref(), &qualified)?;

        name.borrow_mut().prefix = prefix.map(str::to_owned);
        self.bump_version();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Navigation

    pub fn parent_node(&self) -> Option<NodeRef> {
        let parent = self.0.parent.take();
        let cloned = parent.clone();
        self.0.parent.set(parent);
        cloned.and_then(|weak| weak.upgrade())
    }

    /// For attributes this is the owning element; for everything else the
    /// tree parent. Namespace nodes have no parent at all.
    pub fn parent_or_owner(&self) -> Option<NodeRef> {
        match &self.0.data {
            NodeData::Attribute(attr) => attr.owner_element(),
            NodeData::Namespace(_) => None,
            _ => self.parent_node(),
        }
    }

    pub fn first_child(&self) -> Option<NodeRef> {
        self.0.children.borrow().first().cloned()
    }

    pub fn last_child(&self) -> Option<NodeRef> {
        self.0.children.borrow().last().cloned()
    }

    pub fn has_child_nodes(&self) -> bool {
        !self.0.children.borrow().is_empty()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn child_at(&self, index: usize) -> Option<NodeRef> {
        self.0.children.borrow().get(index).cloned()
    }

    /// A materialized copy of the current child list.
    pub(crate) fn children_snapshot(&self) -> Vec<NodeRef> {
        self.0.children.borrow().clone()
    }

    /// The live child list (spec: `childNodes`).
    pub fn child_nodes(&self) -> NodeList {
        NodeList::child_nodes(self)
    }

    pub(crate) fn index_in_parent(&self) -> Option<usize> {
        let parent = self.parent_node()?;
        let index = parent
            .0
            .children
            .borrow()
            .iter()
            .position(|child| child.is_same_node(self));
        index
    }

    pub fn previous_sibling(&self) -> Option<NodeRef> {
        let parent = self.parent_node()?;
        let index = self.index_in_parent()?;
        if index == 0 {
            None
        } else {
            parent.child_at(index - 1)
        }
    }

    pub fn next_sibling(&self) -> Option<NodeRef> {
        let parent = self.parent_node()?;
        let index = self.index_in_parent()?;
        parent.child_at(index + 1)
    }

    /// The owner document node. Documents own themselves.
    pub(crate) fn owner_document_node(&self) -> Option<NodeRef> {
        if self.is_document() {
            return Some(self.clone());
        }
        self.0
            .owner
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade())
    }

    pub fn owner_document(&self) -> Option<Document> {
        if self.is_document() {
            return None;
        }
        self.owner_document_node().map(Document::from_node)
    }

    pub(crate) fn set_owner(&self, owner: Option<&NodeRef>) {
        *self.0.owner.borrow_mut() = owner.map(NodeRef::downgrade);
    }

    /// Reassigns the owner document across the subtree, attributes included.
    pub(crate) fn set_owner_recursive(&self, owner: &NodeRef) {
        self.set_owner(Some(owner));
        if let NodeData::Element(el) = &self.0.data {
            for attr in el.attrs.borrow().iter() {
                attr.set_owner(Some(owner));
            }
        }
        for child in self.children_snapshot() {
            child.set_owner_recursive(owner);
        }
    }

    /// Root of this node's tree (may be the node itself when detached).
    pub(crate) fn tree_root(&self) -> NodeRef {
        let mut current = match &self.0.data {
            NodeData::Attribute(attr) => match attr.owner_element() {
                Some(owner) => owner,
                None => return self.clone(),
            },
            NodeData::Namespace(ns) => match ns.owner_element.upgrade() {
                Some(owner) => owner,
                None => return self.clone(),
            },
            _ => self.clone(),
        };
        while let Some(parent) = current.parent_node() {
            current = parent;
        }
        current
    }

    /// True iff `other` is an inclusive descendant of `self`. Attributes
    /// count as contained by their owner element.
    pub fn contains(&self, other: &NodeRef) -> bool {
        let mut current = Some(match &other.0.data {
            NodeData::Attribute(attr) => match attr.owner_element() {
                Some(owner) => {
                    if self.is_same_node(other) {
                        return true;
                    }
                    owner
                }
                None => return self.is_same_node(other),
            },
            _ => other.clone(),
        });
        while let Some(node) = current {
            if node.is_same_node(self) {
                return true;
            }
            current = node.parent_node();
        }
        false
    }

    pub(crate) fn is_inclusive_ancestor_of(&self, other: &NodeRef) -> bool {
        self.contains(other)
    }

    /// Detaches from the current parent, if any. Does not touch indices;
    /// the mutation layer wraps this.
    pub(crate) fn detach(&self) {
        if let Some(parent) = self.parent_node() {
            let mut children = parent.0.children.borrow_mut();
            if let Some(index) = children.iter().position(|child| child.is_same_node(self)) {
                children.remove(index);
            }
            self.0.parent.set(None);
        }
    }

    pub(crate) fn set_parent(&self, parent: Option<&NodeRef>) {
        self.0.parent.set(parent.map(NodeRef::downgrade));
    }

    /// Bumps the owner document's mutation counter; every live view and
    /// XPath iterator keys off this.
    pub(crate) fn bump_version(&self) {
        if let Some(doc) = self.owner_document_node() {
            if let NodeData::Document(data) = &doc.0.data {
                data.version.set(data.version.get() + 1);
            }
        }
    }

    // ------------------------------------------------------------------
    // Text content

    /// `textContent`: `None` for documents and doctypes, the data for
    /// character data, the concatenated descendant text otherwise.
    pub fn text_content(&self) -> Option<String> {
        match &self.0.data {
            NodeData::Document(_) | NodeData::DocumentType(_) | NodeData::Notation { .. } => None,
            NodeData::Text(data) | NodeData::CDataSection(data) | NodeData::Comment(data) => {
                Some(data.borrow().clone())
            }
            NodeData::ProcessingInstruction { data, .. } => Some(data.borrow().clone()),
            NodeData::Attribute(attr) => Some(attr.value.borrow().clone()),
            NodeData::Namespace(ns) => Some(ns.uri.clone()),
            _ => {
                let mut out = String::new();
                self.collect_text(&mut out);
                Some(out)
            }
        }
    }

    pub(crate) fn collect_text(&self, out: &mut String) {
        for child in self.0.children.borrow().iter() {
            match &child.0.data {
                NodeData::Text(data) | NodeData::CDataSection(data) => {
                    out.push_str(&data.borrow())
                }
                NodeData::Comment(_) | NodeData::ProcessingInstruction { .. } => {}
                _ => child.collect_text(out),
            }
        }
    }

    pub fn set_text_content(&self, text: &str) -> Result<()> {
        match &self.0.data {
            NodeData::Text(data) | NodeData::CDataSection(data) | NodeData::Comment(data) => {
                *data.borrow_mut() = text.to_owned();
                self.bump_version();
                Ok(())
            }
            NodeData::ProcessingInstruction { data, .. } => {
                *data.borrow_mut() = text.to_owned();
                self.bump_version();
                Ok(())
            }
            NodeData::Attribute(_) => {
                crate::attr::set_attr_value(self, text);
                Ok(())
            }
            NodeData::Element(_) | NodeData::DocumentFragment | NodeData::EntityReference(_) => {
                for child in self.children_snapshot() {
                    child.detach();
                }
                if !text.is_empty() {
                    let doc = self.owner_document().ok_or_else(|| {
                        DomException::NotFound("node has no owner document".into())
                    })?;
                    let node = doc.create_text_node(text);
                    crate::mutation::append_child(self, &node)?;
                }
                self.bump_version();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Cloning and equality

    /// Returns a copy owned by `owner`. `deep` copies children; attributes
    /// of an element are always copied.
    pub(crate) fn clone_into(&self, owner: &NodeRef, deep: bool) -> Result<NodeRef> {
        let data = match &self.0.data {
            NodeData::Element(el) => NodeData::Element(ElementData::new(el.name.borrow().clone())),
            NodeData::Attribute(attr) => NodeData::Attribute(AttrData::new(
                attr.name.borrow().clone(),
                attr.value.borrow().clone(),
            )),
            NodeData::Text(data) => NodeData::Text(RefCell::new(data.borrow().clone())),
            NodeData::CDataSection(data) => {
                NodeData::CDataSection(RefCell::new(data.borrow().clone()))
            }
            NodeData::Comment(data) => NodeData::Comment(RefCell::new(data.borrow().clone())),
            NodeData::ProcessingInstruction { target, data } => NodeData::ProcessingInstruction {
                target: target.clone(),
                data: RefCell::new(data.borrow().clone()),
            },
            NodeData::DocumentFragment => NodeData::DocumentFragment,
            NodeData::EntityReference(name) => NodeData::EntityReference(name.clone()),
            NodeData::Entity { name, value } => NodeData::Entity {
                name: name.clone(),
                value: value.clone(),
            },
            NodeData::Notation {
                name,
                public_id,
                system_id,
            } => NodeData::Notation {
                name: name.clone(),
                public_id: public_id.clone(),
                system_id: system_id.clone(),
            },
            NodeData::Document(_) | NodeData::DocumentType(_) | NodeData::Namespace(_) => {
                return Err(DomException::NotSupported(
                    "this node kind cannot be copied".into(),
                ))
            }
        };

        let copy = new_node(data);
        copy.set_owner(Some(owner));

        if let (NodeData::Element(src), NodeData::Element(dst)) = (&self.0.data, &copy.0.data) {
            for attr in src.attrs.borrow().iter() {
                let attr_copy = attr.clone_into(owner, true)?;
                dst.attach_attr(&copy, &attr_copy)?;
            }
        }

        if deep {
            for child in self.0.children.borrow().iter() {
                let child_copy = child.clone_into(owner, true)?;
                child_copy.set_parent(Some(&copy));
                copy.0.children.borrow_mut().push(child_copy);
            }
        }

        Ok(copy)
    }

    /// `cloneNode`: a copy within the same document. Documents and doctypes
    /// are not cloneable through this path.
    pub fn clone_node(&self, deep: bool) -> Result<NodeRef> {
        let owner = self
            .owner_document_node()
            .ok_or_else(|| DomException::NotFound("node has no owner document".into()))?;
        self.clone_into(&owner, deep)
    }

    /// Structural equality per the DOM living standard: same type, same
    /// name/value triple, equal attribute sets (order-insensitive), and
    /// pairwise-equal children in order.
    pub fn is_equal_node(&self, other: &NodeRef) -> bool {
        if self.is_same_node(other) {
            return true;
        }
        if self.node_type() != other.node_type() {
            return false;
        }

        let payload_equal = match (&self.0.data, &other.0.data) {
            (NodeData::Element(a), NodeData::Element(b)) => {
                if *a.name.borrow() != *b.name.borrow() {
                    false
                } else {
                    let attrs_a = a.attrs.borrow();
                    let attrs_b = b.attrs.borrow();
                    attrs_a.len() == attrs_b.len()
                        && attrs_a.iter().all(|attr| {
                            let name = attr.qual_name().expect("attribute has a name");
                            attrs_b.iter().any(|candidate| {
                                candidate.qual_name().expect("attribute has a name") == name
                                    && candidate.node_value() == attr.node_value()
                            })
                        })
                }
            }
            (NodeData::Attribute(a), NodeData::Attribute(b)) => {
                *a.name.borrow() == *b.name.borrow() && *a.value.borrow() == *b.value.borrow()
            }
            (NodeData::DocumentType(a), NodeData::DocumentType(b)) => {
                a.name == b.name && a.public_id == b.public_id && a.system_id == b.system_id
            }
            (NodeData::ProcessingInstruction { target: ta, data: da },
             NodeData::ProcessingInstruction { target: tb, data: db }) => {
                ta == tb && *da.borrow() == *db.borrow()
            }
            _ => self.node_name() == other.node_name() && self.node_value() == other.node_value(),
        };
        if !payload_equal {
            return false;
        }

        let children_a = self.0.children.borrow();
        let children_b = other.0.children.borrow();
        children_a.len() == children_b.len()
            && children_a
                .iter()
                .zip(children_b.iter())
                .all(|(a, b)| a.is_equal_node(b))
    }

    // ------------------------------------------------------------------
    // Document order

    /// Sort key relative to the tree root: one `(class, index)` step per
    /// level. Namespace nodes (class 0) precede attributes (class 1)
    /// precede children (class 2), matching serialization order.
    fn order_path(&self) -> Vec<(u8, usize)> {
        fn ancestor_path(node: &NodeRef, path: &mut Vec<(u8, usize)>) {
            if let Some(parent) = node.parent_node() {
                ancestor_path(&parent, path);
                path.push((2, node.index_in_parent().unwrap_or(0)));
            }
        }

        let mut path = Vec::new();
        match &self.0.data {
            NodeData::Attribute(attr) => {
                if let Some(owner) = attr.owner_element() {
                    ancestor_path(&owner, &mut path);
                    let index = owner.attr_index_of(self).unwrap_or(0);
                    path.push((1, index));
                }
            }
            NodeData::Namespace(ns) => {
                if let Some(owner) = ns.owner_element.upgrade() {
                    ancestor_path(&owner, &mut path);
                    path.push((0, ns.index));
                }
            }
            _ => ancestor_path(self, &mut path),
        }
        path
    }

    fn attr_index_of(&self, attr: &NodeRef) -> Option<usize> {
        match &self.0.data {
            NodeData::Element(el) => el
                .attrs
                .borrow()
                .iter()
                .position(|candidate| candidate.is_same_node(attr)),
            _ => None,
        }
    }

    /// Total document order. Nodes in different trees order by their roots'
    /// stable addresses, giving the implementation-stable cross-tree order
    /// unions require.
    pub(crate) fn compare_order(&self, other: &NodeRef) -> Ordering {
        if self.is_same_node(other) {
            return Ordering::Equal;
        }
        let root_a = self.tree_root();
        let root_b = other.tree_root();
        if !root_a.is_same_node(&root_b) {
            return root_a.addr().cmp(&root_b.addr());
        }
        // Ancestor-prefix paths compare less, so an element precedes its
        // attributes, namespaces and content.
        self.order_path().cmp(&other.order_path())
    }

    /// `compareDocumentPosition`: where `other` stands relative to `self`.
    pub fn compare_document_position(&self, other: &NodeRef) -> u16 {
        use document_position::*;

        if self.is_same_node(other) {
            return 0;
        }

        let root_a = self.tree_root();
        let root_b = other.tree_root();
        if !root_a.is_same_node(&root_b) {
            let order = if root_a.addr() < root_b.addr() {
                FOLLOWING
            } else {
                PRECEDING
            };
            return DISCONNECTED | IMPLEMENTATION_SPECIFIC | order;
        }

        if self.contains(other) && !self.is_same_node(other) {
            return CONTAINED_BY | FOLLOWING;
        }
        if other.contains(self) {
            return CONTAINS | PRECEDING;
        }
        match self.compare_order(other) {
            Ordering::Less => FOLLOWING,
            Ordering::Greater => PRECEDING,
            Ordering::Equal => 0,
        }
    }

    // ------------------------------------------------------------------
    // Namespace lookup

    /// Nearest in-scope URI for `prefix` (`None` asks for the default
    /// namespace), per the DOM lookup algorithm.
    pub fn lookup_namespace_uri(&self, prefix: Option<&str>) -> Option<String> {
        match prefix {
            Some("xml") => return Some(XML_NAMESPACE.to_owned()),
            Some("xmlns") => return Some(XMLNS_NAMESPACE.to_owned()),
            _ => {}
        }

        let start = match &self.0.data {
            NodeData::Element(_) => Some(self.clone()),
            NodeData::Attribute(attr) => attr.owner_element(),
            NodeData::Document(_) => Document::from_node(self.clone()).document_element(),
            _ => self.parent_node(),
        };

        let mut current = start;
        while let Some(node) = current {
            if let NodeData::Element(el) = &node.0.data {
                let name = el.name.borrow();
                if name.prefix.as_deref() == prefix && name.ns.is_some() {
                    return name.ns.clone();
                }
                drop(name);
                for attr in el.attrs.borrow().iter() {
                    let attr_name = attr.qual_name().expect("attribute has a name");
                    let declared = match (&attr_name.prefix, attr_name.local.as_str()) {
                        (Some(p), local) if p == "xmlns" => Some(Some(local)),
                        (None, "xmlns") => Some(None),
                        _ => None,
                    };
                    if declared == Some(prefix) {
                        let value = attr.node_value().unwrap_or_default();
                        return if value.is_empty() { None } else { Some(value) };
                    }
                }
            }
            current = node.parent_node();
        }
        None
    }

    /// Nearest in-scope prefix bound to `uri`.
    pub fn lookup_prefix(&self, uri: &str) -> Option<String> {
        if uri.is_empty() {
            return None;
        }
        let start = match &self.0.data {
            NodeData::Element(_) => Some(self.clone()),
            NodeData::Attribute(attr) => attr.owner_element(),
            NodeData::Document(_) => Document::from_node(self.clone()).document_element(),
            _ => self.parent_node(),
        };

        let mut current = start;
        while let Some(node) = current {
            if let NodeData::Element(el) = &node.0.data {
                let name = el.name.borrow();
                if name.ns.as_deref() == Some(uri) && name.prefix.is_some() {
                    return name.prefix.clone();
                }
                drop(name);
                for attr in el.attrs.borrow().iter() {
                    let attr_name = attr.qual_name().expect("attribute has a name");
                    if attr_name.prefix.as_deref() == Some("xmlns")
                        && attr.node_value().as_deref() == Some(uri)
                    {
                        return Some(attr_name.local);
                    }
                }
            }
            current = node.parent_node();
        }
        None
    }

    pub fn is_default_namespace(&self, uri: &str) -> bool {
        match self.lookup_namespace_uri(None) {
            Some(default) => default == uri,
            None => uri.is_empty(),
        }
    }

    pub fn base_uri(&self) -> String {
        self.owner_document_node()
            .map(|doc| Document::from_node(doc).document_uri())
            .unwrap_or_default()
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_node(other)
    }
}

impl Eq for NodeRef {}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.data {
            NodeData::Element(el) => write!(f, "Element(<{}>)", el.name.borrow()),
            NodeData::Attribute(attr) => {
                write!(f, "Attr({}={:?})", attr.name.borrow(), attr.value.borrow())
            }
            NodeData::Text(data) => write!(f, "Text({:?})", data.borrow()),
            NodeData::CDataSection(data) => write!(f, "CData({:?})", data.borrow()),
            NodeData::Comment(data) => write!(f, "Comment({:?})", data.borrow()),
            NodeData::ProcessingInstruction { target, .. } => write!(f, "PI(<?{target}?>)"),
            NodeData::Document(_) => f.write_str("Document"),
            NodeData::DocumentType(dt) => write!(f, "Doctype({})", dt.name),
            NodeData::DocumentFragment => f.write_str("DocumentFragment"),
            NodeData::EntityReference(name) => write!(f, "EntityRef(&{name};)"),
            NodeData::Entity { name, .. } => write!(f, "Entity({name})"),
            NodeData::Notation { name, .. } => write!(f, "Notation({name})"),
            NodeData::Namespace(ns) => {
                write!(f, "Namespace({:?}={})", ns.prefix, ns.uri)
            }
        }
    }
}

/// Pre-order walk over the subtree rooted at `root`, root excluded.
pub(crate) fn descendants(root: &NodeRef) -> Vec<NodeRef> {
    let mut out = Vec::new();
    fn walk(node: &NodeRef, out: &mut Vec<NodeRef>) {
        for child in node.0.children.borrow().iter() {
            out.push(child.clone());
            walk(child, out);
        }
    }
    walk(root, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use crate::document::Document;
    use crate::node::document_position;

    #[test]
    fn sibling_chain_is_consistent() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();

        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        let c = doc.create_element("c").unwrap();
        for node in [&a, &b, &c] {
            crate::mutation::append_child(&root, node).unwrap();
        }

        assert!(root.first_child().unwrap().is_same_node(&a));
        assert!(root.last_child().unwrap().is_same_node(&c));
        assert!(a.next_sibling().unwrap().is_same_node(&b));
        assert!(c.previous_sibling().unwrap().is_same_node(&b));
        assert!(b.parent_node().unwrap().is_same_node(&root));
        assert_eq!(root.child_count(), 3);
    }

    #[test]
    fn document_position_flags() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        crate::mutation::append_child(&root, &a).unwrap();
        crate::mutation::append_child(&root, &b).unwrap();

        assert_eq!(
            a.compare_document_position(&b),
            document_position::FOLLOWING
        );
        assert_eq!(
            b.compare_document_position(&a),
            document_position::PRECEDING
        );
        assert_eq!(
            root.compare_document_position(&a),
            document_position::CONTAINED_BY | document_position::FOLLOWING
        );
        assert_eq!(
            a.compare_document_position(&root),
            document_position::CONTAINS | document_position::PRECEDING
        );
    }

    #[test]
    fn deep_clone_is_structurally_equal() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        root.set_attribute("id", "k").unwrap();
        let child = doc.create_element("c").unwrap();
        crate::mutation::append_child(&child, &doc.create_text_node("hi"))
            .unwrap();
        crate::mutation::append_child(&root, &child).unwrap();

        let copy = root.clone_node(true).unwrap();
        assert!(!copy.is_same_node(&root));
        assert!(copy.is_equal_node(&root));
        assert_eq!(copy.text_content().as_deref(), Some("hi"));
    }
}
