//! The document node: factory for every other node kind, owner of the
//! document-wide indices (id map, mutation version, entity table) and entry
//! point for XPath evaluation over the live tree.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::attr::{AttrData, ElementData};
use crate::error::{DomException, Result, XPathError};
use crate::live::NodeList;
use crate::name::{self, QualName};
use crate::node::{new_node, DoctypeData, NodeData, NodeRef, WeakNodeRef};
use crate::range::Range;
use crate::traversal::{NodeFilter, NodeIterator, TreeWalker};
use crate::xpath::expressions::Expression;
use crate::xpath::result::XPathResult;
use crate::xpath::{EvalOptions, Value};

/// Document-wide state, carried in the document node's variant.
pub struct DocumentData {
    /// id-attribute value → element, last writer wins.
    pub(crate) id_map: RefCell<HashMap<String, WeakNodeRef>>,
    /// Bumped by every mutation anywhere in the document; live views and
    /// XPath iterators key off it.
    pub(crate) version: Cell<u64>,
    pub(crate) character_set: RefCell<String>,
    pub(crate) content_type: RefCell<String>,
    pub(crate) document_uri: RefCell<String>,
    /// Whether the source carried an `<?xml …?>` declaration.
    pub(crate) has_xml_decl: Cell<bool>,
    /// Internal-subset entity declarations, `name → replacement text`.
    pub(crate) entities: RefCell<HashMap<String, String>>,
    /// Compiled XPath ASTs keyed by expression text.
    pub(crate) xpath_cache: RefCell<HashMap<String, Rc<dyn Expression>>>,
}

impl DocumentData {
    fn new() -> Self {
        Self {
            id_map: RefCell::new(HashMap::new()),
            version: Cell::new(0),
            character_set: RefCell::new("UTF-8".into()),
            content_type: RefCell::new("application/xml".into()),
            document_uri: RefCell::new(String::new()),
            has_xml_decl: Cell::new(false),
            entities: RefCell::new(HashMap::new()),
            xpath_cache: RefCell::new(HashMap::new()),
        }
    }
}

/// A handle to a document node. Cloning shares the underlying document.
#[derive(Clone)]
pub struct Document {
    root: NodeRef,
}

impl Document {
    /// An empty document: `characterSet` `"UTF-8"`, `contentType`
    /// `"application/xml"`, empty URI.
    pub fn new() -> Self {
        Self {
            root: new_node(NodeData::Document(DocumentData::new())),
        }
    }

    pub(crate) fn from_node(root: NodeRef) -> Self {
        debug_assert!(root.is_document());
        Self { root }
    }

    /// The document node itself (node type 9).
    pub fn as_node(&self) -> NodeRef {
        self.root.clone()
    }

    pub(crate) fn data(&self) -> &DocumentData {
        match self.root.data_ref() {
            NodeData::Document(data) => data,
            _ => unreachable!("document handle wraps a document node"),
        }
    }

    pub fn is_same_document(&self, other: &Document) -> bool {
        self.root.is_same_node(&other.root)
    }

    pub fn document_element(&self) -> Option<NodeRef> {
        self.root
            .children_snapshot()
            .into_iter()
            .find(NodeRef::is_element)
    }

    pub fn doctype(&self) -> Option<NodeRef> {
        self.root
            .children_snapshot()
            .into_iter()
            .find(|child| matches!(child.data_ref(), NodeData::DocumentType(_)))
    }

    pub fn character_set(&self) -> String {
        self.data().character_set.borrow().clone()
    }

    pub fn content_type(&self) -> String {
        self.data().content_type.borrow().clone()
    }

    pub fn url(&self) -> String {
        self.document_uri()
    }

    pub fn document_uri(&self) -> String {
        self.data().document_uri.borrow().clone()
    }

    pub fn set_document_uri(&self, uri: &str) {
        *self.data().document_uri.borrow_mut() = uri.to_owned();
    }

    pub(crate) fn version(&self) -> u64 {
        self.data().version.get()
    }

    pub(crate) fn set_character_set(&self, label: &str) {
        *self.data().character_set.borrow_mut() = label.to_owned();
    }

    pub(crate) fn set_has_xml_decl(&self, value: bool) {
        self.data().has_xml_decl.set(value);
    }

    pub(crate) fn has_xml_decl(&self) -> bool {
        self.data().has_xml_decl.get()
    }

    // ------------------------------------------------------------------
    // Factories

    fn adopt_new(&self, node: NodeRef) -> NodeRef {
        node.set_owner(Some(&self.root));
        node
    }

    /// Creates an element from a qualified name with no namespace.
    pub fn create_element(&self, qname: &str) -> Result<NodeRef> {
        name::validate_name(qname)?;
        Ok(self.adopt_new(new_node(NodeData::Element(ElementData::new(
            QualName::plain(qname),
        )))))
    }

    pub fn create_element_ns(&self, ns: Option<&str>, qname: &str) -> Result<NodeRef> {
        let (prefix, local) = name::validate_qualified_name(ns, qname)?;
        let name = QualName::new(
            ns.filter(|ns| !ns.is_empty()).map(str::to_owned),
            prefix.map(str::to_owned),
            local.to_owned(),
        );
        Ok(self.adopt_new(new_node(NodeData::Element(ElementData::new(name)))))
    }

    pub fn create_attribute(&self, qname: &str) -> Result<NodeRef> {
        name::validate_name(qname)?;
        Ok(self.adopt_new(new_node(NodeData::Attribute(AttrData::new(
            QualName::plain(qname),
            String::new(),
        )))))
    }

    pub fn create_attribute_ns(&self, ns: Option<&str>, qname: &str) -> Result<NodeRef> {
        let (prefix, local) = name::validate_qualified_name(ns, qname)?;
        let name = QualName::new(
            ns.filter(|ns| !ns.is_empty()).map(str::to_owned),
            prefix.map(str::to_owned),
            local.to_owned(),
        );
        Ok(self.adopt_new(new_node(NodeData::Attribute(AttrData::new(
            name,
            String::new(),
        )))))
    }

    pub fn create_text_node(&self, data: &str) -> NodeRef {
        self.adopt_new(new_node(NodeData::Text(RefCell::new(data.to_owned()))))
    }

    pub fn create_cdata_section(&self, data: &str) -> Result<NodeRef> {
        if data.contains("]]>") {
            return Err(DomException::InvalidCharacter(
                "CDATA content may not contain ']]>'".into(),
            ));
        }
        Ok(self.adopt_new(new_node(NodeData::CDataSection(RefCell::new(
            data.to_owned(),
        )))))
    }

    pub fn create_comment(&self, data: &str) -> NodeRef {
        self.adopt_new(new_node(NodeData::Comment(RefCell::new(data.to_owned()))))
    }

    pub fn create_processing_instruction(&self, target: &str, data: &str) -> Result<NodeRef> {
        name::validate_pi_target(target)?;
        if data.contains("?>") {
            return Err(DomException::InvalidCharacter(
                "processing instruction data may not contain '?>'".into(),
            ));
        }
        Ok(self.adopt_new(new_node(NodeData::ProcessingInstruction {
            target: target.to_owned(),
            data: RefCell::new(data.to_owned()),
        })))
    }

    pub fn create_document_fragment(&self) -> NodeRef {
        self.adopt_new(new_node(NodeData::DocumentFragment))
    }

    /// An entity reference; when the entity is declared in the document's
    /// table the reference carries its replacement text as a text child.
    pub fn create_entity_reference(&self, entity_name: &str) -> Result<NodeRef> {
        name::validate_name(entity_name)?;
        let node = self.adopt_new(new_node(NodeData::EntityReference(entity_name.to_owned())));
        if let Some(value) = self.lookup_entity(entity_name) {
            let text = self.create_text_node(&value);
            text.set_parent(Some(&node));
            node.0.children.borrow_mut().push(text);
        }
        Ok(node)
    }

    /// An entity node recording an internal-subset declaration; these hang
    /// off the doctype, not the tree.
    pub(crate) fn create_entity_node(&self, entity_name: &str, value: &str) -> NodeRef {
        self.adopt_new(new_node(NodeData::Entity {
            name: entity_name.to_owned(),
            value: value.to_owned(),
        }))
    }

    pub(crate) fn create_document_type(
        &self,
        doctype_name: &str,
        public_id: &str,
        system_id: &str,
    ) -> Result<NodeRef> {
        name::validate_name(doctype_name)?;
        Ok(self.adopt_new(new_node(NodeData::DocumentType(DoctypeData {
            name: doctype_name.to_owned(),
            public_id: public_id.to_owned(),
            system_id: system_id.to_owned(),
            entities: RefCell::new(Vec::new()),
            notations: RefCell::new(Vec::new()),
        }))))
    }

    // ------------------------------------------------------------------
    // Tree operations on the document node

    pub fn append_child(&self, child: &NodeRef) -> Result<NodeRef> {
        crate::mutation::append_child(&self.root, child)
    }

    pub fn insert_before(&self, child: &NodeRef, reference: Option<&NodeRef>) -> Result<NodeRef> {
        crate::mutation::insert_before(&self.root, child, reference)
    }

    pub fn remove_child(&self, child: &NodeRef) -> Result<NodeRef> {
        crate::mutation::remove_child(&self.root, child)
    }

    /// Normalizes the whole tree: merges adjacent text nodes, drops empty
    /// ones. Idempotent.
    pub fn normalize(&self) {
        self.root.normalize();
    }

    // ------------------------------------------------------------------
    // Id index

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeRef> {
        let map = self.data().id_map.borrow();
        map.get(id).and_then(WeakNodeRef::upgrade)
    }

    pub(crate) fn register_id(&self, id: &str, element: &NodeRef) {
        if id.is_empty() {
            return;
        }
        self.data()
            .id_map
            .borrow_mut()
            .insert(id.to_owned(), element.downgrade());
    }

    /// Removes the entry only while it still points at `element`; a later
    /// duplicate keeps its claim.
    pub(crate) fn unregister_id(&self, id: &str, element: &NodeRef) {
        let mut map = self.data().id_map.borrow_mut();
        let owned = map
            .get(id)
            .and_then(WeakNodeRef::upgrade)
            .is_some_and(|current| current.is_same_node(element));
        if owned {
            map.remove(id);
        }
    }

    // ------------------------------------------------------------------
    // Entity table

    pub(crate) fn declare_entity(&self, entity_name: &str, value: &str) {
        self.data()
            .entities
            .borrow_mut()
            .insert(entity_name.to_owned(), value.to_owned());
    }

    pub(crate) fn lookup_entity(&self, entity_name: &str) -> Option<String> {
        self.data().entities.borrow().get(entity_name).cloned()
    }

    // ------------------------------------------------------------------
    // Live lookups

    /// Live, descendant-only, document-order list of elements whose
    /// qualified name matches (`"*"` matches all).
    pub fn get_elements_by_tag_name(&self, qname: &str) -> NodeList {
        NodeList::by_tag_name(&self.root, qname)
    }

    /// Namespace-aware variant; `"*"` wildcards either half.
    pub fn get_elements_by_tag_name_ns(&self, ns: &str, local: &str) -> NodeList {
        NodeList::by_tag_name_ns(&self.root, ns, local)
    }

    // ------------------------------------------------------------------
    // Cross-document transfer and renaming

    /// Detaches `node` and moves it (and its subtree) into this document,
    /// re-homing id-index entries on both sides.
    pub fn adopt_node(&self, node: &NodeRef) -> Result<NodeRef> {
        if node.is_document() || matches!(node.data_ref(), NodeData::DocumentType(_)) {
            return Err(DomException::NotSupported(
                "documents and doctypes cannot be adopted".into(),
            ));
        }

        let previous = node.owner_document();
        if let Some(previous) = &previous {
            if previous.is_same_document(self) {
                node.detach();
                return Ok(node.clone());
            }
            node.unregister_subtree_ids(previous);
            previous.bump_doc_version();
        }

        node.detach();
        if node.is_attribute() {
            if let Some(owner) = node.parent_or_owner() {
                owner.remove_attribute_node(node)?;
            }
        }
        node.set_owner_recursive(&self.root);
        node.register_subtree_ids(self);
        self.bump_doc_version();
        Ok(node.clone())
    }

    /// Returns a copy of `node` owned by this document; `deep` copies the
    /// subtree. Attributes of copied elements always come along.
    pub fn import_node(&self, node: &NodeRef, deep: bool) -> Result<NodeRef> {
        if node.is_document() {
            return Err(DomException::NotSupported(
                "documents cannot be imported".into(),
            ));
        }
        node.clone_into(&self.root, deep)
    }

    /// Renames an element or attribute in place, re-validating the new
    /// name and refreshing the id index.
    pub fn rename_node(&self, node: &NodeRef, ns: Option<&str>, qname: &str) -> Result<NodeRef> {
        let owned_here = node
            .owner_document()
            .is_some_and(|doc| doc.is_same_document(self));
        if !owned_here {
            return Err(DomException::WrongDocument(
                "node belongs to a different document".into(),
            ));
        }

        let (prefix, local) = name::validate_qualified_name(ns, qname)?;
        let new_name = QualName::new(
            ns.filter(|ns| !ns.is_empty()).map(str::to_owned),
            prefix.map(str::to_owned),
            local.to_owned(),
        );

        match node.data_ref() {
            NodeData::Element(el) => {
                *el.name.borrow_mut() = new_name;
            }
            NodeData::Attribute(attr) => {
                if let Some(element) = attr.owner_element() {
                    // Leaving or entering id-hood moves the index entry.
                    element.remove_attribute_node(node)?;
                    *attr.name.borrow_mut() = new_name;
                    element.set_attribute_node_ns(node)?;
                    return Ok(node.clone());
                }
                *attr.name.borrow_mut() = new_name;
            }
            _ => {
                return Err(DomException::NotSupported(
                    "only elements and attributes can be renamed".into(),
                ))
            }
        }
        self.bump_doc_version();
        Ok(node.clone())
    }

    pub(crate) fn bump_doc_version(&self) {
        let data = self.data();
        data.version.set(data.version.get() + 1);
    }

    // ------------------------------------------------------------------
    // Traversal factories

    pub fn create_node_iterator(&self, root: &NodeRef, filter: NodeFilter) -> NodeIterator {
        NodeIterator::new(root.clone(), filter)
    }

    pub fn create_tree_walker(&self, root: &NodeRef, filter: NodeFilter) -> TreeWalker {
        TreeWalker::new(root.clone(), filter)
    }

    pub fn create_range(&self) -> Range {
        Range::new(self.root.clone())
    }

    // ------------------------------------------------------------------
    // XPath

    /// Compiles (or re-uses) the AST for `expr`. Repeated evaluation of
    /// the same text never re-parses.
    pub(crate) fn compiled(&self, expr: &str) -> Result<Rc<dyn Expression>, XPathError> {
        if let Some(hit) = self.data().xpath_cache.borrow().get(expr) {
            return Ok(hit.clone());
        }
        let compiled = crate::xpath::compile(expr)?;
        self.data()
            .xpath_cache
            .borrow_mut()
            .insert(expr.to_owned(), compiled.clone());
        Ok(compiled)
    }

    /// Evaluates `expr` with the document itself as context node.
    pub fn evaluate(&self, expr: &str) -> Result<Value, XPathError> {
        self.evaluate_from(expr, &self.root.clone())
    }

    /// Evaluates `expr` from the given context node.
    pub fn evaluate_from(&self, expr: &str, context: &NodeRef) -> Result<Value, XPathError> {
        let options = EvalOptions::default();
        crate::xpath::evaluate_compiled(&self.compiled(expr)?, self, context, &options)
    }

    /// Full-control evaluation: variables, namespace resolver, and one of
    /// the ten result shapes.
    pub fn evaluate_with(
        &self,
        expr: &str,
        context: &NodeRef,
        options: &EvalOptions,
        result_kind: u16,
    ) -> Result<XPathResult, XPathError> {
        let value = crate::xpath::evaluate_compiled(&self.compiled(expr)?, self, context, options)?;
        XPathResult::from_value(value, result_kind, self)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version())
            .field("character_set", &self.character_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_index_tracks_renames_and_removal() {
        let doc = Document::new();
        let el = doc.create_element("e").unwrap();
        doc.append_child(&el).unwrap();

        el.set_attribute("id", "k1").unwrap();
        assert!(doc.get_element_by_id("k1").unwrap().is_same_node(&el));

        el.set_attribute("id", "k2").unwrap();
        assert!(doc.get_element_by_id("k1").is_none());
        assert!(doc.get_element_by_id("k2").unwrap().is_same_node(&el));

        el.remove_attribute("id").unwrap();
        assert!(doc.get_element_by_id("k1").is_none());
        assert!(doc.get_element_by_id("k2").is_none());
    }

    #[test]
    fn duplicate_ids_are_last_writer_wins() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        let first = doc.create_element("a").unwrap();
        let second = doc.create_element("b").unwrap();
        root.append_child(&first).unwrap();
        root.append_child(&second).unwrap();

        first.set_attribute("id", "dup").unwrap();
        second.set_attribute("id", "dup").unwrap();
        assert!(doc.get_element_by_id("dup").unwrap().is_same_node(&second));

        // The loser's removal must not evict the winner.
        first.remove_attribute("id").unwrap();
        assert!(doc.get_element_by_id("dup").unwrap().is_same_node(&second));
    }

    #[test]
    fn cross_document_guard_and_adopt() {
        let doc1 = Document::new();
        let doc2 = Document::new();
        let root2 = doc2.create_element("r").unwrap();
        doc2.append_child(&root2).unwrap();

        let stray = doc1.create_element("x").unwrap();
        assert!(matches!(
            root2.append_child(&stray),
            Err(DomException::WrongDocument(_))
        ));

        doc2.adopt_node(&stray).unwrap();
        assert!(stray.owner_document().unwrap().is_same_document(&doc2));
        root2.append_child(&stray).unwrap();
    }

    #[test]
    fn import_node_copies_into_this_document() {
        let doc1 = Document::new();
        let doc2 = Document::new();
        let el = doc1.create_element("e").unwrap();
        el.set_attribute("a", "1").unwrap();

        let copy = doc2.import_node(&el, true).unwrap();
        assert!(!copy.is_same_node(&el));
        assert!(copy.owner_document().unwrap().is_same_document(&doc2));
        assert_eq!(copy.get_attribute("a").as_deref(), Some("1"));
        // The original is untouched.
        assert!(el.owner_document().unwrap().is_same_document(&doc1));
    }

    #[test]
    fn rename_node_revalidates() {
        let doc = Document::new();
        let el = doc.create_element("old").unwrap();
        doc.append_child(&el).unwrap();

        doc.rename_node(&el, Some("urn:x"), "p:new").unwrap();
        assert_eq!(el.node_name(), "p:new");
        assert_eq!(el.namespace_uri().as_deref(), Some("urn:x"));

        assert!(doc.rename_node(&el, None, "p:bad").is_err());
    }
}
