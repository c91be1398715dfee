//! Element and attribute payloads plus the `NamedNodeMap`: an
//! insertion-ordered attribute collection addressable by qualified name, by
//! `(namespace, local)` pair, and by index.

use std::cell::{Cell, RefCell};

use crate::error::{DomException, Result};
use crate::name::{self, QualName};
use crate::node::{NodeData, NodeRef, WeakNodeRef};

pub struct ElementData {
    pub(crate) name: RefCell<QualName>,
    /// Attribute nodes in insertion order. Attributes are not children;
    /// they never appear in a sibling chain.
    pub(crate) attrs: RefCell<Vec<NodeRef>>,
}

impl ElementData {
    pub(crate) fn new(name: QualName) -> Self {
        Self {
            name: RefCell::new(name),
            attrs: RefCell::new(Vec::new()),
        }
    }

    /// Appends an already-validated attribute node, wiring the back-edge.
    /// Fails if the attribute is attached elsewhere.
    pub(crate) fn attach_attr(&self, element: &NodeRef, attr: &NodeRef) -> Result<()> {
        let data = attr_data(attr);
        if data.owner_element().is_some() {
            return Err(DomException::InUseAttribute(format!(
                "attribute '{}' is attached to another element",
                data.name.borrow()
            )));
        }
        data.owner.set(Some(element.downgrade()));
        self.attrs.borrow_mut().push(attr.clone());
        Ok(())
    }
}

pub struct AttrData {
    pub(crate) name: RefCell<QualName>,
    pub(crate) value: RefCell<String>,
    pub(crate) owner: Cell<Option<WeakNodeRef>>,
}

impl AttrData {
    pub(crate) fn new(name: QualName, value: String) -> Self {
        Self {
            name: RefCell::new(name),
            value: RefCell::new(value),
            owner: Cell::new(None),
        }
    }

    pub(crate) fn owner_element(&self) -> Option<NodeRef> {
        let weak = self.owner.take();
        let cloned = weak.clone();
        self.owner.set(weak);
        cloned.and_then(|weak| weak.upgrade())
    }
}

fn attr_data(node: &NodeRef) -> &AttrData {
    match node.data_ref() {
        NodeData::Attribute(data) => data,
        _ => unreachable!("attribute list holds only attribute nodes"),
    }
}

fn element_data(node: &NodeRef) -> Option<&ElementData> {
    match node.data_ref() {
        NodeData::Element(data) => Some(data),
        _ => None,
    }
}

/// True for the attribute names the document id-index tracks: an unprefixed
/// `id`, or `xml:id` in either its prefixed or namespace-resolved form.
fn is_id_name(name: &QualName) -> bool {
    match (&name.prefix, name.local.as_str()) {
        (None, "id") => name.ns.is_none(),
        (Some(prefix), "id") => prefix == "xml",
        _ => name.ns.as_deref() == Some(name::XML_NAMESPACE) && name.local == "id",
    }
}

/// Updates an attached attribute's value and keeps the id index current.
pub(crate) fn set_attr_value(attr: &NodeRef, value: &str) {
    let data = attr_data(attr);
    let old = data.value.borrow().clone();
    *data.value.borrow_mut() = value.to_owned();

    if let Some(element) = data.owner_element() {
        if is_id_name(&data.name.borrow()) {
            if let Some(doc) = element.owner_document() {
                doc.unregister_id(&old, &element);
                doc.register_id(value, &element);
            }
        }
    }
    attr.bump_version();
}

impl NodeRef {
    /// The element's qualified tag name.
    pub fn tag_name(&self) -> Option<String> {
        element_data(self).map(|el| el.name.borrow().qualified())
    }

    /// The live attribute map, present on elements only.
    pub fn attributes(&self) -> Option<NamedNodeMap> {
        element_data(self).map(|_| NamedNodeMap {
            owner: self.downgrade(),
        })
    }

    pub fn get_attribute(&self, qname: &str) -> Option<String> {
        self.get_attribute_node(qname)
            .and_then(|attr| attr.node_value())
    }

    pub fn get_attribute_ns(&self, ns: Option<&str>, local: &str) -> Option<String> {
        self.get_attribute_node_ns(ns, local)
            .and_then(|attr| attr.node_value())
    }

    pub fn get_attribute_node(&self, qname: &str) -> Option<NodeRef> {
        let el = element_data(self)?;
        let found = el
            .attrs
            .borrow()
            .iter()
            .find(|attr| attr_data(attr).name.borrow().qualified() == qname)
            .cloned();
        found
    }

    pub fn get_attribute_node_ns(&self, ns: Option<&str>, local: &str) -> Option<NodeRef> {
        let ns = ns.filter(|ns| !ns.is_empty());
        let el = element_data(self)?;
        let found = el
            .attrs
            .borrow()
            .iter()
            .find(|attr| {
                let name = attr_data(attr).name.borrow();
                name.ns.as_deref() == ns && name.local == local
            })
            .cloned();
        found
    }

    pub fn has_attribute(&self, qname: &str) -> bool {
        self.get_attribute_node(qname).is_some()
    }

    pub fn has_attribute_ns(&self, ns: Option<&str>, local: &str) -> bool {
        self.get_attribute_node_ns(ns, local).is_some()
    }

    /// Sets (or overwrites) an attribute addressed by qualified name.
    pub fn set_attribute(&self, qname: &str, value: &str) -> Result<()> {
        let el = element_data(self)
            .ok_or_else(|| DomException::NotSupported("not an element".into()))?;
        name::validate_name(qname)?;

        if let Some(existing) = self.get_attribute_node(qname) {
            set_attr_value(&existing, value);
            return Ok(());
        }

        let doc = self
            .owner_document()
            .ok_or_else(|| DomException::NotFound("element has no owner document".into()))?;
        let attr = doc.create_attribute(qname)?;
        set_detached_attr_value(&attr, value);
        el.attach_attr(self, &attr)?;
        self.register_attr_id(&attr);
        self.bump_version();
        Ok(())
    }

    /// Namespace-aware variant; the qualified name is re-validated against
    /// the namespace, including the reserved pairings.
    pub fn set_attribute_ns(&self, ns: Option<&str>, qname: &str, value: &str) -> Result<()> {
        let el = element_data(self)
            .ok_or_else(|| DomException::NotSupported("not an element".into()))?;
        let (_, local) = name::validate_qualified_name(ns, qname)?;

        if let Some(existing) = self.get_attribute_node_ns(ns, local) {
            // Per DOM, the prefix follows the most recent set.
            let (prefix, local) = name::split_qname(qname);
            *attr_data(&existing).name.borrow_mut() = QualName::new(
                ns.filter(|ns| !ns.is_empty()).map(str::to_owned),
                prefix.map(str::to_owned),
                local.to_owned(),
            );
            set_attr_value(&existing, value);
            return Ok(());
        }

        let doc = self
            .owner_document()
            .ok_or_else(|| DomException::NotFound("element has no owner document".into()))?;
        let attr = doc.create_attribute_ns(ns, qname)?;
        set_detached_attr_value(&attr, value);
        el.attach_attr(self, &attr)?;
        self.register_attr_id(&attr);
        self.bump_version();
        Ok(())
    }

    pub fn remove_attribute(&self, qname: &str) -> Result<()> {
        match self.get_attribute_node(qname) {
            Some(attr) => self.remove_attribute_node(&attr).map(|_| ()),
            None => Ok(()),
        }
    }

    pub fn remove_attribute_ns(&self, ns: Option<&str>, local: &str) -> Result<()> {
        match self.get_attribute_node_ns(ns, local) {
            Some(attr) => self.remove_attribute_node(&attr).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Detaches the given attribute node; `NotFound` if it is not attached
    /// to this element.
    pub fn remove_attribute_node(&self, attr: &NodeRef) -> Result<NodeRef> {
        let el = element_data(self)
            .ok_or_else(|| DomException::NotSupported("not an element".into()))?;
        let mut attrs = el.attrs.borrow_mut();
        let index = attrs
            .iter()
            .position(|candidate| candidate.is_same_node(attr))
            .ok_or_else(|| {
                DomException::NotFound("attribute is not attached to this element".into())
            })?;
        attrs.remove(index);
        drop(attrs);

        let data = attr_data(attr);
        if is_id_name(&data.name.borrow()) {
            if let Some(doc) = self.owner_document() {
                doc.unregister_id(&data.value.borrow(), self);
            }
        }
        data.owner.set(None);
        self.bump_version();
        Ok(attr.clone())
    }

    /// Attaches an attribute node, replacing (and returning) any attribute
    /// with the same qualified name.
    pub fn set_attribute_node(&self, attr: &NodeRef) -> Result<Option<NodeRef>> {
        self.set_attribute_node_by(attr, |existing, incoming| {
            existing.qualified() == incoming.qualified()
        })
    }

    /// As [`set_attribute_node`](Self::set_attribute_node) but matching on
    /// the `(namespace, local)` pair.
    pub fn set_attribute_node_ns(&self, attr: &NodeRef) -> Result<Option<NodeRef>> {
        self.set_attribute_node_by(attr, |existing, incoming| {
            existing.ns == incoming.ns && existing.local == incoming.local
        })
    }

    fn set_attribute_node_by(
        &self,
        attr: &NodeRef,
        same_name: impl Fn(&QualName, &QualName) -> bool,
    ) -> Result<Option<NodeRef>> {
        let el = element_data(self)
            .ok_or_else(|| DomException::NotSupported("not an element".into()))?;
        if !attr.is_attribute() {
            return Err(DomException::NotSupported("not an attribute node".into()));
        }

        let data = attr_data(attr);
        if let Some(owner) = data.owner_element() {
            if owner.is_same_node(self) {
                return Ok(Some(attr.clone()));
            }
            return Err(DomException::InUseAttribute(format!(
                "attribute '{}' is attached to another element",
                data.name.borrow()
            )));
        }

        let same_doc = match (attr.owner_document(), self.owner_document()) {
            (Some(a), Some(b)) => a.is_same_document(&b),
            _ => false,
        };
        if !same_doc {
            return Err(DomException::WrongDocument(
                "attribute belongs to a different document".into(),
            ));
        }

        let incoming = data.name.borrow().clone();
        let replaced = {
            let attrs = el.attrs.borrow();
            attrs
                .iter()
                .find(|candidate| same_name(&attr_data(candidate).name.borrow(), &incoming))
                .cloned()
        };
        if let Some(old) = &replaced {
            self.remove_attribute_node(old)?;
        }

        el.attach_attr(self, attr)?;
        self.register_attr_id(attr);
        self.bump_version();
        Ok(replaced)
    }

    /// Adds or removes a boolean attribute. `force` pins the final state;
    /// the return value reports presence afterwards.
    pub fn toggle_attribute(&self, qname: &str, force: Option<bool>) -> Result<bool> {
        let present = self.has_attribute(qname);
        match (present, force) {
            (false, Some(false)) => Ok(false),
            (false, _) => {
                self.set_attribute(qname, "")?;
                Ok(true)
            }
            (true, Some(true)) => Ok(true),
            (true, _) => {
                self.remove_attribute(qname)?;
                Ok(false)
            }
        }
    }

    /// The element's `id` attribute value, empty when absent.
    pub fn id(&self) -> String {
        self.get_attribute("id")
            .or_else(|| self.get_attribute("xml:id"))
            .unwrap_or_default()
    }

    fn register_attr_id(&self, attr: &NodeRef) {
        let data = attr_data(attr);
        if is_id_name(&data.name.borrow()) {
            if let Some(doc) = self.owner_document() {
                doc.register_id(&data.value.borrow(), self);
            }
        }
    }

    /// Re-registers every id-bearing attribute of this subtree with `doc`;
    /// used by adoption.
    pub(crate) fn register_subtree_ids(&self, doc: &crate::document::Document) {
        if let NodeData::Element(el) = self.data_ref() {
            for attr in el.attrs.borrow().iter() {
                let data = attr_data(attr);
                if is_id_name(&data.name.borrow()) {
                    doc.register_id(&data.value.borrow(), self);
                }
            }
        }
        for child in self.children_snapshot() {
            child.register_subtree_ids(doc);
        }
    }

    /// Drops this subtree's id entries from `doc` where they still point at
    /// these elements.
    pub(crate) fn unregister_subtree_ids(&self, doc: &crate::document::Document) {
        if let NodeData::Element(el) = self.data_ref() {
            for attr in el.attrs.borrow().iter() {
                let data = attr_data(attr);
                if is_id_name(&data.name.borrow()) {
                    doc.unregister_id(&data.value.borrow(), self);
                }
            }
        }
        for child in self.children_snapshot() {
            child.unregister_subtree_ids(doc);
        }
    }
}

/// Sets the value of a not-yet-attached attribute (no index bookkeeping).
fn set_detached_attr_value(attr: &NodeRef, value: &str) {
    *attr_data(attr).value.borrow_mut() = value.to_owned();
}

/// Live, insertion-ordered view of an element's attributes.
pub struct NamedNodeMap {
    owner: WeakNodeRef,
}

impl NamedNodeMap {
    pub fn length(&self) -> usize {
        self.owner
            .upgrade()
            .and_then(|el| element_data(&el).map(|data| data.attrs.borrow().len()))
            .unwrap_or(0)
    }

    pub fn item(&self, index: usize) -> Option<NodeRef> {
        let el = self.owner.upgrade()?;
        let data = element_data(&el)?;
        let found = data.attrs.borrow().get(index).cloned();
        found
    }

    pub fn get_named_item(&self, qname: &str) -> Option<NodeRef> {
        self.owner.upgrade()?.get_attribute_node(qname)
    }

    pub fn get_named_item_ns(&self, ns: Option<&str>, local: &str) -> Option<NodeRef> {
        self.owner.upgrade()?.get_attribute_node_ns(ns, local)
    }

    pub fn set_named_item(&self, attr: &NodeRef) -> Result<Option<NodeRef>> {
        let el = self
            .owner
            .upgrade()
            .ok_or_else(|| DomException::NotFound("owning element is gone".into()))?;
        el.set_attribute_node(attr)
    }

    pub fn remove_named_item(&self, qname: &str) -> Result<NodeRef> {
        let el = self
            .owner
            .upgrade()
            .ok_or_else(|| DomException::NotFound("owning element is gone".into()))?;
        let attr = el
            .get_attribute_node(qname)
            .ok_or_else(|| DomException::NotFound(format!("no attribute named '{qname}'")))?;
        el.remove_attribute_node(&attr)
    }

    pub fn iter(&self) -> Vec<NodeRef> {
        self.owner
            .upgrade()
            .and_then(|el| element_data(&el).map(|data| data.attrs.borrow().clone()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::document::Document;
    use crate::error::DomException;

    #[test]
    fn named_node_map_order_and_lookup() {
        let doc = Document::new();
        let el = doc.create_element("e").unwrap();
        el.set_attribute("b", "2").unwrap();
        el.set_attribute("a", "1").unwrap();
        el.set_attribute("b", "3").unwrap();

        let map = el.attributes().unwrap();
        assert_eq!(map.length(), 2);
        // Overwrite keeps insertion order.
        assert_eq!(map.item(0).unwrap().node_name(), "b");
        assert_eq!(map.item(1).unwrap().node_name(), "a");
        assert_eq!(el.get_attribute("b").as_deref(), Some("3"));
        assert!(map.item(2).is_none());
    }

    #[test]
    fn in_use_attribute_is_rejected() {
        let doc = Document::new();
        let first = doc.create_element("a").unwrap();
        let second = doc.create_element("b").unwrap();
        let attr = doc.create_attribute("k").unwrap();

        first.set_attribute_node(&attr).unwrap();
        let err = second.set_attribute_node(&attr).unwrap_err();
        assert!(matches!(err, DomException::InUseAttribute(_)));

        first.remove_attribute_node(&attr).unwrap();
        second.set_attribute_node(&attr).unwrap();
    }

    #[test]
    fn toggle_attribute_is_idempotent_under_force() {
        let doc = Document::new();
        let el = doc.create_element("e").unwrap();
        assert!(el.toggle_attribute("on", Some(true)).unwrap());
        assert!(el.toggle_attribute("on", Some(true)).unwrap());
        assert!(el.has_attribute("on"));
        assert!(!el.toggle_attribute("on", None).unwrap());
        assert!(!el.has_attribute("on"));
    }
}
