//! Live collections. A list materializes lazily and remembers the document
//! version it was computed against; any later mutation forces the next
//! access to re-materialize, so `length`/`item` always reflect the tree as
//! it is now.

use std::cell::RefCell;

use crate::node::{descendants, NodeData, NodeRef, WeakNodeRef};

enum ListFilter {
    ChildNodes,
    ChildElements,
    TagName(String),
    TagNameNs { ns: String, local: String },
}

/// A live node list rooted at one node.
pub struct NodeList {
    root: WeakNodeRef,
    filter: ListFilter,
    cache: RefCell<Option<(u64, Vec<NodeRef>)>>,
}

impl NodeList {
    pub(crate) fn child_nodes(root: &NodeRef) -> Self {
        Self::with_filter(root, ListFilter::ChildNodes)
    }

    pub(crate) fn child_elements(root: &NodeRef) -> Self {
        Self::with_filter(root, ListFilter::ChildElements)
    }

    pub(crate) fn by_tag_name(root: &NodeRef, qname: &str) -> Self {
        Self::with_filter(root, ListFilter::TagName(qname.to_owned()))
    }

    pub(crate) fn by_tag_name_ns(root: &NodeRef, ns: &str, local: &str) -> Self {
        Self::with_filter(
            root,
            ListFilter::TagNameNs {
                ns: ns.to_owned(),
                local: local.to_owned(),
            },
        )
    }

    fn with_filter(root: &NodeRef, filter: ListFilter) -> Self {
        Self {
            root: root.downgrade(),
            filter,
            cache: RefCell::new(None),
        }
    }

    fn materialize(&self) -> Vec<NodeRef> {
        let Some(root) = self.root.upgrade() else {
            return Vec::new();
        };
        let version = root
            .owner_document_node()
            .and_then(|doc| match doc.data_ref() {
                NodeData::Document(data) => Some(data.version.get()),
                _ => None,
            })
            .unwrap_or(0);

        if let Some((cached_version, nodes)) = &*self.cache.borrow() {
            if *cached_version == version {
                return nodes.clone();
            }
        }

        let nodes: Vec<NodeRef> = match &self.filter {
            ListFilter::ChildNodes => root.children_snapshot(),
            ListFilter::ChildElements => root
                .children_snapshot()
                .into_iter()
                .filter(NodeRef::is_element)
                .collect(),
            ListFilter::TagName(qname) => descendants(&root)
                .into_iter()
                .filter(|node| node.is_element())
                .filter(|node| {
                    qname == "*" || node.tag_name().as_deref() == Some(qname.as_str())
                })
                .collect(),
            ListFilter::TagNameNs { ns, local } => descendants(&root)
                .into_iter()
                .filter(|node| node.is_element())
                .filter(|node| {
                    let name = match node.qual_name() {
                        Some(name) => name,
                        None => return false,
                    };
                    let ns_matches = ns == "*"
                        || match &name.ns {
                            Some(uri) => uri == ns,
                            None => ns.is_empty(),
                        };
                    let local_matches = local == "*" || name.local == *local;
                    ns_matches && local_matches
                })
                .collect(),
        };

        *self.cache.borrow_mut() = Some((version, nodes.clone()));
        nodes
    }

    pub fn length(&self) -> usize {
        self.materialize().len()
    }

    /// `item(i)`; out-of-range indices return `None`, never an error.
    pub fn item(&self, index: usize) -> Option<NodeRef> {
        self.materialize().into_iter().nth(index)
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Snapshot of the current contents, in document order.
    pub fn iter(&self) -> std::vec::IntoIter<NodeRef> {
        self.materialize().into_iter()
    }
}

impl NodeRef {
    /// Live list of element children.
    pub fn children(&self) -> NodeList {
        NodeList::child_elements(self)
    }

    pub fn child_element_count(&self) -> usize {
        self.children_snapshot()
            .iter()
            .filter(|child| child.is_element())
            .count()
    }

    pub fn first_element_child(&self) -> Option<NodeRef> {
        self.children_snapshot().into_iter().find(NodeRef::is_element)
    }

    pub fn last_element_child(&self) -> Option<NodeRef> {
        self.children_snapshot()
            .into_iter()
            .rev()
            .find(NodeRef::is_element)
    }

    pub fn previous_element_sibling(&self) -> Option<NodeRef> {
        let mut current = self.previous_sibling();
        while let Some(node) = current {
            if node.is_element() {
                return Some(node);
            }
            current = node.previous_sibling();
        }
        None
    }

    pub fn next_element_sibling(&self) -> Option<NodeRef> {
        let mut current = self.next_sibling();
        while let Some(node) = current {
            if node.is_element() {
                return Some(node);
            }
            current = node.next_sibling();
        }
        None
    }

    /// Live descendant lookup by qualified tag name (`"*"` matches all).
    pub fn get_elements_by_tag_name(&self, qname: &str) -> NodeList {
        NodeList::by_tag_name(self, qname)
    }

    pub fn get_elements_by_tag_name_ns(&self, ns: &str, local: &str) -> NodeList {
        NodeList::by_tag_name_ns(self, ns, local)
    }
}

#[cfg(test)]
mod tests {
    use crate::document::Document;

    #[test]
    fn child_list_is_live() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        let list = root.child_nodes();
        assert_eq!(list.length(), 0);

        let a = doc.create_element("a").unwrap();
        root.append_child(&a).unwrap();
        assert_eq!(list.length(), 1);

        let b = doc.create_element("b").unwrap();
        root.append_child(&b).unwrap();
        assert_eq!(list.length(), 2);
        assert!(list.item(0).unwrap().is_same_node(&a));

        root.remove_child(&a).unwrap();
        assert_eq!(list.length(), 1);
        assert!(list.item(0).unwrap().is_same_node(&b));
        assert!(list.item(1).is_none());
    }

    #[test]
    fn tag_name_list_is_descendant_only_and_live() {
        let doc = Document::new();
        let root = doc.create_element("x").unwrap();
        doc.append_child(&root).unwrap();
        let list = root.get_elements_by_tag_name("x");
        // The root itself does not match; only descendants do.
        assert_eq!(list.length(), 0);

        let inner = doc.create_element("x").unwrap();
        root.append_child(&inner).unwrap();
        let deeper = doc.create_element("x").unwrap();
        inner.append_child(&deeper).unwrap();
        assert_eq!(list.length(), 2);
        assert!(list.item(0).unwrap().is_same_node(&inner));
        assert!(list.item(1).unwrap().is_same_node(&deeper));

        assert_eq!(root.get_elements_by_tag_name("*").length(), 2);
    }

    #[test]
    fn ns_wildcards() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        let a = doc.create_element_ns(Some("urn:one"), "p:a").unwrap();
        let b = doc.create_element_ns(Some("urn:two"), "q:a").unwrap();
        root.append_child(&a).unwrap();
        root.append_child(&b).unwrap();

        assert_eq!(root.get_elements_by_tag_name_ns("*", "a").length(), 2);
        assert_eq!(root.get_elements_by_tag_name_ns("urn:one", "*").length(), 1);
        assert_eq!(root.get_elements_by_tag_name_ns("urn:two", "a").length(), 1);
    }

    #[test]
    fn element_navigation() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        root.append(&["pad".into()]).unwrap();
        let a = doc.create_element("a").unwrap();
        root.append_child(&a).unwrap();
        root.append(&["pad".into()]).unwrap();
        let b = doc.create_element("b").unwrap();
        root.append_child(&b).unwrap();

        assert_eq!(root.child_element_count(), 2);
        assert!(root.first_element_child().unwrap().is_same_node(&a));
        assert!(root.last_element_child().unwrap().is_same_node(&b));
        assert!(a.next_element_sibling().unwrap().is_same_node(&b));
        assert!(b.previous_element_sibling().unwrap().is_same_node(&a));
    }
}
