//! End-to-end DOM behavior: live collections, mutation guards, the id
//! index, cross-document transfer and the structural round-trip laws.

use xmldom::{parse_str, DomException, Document};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn live_node_list_tracks_mutations() {
    init_tracing();
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

    // item(length) is the null-equivalent, never an error.
    assert!(list.item(list.length()).is_none());
}

#[test]
fn tag_name_views_are_live_too() {
    let doc = parse_str("<r><x/><y/></r>").unwrap();
    let root = doc.document_element().unwrap();
    let xs = doc.get_elements_by_tag_name("x");
    assert_eq!(xs.length(), 1);

    root.append_child(&doc.create_element("x").unwrap()).unwrap();
    assert_eq!(xs.length(), 2);

    for node in xs.iter() {
        node.remove();
    }
    assert_eq!(xs.length(), 0);
}

#[test]
fn hierarchy_guard_leaves_tree_unchanged() {
    let doc = parse_str("<r><a><b/></a></r>").unwrap();
    let root = doc.document_element().unwrap();
    let a = root.first_element_child().unwrap();
    let b = a.first_element_child().unwrap();

    let before = doc.to_xml();
    let err = b.append_child(&root).unwrap_err();
    assert!(matches!(err, DomException::HierarchyRequest(_)));
    assert_eq!(doc.to_xml(), before);
}

#[test]
fn id_index_follows_attribute_lifecycle() {
    let doc = Document::new();
    let e = doc.create_element("e").unwrap();
    doc.append_child(&e).unwrap();

    e.set_attribute("id", "k1").unwrap();
    assert!(doc.get_element_by_id("k1").unwrap().is_same_node(&e));

    e.set_attribute("id", "k2").unwrap();
    assert!(doc.get_element_by_id("k1").is_none());
    assert!(doc.get_element_by_id("k2").unwrap().is_same_node(&e));

    e.remove_attribute("id").unwrap();
    assert!(doc.get_element_by_id("k1").is_none());
    assert!(doc.get_element_by_id("k2").is_none());
}

#[test]
fn cross_document_insertion_requires_adoption() {
    let doc1 = Document::new();
    let doc2 = Document::new();
    let root2 = doc2.create_element("root").unwrap();
    doc2.append_child(&root2).unwrap();

    let e = doc1.create_element("e").unwrap();
    e.set_attribute("id", "moved").unwrap();
    assert!(matches!(
        root2.append_child(&e),
        Err(DomException::WrongDocument(_))
    ));

    doc2.adopt_node(&e).unwrap();
    assert!(e.owner_document().unwrap().is_same_document(&doc2));
    root2.append_child(&e).unwrap();

    // The id entry moved with the node.
    assert!(doc1.get_element_by_id("moved").is_none());
    assert!(doc2.get_element_by_id("moved").unwrap().is_same_node(&e));
}

#[test]
fn split_then_normalize_restores_text() {
    let doc = parse_str("<r>hello world</r>").unwrap();
    let root = doc.document_element().unwrap();
    let text = root.first_child().unwrap();

    text.split_text(5).unwrap();
    assert_eq!(root.child_count(), 2);

    root.normalize();
    assert_eq!(root.child_count(), 1);
    assert_eq!(
        root.first_child().unwrap().data().as_deref(),
        Some("hello world")
    );

    // Idempotent.
    root.normalize();
    assert_eq!(root.child_count(), 1);
}

#[test]
fn deep_clone_equals_source_structurally() {
    let doc = parse_str(r#"<r a="1" b="2"><c>text<d/></c><!--note--></r>"#).unwrap();
    let root = doc.document_element().unwrap();

    let copy = root.clone_node(true).unwrap();
    assert!(!copy.is_same_node(&root));
    assert!(copy.is_equal_node(&root));
    assert!(root.is_equal_node(&copy));

    // Attribute order does not matter for equality.
    let other = parse_str(r#"<r b="2" a="1"><c>text<d/></c><!--note--></r>"#).unwrap();
    assert!(root.is_equal_node(&other.document_element().unwrap()));

    // A data difference does.
    let different = parse_str(r#"<r a="1" b="2"><c>other<d/></c><!--note--></r>"#).unwrap();
    assert!(!root.is_equal_node(&different.document_element().unwrap()));
}

#[test]
fn import_node_is_a_copy_adopt_is_a_move() {
    let source = parse_str("<r><keep><deep/></keep></r>").unwrap();
    let target = Document::new();
    let keep = source
        .document_element()
        .unwrap()
        .first_element_child()
        .unwrap();

    let shallow = target.import_node(&keep, false).unwrap();
    assert_eq!(shallow.child_count(), 0);
    let deep = target.import_node(&keep, true).unwrap();
    assert_eq!(deep.child_count(), 1);
    // Source untouched.
    assert_eq!(keep.child_count(), 1);

    target.adopt_node(&keep).unwrap();
    assert!(source.document_element().unwrap().first_element_child().is_none());
}

#[test]
fn convenience_mutations_accept_nodes_and_strings() {
    let doc = parse_str("<r><mid/></r>").unwrap();
    let root = doc.document_element().unwrap();
    let mid = root.first_element_child().unwrap();

    mid.before(&["start ".into()]).unwrap();
    mid.after(&[" end".into()]).unwrap();
    root.prepend(&["[".into()]).unwrap();
    root.append(&["]".into()]).unwrap();
    assert_eq!(doc.to_xml(), "<r>[start <mid/> end]</r>");

    let sub = doc.create_element("sub").unwrap();
    mid.replace_with(&[(&sub).into()]).unwrap();
    assert_eq!(doc.to_xml(), "<r>[start <sub/> end]</r>");
}

#[test]
fn renaming_keeps_the_id_index_consistent() {
    let doc = Document::new();
    let e = doc.create_element("e").unwrap();
    doc.append_child(&e).unwrap();
    e.set_attribute("id", "x").unwrap();
    let attr = e.get_attribute_node("id").unwrap();

    // Renaming the id attribute away unregisters it.
    doc.rename_node(&attr, None, "data").unwrap();
    assert!(doc.get_element_by_id("x").is_none());
    assert_eq!(e.get_attribute("data").as_deref(), Some("x"));

    doc.rename_node(&attr, None, "id").unwrap();
    assert!(doc.get_element_by_id("x").unwrap().is_same_node(&e));
}

#[test]
fn document_defaults() {
    let doc = Document::new();
    assert_eq!(doc.character_set(), "UTF-8");
    assert_eq!(doc.content_type(), "application/xml");
    assert_eq!(doc.url(), "");
    assert_eq!(doc.document_uri(), "");
}

#[test]
fn text_content_round_trip() {
    let doc = parse_str("<r><a>one</a><!--skip--><b>two<c> three</c></b></r>").unwrap();
    let root = doc.document_element().unwrap();
    assert_eq!(root.text_content().as_deref(), Some("onetwo three"));

    root.set_text_content("flat").unwrap();
    assert_eq!(root.child_count(), 1);
    assert_eq!(doc.to_xml(), "<r>flat</r>");
}
