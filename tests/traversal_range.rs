//! Traversal and Range behavior over parsed documents, including the
//! iterator/walker agreement invariant.

use xmldom::{
    boundary_mode, parse_str, what_to_show, DomException, FilterResult, NodeFilter, NodeRef,
};

fn element_names<I: IntoIterator<Item = NodeRef>>(nodes: I) -> Vec<String> {
    nodes.into_iter().map(|node| node.node_name()).collect()
}

#[test]
fn iterator_and_walker_agree_on_the_same_mask() {
    let doc = parse_str(
        "<r>alpha<a>beta<b/><!--x--></a>gamma<c><?pi d?>delta</c></r>",
    )
    .unwrap();
    let root = doc.document_element().unwrap();

    for mask in [
        what_to_show::ALL,
        what_to_show::ELEMENT,
        what_to_show::TEXT,
        what_to_show::COMMENT | what_to_show::PROCESSING_INSTRUCTION,
    ] {
        let iterator = doc.create_node_iterator(&root, NodeFilter::show(mask));
        let mut from_iterator = Vec::new();
        while let Some(node) = iterator.next_node().unwrap() {
            from_iterator.push(node);
        }

        let walker = doc.create_tree_walker(&root, NodeFilter::show(mask));
        let mut from_walker = Vec::new();
        if mask & what_to_show::ELEMENT != 0 {
            // The walker starts positioned at the root and never yields it.
            from_walker.push(walker.current_node());
        }
        while let Some(node) = walker.next_node() {
            from_walker.push(node);
        }

        let mut iterator_names = element_names(from_iterator);
        let walker_names = element_names(from_walker);
        if mask & what_to_show::ELEMENT == 0 {
            // The iterator also never yields the (element) root here.
            iterator_names.retain(|name| name != "r");
        }
        assert_eq!(iterator_names, walker_names, "mask {mask:#x}");
    }
}

#[test]
fn iterator_is_bidirectional() {
    let doc = parse_str("<r><a/><b/><c/></r>").unwrap();
    let iterator = doc.create_node_iterator(
        &doc.document_element().unwrap(),
        NodeFilter::show(what_to_show::ELEMENT),
    );

    assert_eq!(iterator.next_node().unwrap().unwrap().node_name(), "r");
    assert_eq!(iterator.next_node().unwrap().unwrap().node_name(), "a");
    assert_eq!(iterator.next_node().unwrap().unwrap().node_name(), "b");
    assert_eq!(iterator.previous_node().unwrap().unwrap().node_name(), "b");
    assert_eq!(iterator.previous_node().unwrap().unwrap().node_name(), "a");
    assert_eq!(iterator.next_node().unwrap().unwrap().node_name(), "a");
}

#[test]
fn iterator_survives_mutation_without_panicking() {
    let doc = parse_str("<r><a/><b/><c/></r>").unwrap();
    let root = doc.document_element().unwrap();
    let iterator = doc.create_node_iterator(&root, NodeFilter::show(what_to_show::ELEMENT));
    iterator.next_node().unwrap();
    iterator.next_node().unwrap();

    // Remove the node the iterator sits on; stepping may skip or revisit
    // but must keep answering.
    let a = root.first_element_child().unwrap();
    a.remove();
    let _ = iterator.next_node().unwrap();
    let _ = iterator.previous_node().unwrap();
}

#[test]
fn custom_filters_prune_and_skip() {
    let doc = parse_str("<r><keep><drop><keep/></drop></keep><drop/><keep/></r>").unwrap();
    let root = doc.document_element().unwrap();

    let walker = doc.create_tree_walker(
        &root,
        NodeFilter::new(
            what_to_show::ELEMENT,
            Box::new(|node| {
                if node.node_name() == "drop" {
                    FilterResult::Reject
                } else {
                    FilterResult::Accept
                }
            }),
        ),
    );
    let mut names = Vec::new();
    while let Some(node) = walker.next_node() {
        names.push(node.node_name());
    }
    // The keep inside a rejected subtree is pruned with it.
    assert_eq!(names, ["keep", "keep"]);
}

#[test]
fn range_boundaries_and_comparison() {
    let doc = parse_str("<r><p>one</p><p>two</p></r>").unwrap();
    let root = doc.document_element().unwrap();
    let first = root.first_element_child().unwrap();
    let second = root.last_element_child().unwrap();

    let range = doc.create_range();
    range.select_node(&first).unwrap();
    assert!(range.start_container().is_same_node(&root));
    assert_eq!((range.start_offset(), range.end_offset()), (0, 1));

    let other = doc.create_range();
    other.select_node(&second).unwrap();
    assert_eq!(
        range
            .compare_boundary_points(boundary_mode::START_TO_START, &other)
            .unwrap(),
        -1
    );
    assert_eq!(
        range
            .compare_boundary_points(boundary_mode::START_TO_END, &other)
            .unwrap(),
        0
    );

    // Offsets past the container length are an IndexSize error.
    let text = first.first_child().unwrap();
    assert!(matches!(
        range.set_start(&text, 4),
        Err(DomException::IndexSize(_))
    ));
}

#[test]
fn range_extracts_across_elements() {
    let doc = parse_str("<r><p>one</p><p>two</p></r>").unwrap();
    let root = doc.document_element().unwrap();
    let first_text = root.first_element_child().unwrap().first_child().unwrap();
    let second_text = root.last_element_child().unwrap().first_child().unwrap();

    let range = doc.create_range();
    range.set_start(&first_text, 1).unwrap();
    range.set_end(&second_text, 2).unwrap();
    assert_eq!(range.to_text(), "netw");

    let fragment = range.extract_contents().unwrap();
    assert_eq!(fragment.text_content().as_deref(), Some("netw"));
    assert_eq!(doc.to_xml(), "<r><p>o</p><p>o</p></r>");
    assert!(range.collapsed());
}

#[test]
fn range_delete_and_clone() {
    let doc = parse_str("<r>abcdef</r>").unwrap();
    let text = doc.document_element().unwrap().first_child().unwrap();

    let range = doc.create_range();
    range.set_start(&text, 2).unwrap();
    range.set_end(&text, 4).unwrap();

    let copy = range.clone_contents().unwrap();
    assert_eq!(copy.text_content().as_deref(), Some("cd"));
    assert_eq!(text.data().as_deref(), Some("abcdef"));

    range.delete_contents().unwrap();
    assert_eq!(text.data().as_deref(), Some("abef"));
}

#[test]
fn detached_subtrees_remain_usable() {
    let doc = parse_str("<r><a><b>text</b></a></r>").unwrap();
    let root = doc.document_element().unwrap();
    let a = root.first_element_child().unwrap();

    root.remove_child(&a).unwrap();
    assert!(a.parent_node().is_none());
    assert_eq!(a.text_content().as_deref(), Some("text"));

    // And may be re-inserted.
    root.append_child(&a).unwrap();
    assert_eq!(doc.to_xml(), "<r><a><b>text</b></a></r>");
}
