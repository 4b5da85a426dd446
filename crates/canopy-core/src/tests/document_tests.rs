use super::*;

#[test]
fn builds_markup_from_nested_nodes() {
    let doc = MemoryDocument::new();
    let body = doc.create_element("body");
    let link = doc.create_element("a");
    doc.set_attribute(link, "href", "/docs?a=1&b=\"2\"").unwrap();
    doc.set_attribute(link, "class", "nav").unwrap();
    let label = doc.create_text_node("<docs>");
    doc.append_child(link, label).unwrap();
    doc.append_child(body, link).unwrap();

    assert_eq!(
        doc.markup(body),
        "<body><a href=\"/docs?a=1&amp;b=&#34;2&#34;\" class=\"nav\">&lt;docs&gt;</a></body>"
    );
    assert_eq!(doc.parent_node(link), Some(body));
    assert_eq!(doc.children(body), vec![link]);
}

#[test]
fn append_moves_node_between_parents() {
    let doc = MemoryDocument::new();
    let first = doc.create_element("div");
    let second = doc.create_element("div");
    let child = doc.create_text_node("x");

    doc.append_child(first, child).unwrap();
    doc.append_child(second, child).unwrap();

    assert!(doc.children(first).is_empty());
    assert_eq!(doc.children(second), vec![child]);
    assert_eq!(doc.parent_node(child), Some(second));
}

#[test]
fn replace_child_keeps_position() {
    let doc = MemoryDocument::new();
    let list = doc.create_element("ul");
    let a = doc.create_element("li");
    let b = doc.create_element("li");
    let c = doc.create_element("li");
    let replacement = doc.create_element("p");
    for item in [a, b, c] {
        doc.append_child(list, item).unwrap();
    }

    doc.replace_child(list, replacement, b).unwrap();

    assert_eq!(doc.children(list), vec![a, replacement, c]);
    assert_eq!(doc.parent_node(b), None);
    assert_eq!(doc.parent_node(replacement), Some(list));
}

#[test]
fn remove_child_rejects_strangers() {
    let doc = MemoryDocument::new();
    let parent = doc.create_element("div");
    let other = doc.create_element("div");
    let child = doc.create_text_node("x");
    doc.append_child(other, child).unwrap();

    assert_eq!(
        doc.remove_child(parent, child),
        Err(DocumentError::NotAChild { parent, child })
    );
    doc.remove_child(other, child).unwrap();
    assert_eq!(doc.parent_node(child), None);
}

#[test]
fn text_nodes_cannot_have_children_or_attributes() {
    let doc = MemoryDocument::new();
    let text = doc.create_text_node("x");
    let child = doc.create_text_node("y");

    assert_eq!(
        doc.append_child(text, child),
        Err(DocumentError::NotAnElement(text))
    );
    assert_eq!(
        doc.set_attribute(text, "id", "a"),
        Err(DocumentError::NotAnElement(text))
    );
    doc.set_node_value(text, "z").unwrap();
    assert_eq!(doc.node_value(text).as_deref(), Some("z"));
}

#[test]
fn inner_html_becomes_first_child() {
    let doc = MemoryDocument::new();
    let wrapper = doc.create_element("div");
    doc.set_inner_html(wrapper, "<p>hi</p>").unwrap();

    let raw = doc.first_child(wrapper).expect("raw child");
    assert_eq!(doc.markup(raw), "<p>hi</p>");

    doc.set_inner_html(wrapper, "").unwrap();
    assert_eq!(doc.first_child(wrapper), None);
    assert_eq!(doc.parent_node(raw), None);
}

#[test]
fn released_nodes_are_gone() {
    let doc = MemoryDocument::new();
    let parent = doc.create_element("div");
    let child = doc.create_element("span");
    doc.append_child(parent, child).unwrap();

    doc.release(child);

    assert!(!doc.contains(child));
    assert!(doc.children(parent).is_empty());
    assert_eq!(doc.tag(child), None);
    assert_eq!(
        doc.set_attribute(child, "id", "x"),
        Err(DocumentError::Missing(child))
    );
}

#[test]
fn released_nodes_do_not_accumulate() {
    let doc = MemoryDocument::new();
    let root = doc.create_element("ul");
    let mut released = Vec::new();
    for _ in 0..100 {
        let item = doc.create_element("li");
        doc.append_child(root, item).unwrap();
        doc.release(item);
        released.push(item);
    }

    assert_eq!(doc.len(), 1);
    let fresh = doc.create_text_node("x");
    assert!(!released.contains(&fresh));
    assert!(released.iter().all(|item| !doc.contains(*item)));
}

#[test]
fn removing_attributes_keeps_order_of_the_rest() {
    let doc = MemoryDocument::new();
    let node = doc.create_element("input");
    doc.set_attribute(node, "type", "text").unwrap();
    doc.set_attribute(node, "name", "q").unwrap();
    doc.set_attribute(node, "value", "x").unwrap();

    doc.remove_attribute(node, "name").unwrap();

    assert_eq!(doc.attribute(node, "name"), None);
    assert_eq!(doc.markup(node), "<input type=\"text\" value=\"x\"></input>");
}

#[test]
fn dump_tree_indents_children() {
    let doc = MemoryDocument::new();
    let body = doc.create_element("body");
    let text = doc.create_text_node("hi");
    doc.append_child(body, text).unwrap();

    let dump = doc.dump_tree(Some(body));
    assert_eq!(
        dump,
        format!("[{}] <body>\n  [{}] \"hi\"\n", body.raw(), text.raw())
    );
    assert_eq!(doc.dump_tree(None), "(no root)\n");
}
