use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::component::{component, Component};
use crate::dispatcher::Dispatcher;
use crate::document::{Document, MemoryDocument};
use crate::element::elem;
use crate::platform::InlineSpawner;
use crate::raw::raw;
use crate::selector::{If, Range};
use crate::text::text;

fn setup() -> (Arc<MemoryDocument>, Dispatcher) {
    let document = Arc::new(MemoryDocument::new());
    let dispatcher = Dispatcher::builder()
        .with_document(document.clone())
        .with_spawner(Arc::new(InlineSpawner))
        .build();
    (document, dispatcher)
}

fn markup(document: &MemoryDocument, node: &Ui) -> String {
    document.markup(node.native().expect("mounted node"))
}

struct Pair;

impl Component for Pair {
    fn render(&self) -> Ui {
        Range::slice(2, |i| text(i))
    }
}

struct Empty;

impl Component for Empty {
    fn render(&self) -> Ui {
        If::new(false, [text("never")]).into()
    }
}

struct Rows {
    count: usize,
}

impl Component for Rows {
    fn render(&self) -> Ui {
        Range::slice(self.count, |i| text(i))
    }
}

struct Tracked {
    dismounts: Arc<AtomicUsize>,
}

impl Component for Tracked {
    fn render(&self) -> Ui {
        text("tracked")
    }

    fn on_dismount(&mut self) {
        self.dismounts.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn mounting_twice_fails() {
    let (_, dispatcher) = setup();
    let mut node = text("hello");
    node.mount(&dispatcher, None).unwrap();

    let err = node.mount(&dispatcher, None).unwrap_err();
    assert!(matches!(
        err,
        NodeError::AlreadyMounted {
            kind: Kind::SimpleText,
            ..
        }
    ));
}

#[test]
fn selectors_cannot_be_mounted_or_updated() {
    let (_, dispatcher) = setup();
    let mut selector: Ui = If::new(true, [text("a")]).into();

    assert!(matches!(
        selector.mount(&dispatcher, None),
        Err(NodeError::NotMountable {
            kind: Kind::Selector,
            ..
        })
    ));
    assert!(matches!(
        selector.update(&dispatcher, text("b")),
        Err(NodeError::NotUpdatable { .. })
    ));
    assert!(!selector.is_mounted());
    assert_eq!(selector.id(), None);
}

#[test]
fn text_update_sets_node_value() {
    let (document, dispatcher) = setup();
    let mut node = text("a");
    node.mount(&dispatcher, None).unwrap();
    let native = node.native().unwrap();

    node.update(&dispatcher, text("a")).unwrap();
    node.update(&dispatcher, text("b")).unwrap();

    assert_eq!(document.node_value(native).as_deref(), Some("b"));
    assert_eq!(node.native(), Some(native));
}

#[test]
fn updating_unmounted_node_is_a_no_op() {
    let (_, dispatcher) = setup();
    let mut node = text("a");

    node.update(&dispatcher, text("b")).unwrap();

    match &node {
        Ui::Text(node) => assert_eq!(node.value(), "a"),
        other => panic!("unexpected node {other:?}"),
    }
}

#[test]
fn different_kinds_ask_for_replacement() {
    let (_, dispatcher) = setup();
    let mut node = text("a");
    node.mount(&dispatcher, None).unwrap();

    let err = node.update(&dispatcher, elem("p").into()).unwrap_err();
    assert!(err.is_replace());
    match err {
        NodeError::Replace { candidate, .. } => assert_eq!(candidate.name(), "p"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn raw_markup_is_trimmed_and_named_after_its_root() {
    let node = raw("  <svg viewBox=\"0 0 1 1\"></svg>\n");
    assert_eq!(node.name(), "raw.svg");
    match &node {
        Ui::Raw(raw) => assert_eq!(raw.value(), "<svg viewBox=\"0 0 1 1\"></svg>"),
        other => panic!("unexpected node {other:?}"),
    }
}

#[test]
fn raw_without_root_element_becomes_empty_div() {
    for markup in ["just text", "</p>", ""] {
        let node = raw(markup);
        assert_eq!(node.name(), "raw.");
        match &node {
            Ui::Raw(raw) => assert_eq!(raw.value(), "<div></div>"),
            other => panic!("unexpected node {other:?}"),
        }
    }
}

#[test]
fn raw_mounts_its_markup() {
    let (document, dispatcher) = setup();
    let mut node = raw("<p>hi</p>");
    node.mount(&dispatcher, None).unwrap();

    assert_eq!(markup(&document, &node), "<p>hi</p>");
    assert_eq!(document.parent_node(node.native().unwrap()), None);
}

#[test]
fn raw_update_requires_identical_markup() {
    let (_, dispatcher) = setup();
    let mut node = raw("<p>hi</p>");
    node.mount(&dispatcher, None).unwrap();

    node.update(&dispatcher, raw("<p>hi</p>")).unwrap();
    let err = node.update(&dispatcher, raw("<p>bye</p>")).unwrap_err();
    assert!(matches!(
        err,
        NodeError::Replace {
            reason: "different raw values",
            ..
        }
    ));
}

#[test]
fn element_update_diffs_attributes_and_children() {
    let (document, dispatcher) = setup();
    let mut node: Ui = elem("ul")
        .attr("id", "list")
        .attr("class", "a")
        .body([
            elem("li").text("1").into(),
            elem("li").text("2").into(),
            elem("li").text("3").into(),
        ])
        .into();
    node.mount(&dispatcher, None).unwrap();
    assert_eq!(
        markup(&document, &node),
        "<ul id=\"list\" class=\"a\"><li>1</li><li>2</li><li>3</li></ul>"
    );

    let candidate: Ui = elem("ul")
        .attr("class", "b")
        .body([elem("li").text("one").into(), text("tail")])
        .into();
    node.update(&dispatcher, candidate).unwrap();

    assert_eq!(
        markup(&document, &node),
        "<ul class=\"b\"><li>one</li>tail</ul>"
    );
    assert_eq!(node.children().len(), 2);
}

#[test]
fn replaced_child_takes_the_old_position() {
    let (document, dispatcher) = setup();
    let mut node: Ui = elem("div")
        .body([text("a"), text("b"), text("c")])
        .into();
    node.mount(&dispatcher, None).unwrap();
    let old = node.children()[1].node_ref().unwrap();

    node.update(
        &dispatcher,
        elem("div")
            .body([text("a"), elem("b").text("bold").into(), text("c")])
            .into(),
    )
    .unwrap();

    assert_eq!(markup(&document, &node), "<div>a<b>bold</b>c</div>");
    assert!(!old.is_mounted());
    assert!(old.is_canceled());
}

#[test]
fn element_body_expands_selectors() {
    let node = elem("div").body([
        text("start"),
        If::new(false, [text("no")]).else_if(true, [text("yes")]).into(),
        Range::slice(2, |i| text(i)),
    ]);
    let names: Vec<_> = node
        .children()
        .iter()
        .filter_map(|child| match child {
            Ui::Text(text) => Some(text.value().to_owned()),
            _ => None,
        })
        .collect();
    assert_eq!(names, ["start", "yes", "0", "1"]);
}

#[test]
fn dismount_releases_the_subtree() {
    let (document, dispatcher) = setup();
    let mut node: Ui = elem("div").body([text("a")]).into();
    node.mount(&dispatcher, None).unwrap();
    let native = node.native().unwrap();
    let child = node.children()[0].node_ref().unwrap();
    let live = document.len();

    node.dismount(&dispatcher);

    assert!(!node.is_mounted());
    assert!(!child.is_mounted());
    assert!(!document.contains(native));
    assert_eq!(document.len(), live - 2);
}

#[test]
fn parents_are_recorded_by_id() {
    let (_, dispatcher) = setup();
    let mut node: Ui = elem("div").body([text("a")]).into();
    node.mount(&dispatcher, Some(7)).unwrap();

    assert_eq!(node.parent(), Some(7));
    assert_eq!(node.children()[0].parent(), node.id());
}

#[test]
fn component_with_several_roots_fails_to_mount() {
    let (_, dispatcher) = setup();
    let mut node = component(Pair);

    let err = node.mount(&dispatcher, None).unwrap_err();
    assert!(matches!(err, NodeError::MultipleRoots { count: 2, .. }));
    assert!(!node.is_mounted());
}

#[test]
fn component_without_root_renders_empty_text() {
    let (document, dispatcher) = setup();
    let mut node = component(Empty);
    node.mount(&dispatcher, None).unwrap();

    assert!(node.is_mounted());
    assert_eq!(node.children()[0].kind(), Kind::SimpleText);
    assert_eq!(markup(&document, &node), "");
}

#[test]
fn component_name_is_its_type() {
    let node = component(Empty);
    assert_eq!(node.kind(), Kind::Component);
    assert!(node.name().ends_with("Empty"));
}

#[test]
fn node_refs_from_a_previous_mount_stay_dead() {
    let (_, dispatcher) = setup();
    let mut node = text("a");
    node.mount(&dispatcher, None).unwrap();
    let first = node.node_ref().unwrap();
    node.dismount(&dispatcher);
    node.mount(&dispatcher, None).unwrap();
    let second = node.node_ref().unwrap();

    assert_eq!(first.id(), second.id());
    assert!(!first.is_mounted());
    assert!(second.is_mounted());
    assert_ne!(first, second);
}

#[test]
fn failing_child_does_not_block_its_siblings() {
    let (document, dispatcher) = setup();
    let mut node: Ui = elem("div")
        .body([component(Rows { count: 1 }), text("a")])
        .into();
    node.mount(&dispatcher, None).unwrap();
    assert_eq!(markup(&document, &node), "<div>0a</div>");

    let err = node
        .update(
            &dispatcher,
            elem("div")
                .body([component(Rows { count: 2 }), text("b"), text("extra")])
                .into(),
        )
        .unwrap_err();

    assert!(matches!(err, NodeError::MultipleRoots { count: 2, .. }));
    assert_eq!(markup(&document, &node), "<div>0bextra</div>");
    assert_eq!(node.children().len(), 3);
}

#[test]
fn unmountable_new_child_is_skipped() {
    let (document, dispatcher) = setup();
    let mut node: Ui = elem("div").body([text("a")]).into();
    node.mount(&dispatcher, None).unwrap();

    let err = node
        .update(
            &dispatcher,
            elem("div")
                .body([text("a"), component(Pair), text("c")])
                .into(),
        )
        .unwrap_err();

    assert!(matches!(err, NodeError::MultipleRoots { .. }));
    assert_eq!(markup(&document, &node), "<div>ac</div>");
    assert_eq!(node.children().len(), 2);
}

#[test]
fn element_mount_failure_rolls_back_mounted_children() {
    let (document, dispatcher) = setup();
    let dismounts = Arc::new(AtomicUsize::new(0));
    let before = document.len();
    let mut node: Ui = elem("div")
        .body([
            component(Tracked {
                dismounts: Arc::clone(&dismounts),
            }),
            component(Pair),
        ])
        .into();

    assert!(node.mount(&dispatcher, None).is_err());

    assert!(!node.is_mounted());
    assert!(!node.children()[0].is_mounted());
    assert_eq!(dismounts.load(Ordering::SeqCst), 1);
    assert_eq!(document.len(), before);
}
