//! The UI tree.
//!
//! A [`Ui`] is a closed set of node variants. Nodes own their children;
//! parents are only known by [`NodeId`], and everything that must outlive a
//! node without keeping it alive (action handlers, state observers, async
//! work) holds a [`NodeRef`] instead.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::component::ComponentNode;
use crate::dispatcher::{Dispatcher, DispatcherHandle};
use crate::document::NativeHandle;
use crate::element::ElementNode;
use crate::error::NodeError;
use crate::raw::RawNode;
use crate::selector::Selector;
use crate::text::TextNode;

pub type NodeId = usize;

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(1);

fn next_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Component,
    SimpleText,
    RawHtml,
    Selector,
    HtmlElement,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Component => "component",
            Kind::SimpleText => "text",
            Kind::RawHtml => "raw html",
            Kind::Selector => "selector",
            Kind::HtmlElement => "html element",
        };
        f.write_str(name)
    }
}

/// Mount status shared with everything that refers to a node.
///
/// A fresh record is created on every mount, so references taken during a
/// previous mount stay dead.
#[derive(Debug, Default)]
pub(crate) struct Liveness {
    mounted: AtomicBool,
    canceled: AtomicBool,
}

/// Non-owning reference to a node.
#[derive(Clone, Debug)]
pub struct NodeRef {
    id: NodeId,
    liveness: Weak<Liveness>,
}

impl NodeRef {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_mounted(&self) -> bool {
        self.liveness
            .upgrade()
            .is_some_and(|l| l.mounted.load(Ordering::Acquire))
    }

    /// Whether the node was dismounted since this reference was taken.
    ///
    /// Long running async work polls this to stop early.
    pub fn is_canceled(&self) -> bool {
        self.liveness
            .upgrade()
            .map_or(true, |l| l.canceled.load(Ordering::Acquire))
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.liveness.ptr_eq(&other.liveness)
    }
}

impl Eq for NodeRef {}

/// Bookkeeping every mountable node carries.
pub(crate) struct MountState {
    id: NodeId,
    liveness: Arc<Liveness>,
    dispatcher: Option<DispatcherHandle>,
    native: Option<NativeHandle>,
    parent: Option<NodeId>,
}

impl MountState {
    pub(crate) fn new() -> Self {
        Self {
            id: next_node_id(),
            liveness: Arc::new(Liveness::default()),
            dispatcher: None,
            native: None,
            parent: None,
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.dispatcher
            .as_ref()
            .is_some_and(DispatcherHandle::is_alive)
    }

    pub(crate) fn native(&self) -> Option<NativeHandle> {
        self.native
    }

    pub(crate) fn set_native(&mut self, native: NativeHandle) {
        self.native = Some(native);
    }

    pub(crate) fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub(crate) fn node_ref(&self) -> NodeRef {
        NodeRef {
            id: self.id,
            liveness: Arc::downgrade(&self.liveness),
        }
    }

    pub(crate) fn bind(&mut self, dispatcher: &Dispatcher, parent: Option<NodeId>) {
        let liveness = Arc::new(Liveness::default());
        liveness.mounted.store(true, Ordering::Release);
        self.liveness = liveness;
        self.dispatcher = Some(dispatcher.weak_handle());
        self.parent = parent;
    }

    /// Marks the node dismounted and returns the native handle it held.
    pub(crate) fn unbind(&mut self) -> Option<NativeHandle> {
        self.liveness.mounted.store(false, Ordering::Release);
        self.liveness.canceled.store(true, Ordering::Release);
        self.dispatcher = None;
        self.native.take()
    }
}

/// A node of the UI tree.
pub enum Ui {
    Component(ComponentNode),
    Text(TextNode),
    Raw(RawNode),
    Element(ElementNode),
    Selector(Selector),
}

impl Ui {
    pub fn kind(&self) -> Kind {
        match self {
            Ui::Component(_) => Kind::Component,
            Ui::Text(_) => Kind::SimpleText,
            Ui::Raw(_) => Kind::RawHtml,
            Ui::Element(_) => Kind::HtmlElement,
            Ui::Selector(_) => Kind::Selector,
        }
    }

    /// Structural identity: nodes of the same kind and name are updated in
    /// place, anything else is replaced.
    pub fn name(&self) -> &str {
        match self {
            Ui::Component(node) => node.name(),
            Ui::Text(_) => "text",
            Ui::Raw(node) => node.name(),
            Ui::Element(node) => node.tag(),
            Ui::Selector(node) => node.name(),
        }
    }

    /// Identifier of the node, stable for its whole life. Selectors have none.
    pub fn id(&self) -> Option<NodeId> {
        self.state().map(MountState::id)
    }

    pub fn node_ref(&self) -> Option<NodeRef> {
        self.state().map(MountState::node_ref)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.state().and_then(MountState::parent)
    }

    pub fn is_mounted(&self) -> bool {
        match self {
            Ui::Component(node) => node.is_mounted(),
            Ui::Selector(_) => false,
            _ => self
                .state()
                .is_some_and(|state| state.is_bound() && state.native().is_some()),
        }
    }

    /// Native handle backing the node. A component is backed by its body.
    pub fn native(&self) -> Option<NativeHandle> {
        match self {
            Ui::Component(node) => node.body().and_then(Ui::native),
            Ui::Selector(_) => None,
            _ => self.state().and_then(MountState::native),
        }
    }

    pub fn children(&self) -> &[Ui] {
        match self {
            Ui::Component(node) => node.body().map(std::slice::from_ref).unwrap_or(&[]),
            Ui::Element(node) => node.children(),
            Ui::Selector(node) => node.children(),
            Ui::Text(_) | Ui::Raw(_) => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Ui] {
        match self {
            Ui::Component(node) => node
                .body_mut()
                .map(std::slice::from_mut)
                .unwrap_or(&mut []),
            Ui::Element(node) => node.children_mut(),
            Ui::Text(_) | Ui::Raw(_) | Ui::Selector(_) => &mut [],
        }
    }

    fn state(&self) -> Option<&MountState> {
        match self {
            Ui::Component(node) => Some(node.state()),
            Ui::Text(node) => Some(node.state()),
            Ui::Raw(node) => Some(node.state()),
            Ui::Element(node) => Some(node.state()),
            Ui::Selector(_) => None,
        }
    }

    pub(crate) fn already_mounted(&self) -> NodeError {
        NodeError::AlreadyMounted {
            kind: self.kind(),
            name: self.name().to_owned(),
        }
    }

    pub(crate) fn replace_with(&self, candidate: Ui, reason: &'static str) -> NodeError {
        NodeError::Replace {
            kind: self.kind(),
            name: self.name().to_owned(),
            reason,
            candidate: Box::new(candidate),
        }
    }

    pub(crate) fn mount(
        &mut self,
        dispatcher: &Dispatcher,
        parent: Option<NodeId>,
    ) -> Result<(), NodeError> {
        if self.is_mounted() {
            return Err(self.already_mounted());
        }
        match self {
            Ui::Component(node) => node.mount(dispatcher, parent),
            Ui::Text(node) => {
                node.mount(dispatcher, parent);
                Ok(())
            }
            Ui::Raw(node) => node.mount(dispatcher, parent),
            Ui::Element(node) => node.mount(dispatcher, parent),
            Ui::Selector(node) => Err(NodeError::NotMountable {
                kind: Kind::Selector,
                name: node.name().to_owned(),
            }),
        }
    }

    /// Updates the node in place from `candidate`.
    ///
    /// Fails with [`NodeError::Replace`] when the candidate has a different
    /// structural identity; the owner then swaps the subtree with [`patch`].
    pub(crate) fn update(&mut self, dispatcher: &Dispatcher, candidate: Ui) -> Result<(), NodeError> {
        if let Ui::Selector(node) = self {
            return Err(NodeError::NotUpdatable {
                kind: Kind::Selector,
                name: node.name().to_owned(),
            });
        }
        if !self.is_mounted() {
            return Ok(());
        }
        if self.kind() != candidate.kind() || self.name() != candidate.name() {
            return Err(self.replace_with(candidate, "different element types"));
        }
        match (self, candidate) {
            (Ui::Text(node), Ui::Text(candidate)) => node.update(dispatcher, candidate),
            (Ui::Raw(node), Ui::Raw(candidate)) => node.update(candidate),
            (Ui::Element(node), Ui::Element(candidate)) => node.update(dispatcher, candidate),
            (Ui::Component(node), Ui::Component(candidate)) => node.update(dispatcher, candidate),
            (node, candidate) => Err(node.replace_with(candidate, "different element types")),
        }
    }

    pub(crate) fn dismount(&mut self, dispatcher: &Dispatcher) {
        match self {
            Ui::Component(node) => node.dismount(dispatcher),
            Ui::Text(node) => node.dismount(dispatcher),
            Ui::Raw(node) => node.dismount(dispatcher),
            Ui::Element(node) => node.dismount(dispatcher),
            Ui::Selector(_) => {}
        }
    }
}

impl fmt::Debug for Ui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ui")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("id", &self.id())
            .field("mounted", &self.is_mounted())
            .field("children", &self.children().len())
            .finish()
    }
}

/// Expands selectors into the nodes they resolved to.
pub(crate) fn flatten(nodes: impl IntoIterator<Item = Ui>) -> Vec<Ui> {
    let mut flat = Vec::new();
    for node in nodes {
        match node {
            Ui::Selector(selector) => flat.extend(flatten(selector.into_children())),
            node => flat.push(node),
        }
    }
    flat
}

/// Updates `slot` from `candidate`, swapping the subtree when the candidate
/// has to replace it.
pub(crate) fn patch(
    dispatcher: &Dispatcher,
    slot: &mut Ui,
    candidate: Ui,
    parent: Option<NodeId>,
) -> Result<(), NodeError> {
    match slot.update(dispatcher, candidate) {
        Err(NodeError::Replace { candidate, .. }) => replace(dispatcher, slot, *candidate, parent),
        result => result,
    }
}

fn replace(
    dispatcher: &Dispatcher,
    slot: &mut Ui,
    mut candidate: Ui,
    parent: Option<NodeId>,
) -> Result<(), NodeError> {
    candidate.mount(dispatcher, parent)?;

    let document = dispatcher.document();
    if let (Some(old), Some(new)) = (slot.native(), candidate.native()) {
        if let Some(native_parent) = document.parent_node(old) {
            if let Err(err) = document.replace_child(native_parent, new, old) {
                candidate.dismount(dispatcher);
                return Err(err.into());
            }
        }
    }

    let mut previous = std::mem::replace(slot, candidate);
    previous.dismount(dispatcher);
    Ok(())
}

/// Reconciles `children` against `candidates` position by position.
///
/// Matching positions are patched, extra children are dismounted and removed
/// from `native_parent`, extra candidates are mounted and appended to it.
/// A child that fails is logged and left as it was while its siblings are
/// still reconciled; the first failure is returned at the end.
pub(crate) fn reconcile(
    dispatcher: &Dispatcher,
    children: &mut Vec<Ui>,
    candidates: Vec<Ui>,
    parent: NodeId,
    native_parent: NativeHandle,
) -> Result<(), NodeError> {
    let document = dispatcher.document();
    let common = children.len().min(candidates.len());
    let mut candidates = candidates.into_iter();
    let mut first_error = None;
    let mut failed = |err: NodeError, kind: Kind, name: &str| {
        log::error!("reconciling {kind} {name:?} failed: {err}");
        first_error.get_or_insert(err);
    };

    for (child, candidate) in children.iter_mut().zip(candidates.by_ref()) {
        let (kind, name) = (candidate.kind(), candidate.name().to_owned());
        if let Err(err) = patch(dispatcher, child, candidate, Some(parent)) {
            failed(err, kind, &name);
        }
    }

    for mut stale in children.split_off(common) {
        if let Some(native) = stale.native() {
            if let Err(err) = document.remove_child(native_parent, native) {
                log::warn!("removing {} {:?} failed: {err}", stale.kind(), stale.name());
            }
        }
        stale.dismount(dispatcher);
    }

    for mut candidate in candidates {
        if let Err(err) = candidate.mount(dispatcher, Some(parent)) {
            failed(err, candidate.kind(), candidate.name());
            continue;
        }
        if let Some(native) = candidate.native() {
            if let Err(err) = document.append_child(native_parent, native) {
                candidate.dismount(dispatcher);
                failed(err.into(), candidate.kind(), candidate.name());
                continue;
            }
        }
        children.push(candidate);
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
#[path = "tests/node_tests.rs"]
mod tests;
