use std::fmt::Display;

use crate::collections::OrderedMap;
use crate::dispatcher::Dispatcher;
use crate::document::NativeHandle;
use crate::error::NodeError;
use crate::node::{flatten, reconcile, MountState, NodeId, Ui};
use crate::text::text;

/// A generic markup element with ordered attributes and children.
pub struct ElementNode {
    tag: String,
    attributes: OrderedMap<String, String>,
    children: Vec<Ui>,
    state: MountState,
}

/// Creates an element with the given tag.
pub fn elem(tag: impl Into<String>) -> ElementNode {
    ElementNode {
        tag: tag.into(),
        attributes: OrderedMap::default(),
        children: Vec::new(),
        state: MountState::new(),
    }
}

impl ElementNode {
    pub fn attr(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.attributes.insert(name.into(), value.to_string());
        self
    }

    /// Sets the children, expanding selectors in place.
    pub fn body(mut self, children: impl IntoIterator<Item = Ui>) -> Self {
        self.children = flatten(children);
        self
    }

    /// Sets a single text child.
    pub fn text(self, value: impl Display) -> Self {
        self.body([text(value)])
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn children(&self) -> &[Ui] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Ui] {
        &mut self.children
    }

    pub(crate) fn state(&self) -> &MountState {
        &self.state
    }

    pub(crate) fn mount(
        &mut self,
        dispatcher: &Dispatcher,
        parent: Option<NodeId>,
    ) -> Result<(), NodeError> {
        let document = dispatcher.document();
        let native = document.create_element(&self.tag);
        for (name, value) in &self.attributes {
            if let Err(err) = document.set_attribute(native, name, value) {
                document.release(native);
                return Err(err.into());
            }
        }
        self.state.bind(dispatcher, parent);
        self.state.set_native(native);

        let id = self.state.id();
        for index in 0..self.children.len() {
            if let Err(err) = self.mount_child(dispatcher, index, id, native) {
                for mounted in &mut self.children[..index] {
                    mounted.dismount(dispatcher);
                }
                if let Some(native) = self.state.unbind() {
                    document.release(native);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn mount_child(
        &mut self,
        dispatcher: &Dispatcher,
        index: usize,
        parent: NodeId,
        native: NativeHandle,
    ) -> Result<(), NodeError> {
        let child = &mut self.children[index];
        child.mount(dispatcher, Some(parent))?;
        if let Some(child_native) = child.native() {
            if let Err(err) = dispatcher.document().append_child(native, child_native) {
                child.dismount(dispatcher);
                return Err(err.into());
            }
        }
        Ok(())
    }

    pub(crate) fn update(
        &mut self,
        dispatcher: &Dispatcher,
        candidate: ElementNode,
    ) -> Result<(), NodeError> {
        let Some(native) = self.state.native() else {
            return Ok(());
        };
        let document = dispatcher.document();

        for (name, value) in &candidate.attributes {
            if self.attributes.get(name) != Some(value) {
                document.set_attribute(native, name, value)?;
            }
        }
        for name in self.attributes.keys() {
            if !candidate.attributes.contains_key(name) {
                document.remove_attribute(native, name)?;
            }
        }
        self.attributes = candidate.attributes;
        self.reconcile_children(dispatcher, candidate.children)
    }

    /// Patches the children against `candidates`, position by position.
    pub(crate) fn reconcile_children(
        &mut self,
        dispatcher: &Dispatcher,
        candidates: Vec<Ui>,
    ) -> Result<(), NodeError> {
        let Some(native) = self.state.native() else {
            return Ok(());
        };
        reconcile(
            dispatcher,
            &mut self.children,
            flatten(candidates),
            self.state.id(),
            native,
        )
    }

    pub(crate) fn dismount(&mut self, dispatcher: &Dispatcher) {
        for child in &mut self.children {
            child.dismount(dispatcher);
        }
        if let Some(native) = self.state.unbind() {
            dispatcher.document().release(native);
        }
    }
}

impl From<ElementNode> for Ui {
    fn from(node: ElementNode) -> Self {
        Ui::Element(node)
    }
}
