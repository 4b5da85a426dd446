use std::fmt::Display;

use crate::dispatcher::Dispatcher;
use crate::error::NodeError;
use crate::node::{MountState, NodeId, Ui};

/// A text node.
pub struct TextNode {
    value: String,
    state: MountState,
}

/// Creates a text node displaying `value`.
pub fn text(value: impl Display) -> Ui {
    Ui::Text(TextNode {
        value: value.to_string(),
        state: MountState::new(),
    })
}

impl TextNode {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub(crate) fn state(&self) -> &MountState {
        &self.state
    }

    pub(crate) fn mount(&mut self, dispatcher: &Dispatcher, parent: Option<NodeId>) {
        self.state.bind(dispatcher, parent);
        let native = dispatcher.document().create_text_node(&self.value);
        self.state.set_native(native);
    }

    pub(crate) fn update(
        &mut self,
        dispatcher: &Dispatcher,
        candidate: TextNode,
    ) -> Result<(), NodeError> {
        if self.value == candidate.value {
            return Ok(());
        }
        self.value = candidate.value;
        if let Some(native) = self.state.native() {
            dispatcher.document().set_node_value(native, &self.value)?;
        }
        Ok(())
    }

    pub(crate) fn dismount(&mut self, dispatcher: &Dispatcher) {
        if let Some(native) = self.state.unbind() {
            dispatcher.document().release(native);
        }
    }
}
