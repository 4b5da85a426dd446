use crate::dispatcher::Dispatcher;
use crate::error::NodeError;
use crate::node::{Kind, MountState, NodeId, Ui};

/// Markup inserted as-is.
pub struct RawNode {
    name: String,
    value: String,
    state: MountState,
}

/// Creates a node from raw markup.
///
/// The markup must have a single root element; anything else is swapped for
/// an empty `<div></div>`.
pub fn raw(markup: impl AsRef<str>) -> Ui {
    let mut value = markup.as_ref().trim().to_owned();
    let tag = match root_tag_name(&value) {
        Some(tag) => tag.to_owned(),
        None => {
            value = "<div></div>".to_owned();
            String::new()
        }
    };
    Ui::Raw(RawNode {
        name: format!("raw.{tag}"),
        value,
        state: MountState::new(),
    })
}

/// Returns the tag of the element the markup starts with.
pub(crate) fn root_tag_name(markup: &str) -> Option<&str> {
    let markup = markup.trim();
    if markup.starts_with("</") || !markup.starts_with('<') {
        return None;
    }
    let end = markup[1..].find(|c: char| matches!(c, ' ' | '\t' | '\n' | '>'))? + 1;
    if end <= 1 {
        return None;
    }
    Some(&markup[1..end])
}

impl RawNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
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
        let wrapper = document.create_element("div");
        let result = document.set_inner_html(wrapper, &self.value).map_err(NodeError::from);
        let native = result.and_then(|()| {
            let native = document.first_child(wrapper).ok_or_else(|| NodeError::Mount {
                name: self.name.clone(),
                reason: "converting raw html to html elements returned nothing".to_owned(),
            })?;
            document.remove_child(wrapper, native)?;
            Ok(native)
        });
        document.release(wrapper);

        let native = native?;
        self.state.bind(dispatcher, parent);
        self.state.set_native(native);
        Ok(())
    }

    pub(crate) fn update(&mut self, candidate: RawNode) -> Result<(), NodeError> {
        if self.value != candidate.value {
            return Err(NodeError::Replace {
                kind: Kind::RawHtml,
                name: self.name.clone(),
                reason: "different raw values",
                candidate: Box::new(Ui::Raw(candidate)),
            });
        }
        Ok(())
    }

    pub(crate) fn dismount(&mut self, dispatcher: &Dispatcher) {
        if let Some(native) = self.state.unbind() {
            dispatcher.document().release(native);
        }
    }
}
