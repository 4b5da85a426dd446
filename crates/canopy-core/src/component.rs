//! User components.
//!
//! A component is a piece of state with a [`render`](Component::render)
//! function. The tree wraps it in a [`ComponentNode`] that owns the rendered
//! body and re-renders it whenever the dispatcher marks the component dirty.

use std::any::{type_name, Any};

use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::NodeError;
use crate::node::{flatten, patch, MountState, NodeId, Ui};
use crate::text::text;

/// Dynamic typing helpers every component gets for free.
pub trait AsAny: Any + Send {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Overwrites `self` with `next` when it has the same type.
    fn replace_with(&mut self, next: Box<dyn Any>) -> bool;
}

impl<T: Any + Send> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn replace_with(&mut self, next: Box<dyn Any>) -> bool {
        match next.downcast::<T>() {
            Ok(next) => {
                *self = *next;
                true
            }
            Err(_) => false,
        }
    }
}

/// A stateful piece of UI.
///
/// Hooks receive a [`Context`] scoped to the component; they run as
/// dispatches, so the component is re-rendered after each of them.
pub trait Component: AsAny {
    fn render(&self) -> Ui;

    /// Identity used to decide between updating and replacing.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Takes the fields of a freshly built `next` of the same type. Returns
    /// whether the body has to be rendered again.
    ///
    /// The default copies everything over. Components keeping local state
    /// that their parent does not provide override this.
    fn adopt(&mut self, next: Box<dyn Component>) -> bool {
        self.replace_with(next.into_any())
    }

    fn on_mount(&mut self, _ctx: &mut Context<'_>) {}

    /// Called synchronously while the component leaves the tree.
    fn on_dismount(&mut self) {}

    fn on_nav(&mut self, _ctx: &mut Context<'_>, _path: &str) {}

    fn on_app_update(&mut self, _ctx: &mut Context<'_>) {}

    /// Called when the app gets installed or uninstalled.
    fn on_app_install_change(&mut self, _ctx: &mut Context<'_>) {}

    fn on_resize(&mut self, _ctx: &mut Context<'_>) {}

    /// Called on the server before the page is turned into markup.
    fn on_pre_render(&mut self, _ctx: &mut Context<'_>) {}
}

impl<'a> dyn Component + 'a {
    pub fn downcast_ref<C: Component>(&self) -> Option<&C> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<C: Component>(&mut self) -> Option<&mut C> {
        self.as_any_mut().downcast_mut()
    }
}

/// Lifecycle hooks the dispatcher fans out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Hook {
    Mount,
    Nav(String),
    AppUpdate,
    AppInstallChange,
    Resize,
    PreRender,
}

impl Hook {
    pub(crate) fn call(&self, component: &mut dyn Component, ctx: &mut Context<'_>) {
        match self {
            Hook::Mount => component.on_mount(ctx),
            Hook::Nav(path) => component.on_nav(ctx, path),
            Hook::AppUpdate => component.on_app_update(ctx),
            Hook::AppInstallChange => component.on_app_install_change(ctx),
            Hook::Resize => component.on_resize(ctx),
            Hook::PreRender => component.on_pre_render(ctx),
        }
    }
}

/// Tree node hosting a [`Component`].
pub struct ComponentNode {
    name: &'static str,
    component: Box<dyn Component>,
    body: Option<Box<Ui>>,
    state: MountState,
}

/// Wraps `component` into a node.
pub fn component<C: Component>(component: C) -> Ui {
    Ui::Component(ComponentNode {
        name: component.name(),
        component: Box::new(component),
        body: None,
        state: MountState::new(),
    })
}

impl ComponentNode {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn component(&self) -> &dyn Component {
        &*self.component
    }

    pub(crate) fn component_mut(&mut self) -> &mut dyn Component {
        &mut *self.component
    }

    pub fn is_mounted(&self) -> bool {
        self.state.is_bound() && self.body.as_deref().is_some_and(Ui::is_mounted)
    }

    pub fn body(&self) -> Option<&Ui> {
        self.body.as_deref()
    }

    pub(crate) fn body_mut(&mut self) -> Option<&mut Ui> {
        self.body.as_deref_mut()
    }

    pub(crate) fn state(&self) -> &MountState {
        &self.state
    }

    fn render_root(&self) -> Result<Ui, NodeError> {
        let mut roots = flatten([self.component.render()]);
        match roots.len() {
            0 => Ok(text("")),
            1 => Ok(roots.remove(0)),
            count => Err(NodeError::MultipleRoots {
                name: self.name.to_owned(),
                count,
            }),
        }
    }

    pub(crate) fn mount(
        &mut self,
        dispatcher: &Dispatcher,
        parent: Option<NodeId>,
    ) -> Result<(), NodeError> {
        let mut body = self.render_root()?;
        self.state.bind(dispatcher, parent);
        if let Err(err) = body.mount(dispatcher, Some(self.state.id())) {
            body.dismount(dispatcher);
            self.state.unbind();
            return Err(err);
        }
        self.body = Some(Box::new(body));
        dispatcher.schedule_hook(self.state.node_ref(), Hook::Mount);
        Ok(())
    }

    pub(crate) fn update(
        &mut self,
        dispatcher: &Dispatcher,
        candidate: ComponentNode,
    ) -> Result<(), NodeError> {
        if self.component.adopt(candidate.component) {
            self.render(dispatcher)?;
        }
        Ok(())
    }

    /// Renders the component again and patches its body.
    pub(crate) fn render(&mut self, dispatcher: &Dispatcher) -> Result<(), NodeError> {
        if !self.is_mounted() {
            return Ok(());
        }
        let candidate = self.render_root()?;
        let id = self.state.id();
        match self.body.as_deref_mut() {
            Some(body) => patch(dispatcher, body, candidate, Some(id)),
            None => Ok(()),
        }
    }

    pub(crate) fn dismount(&mut self, dispatcher: &Dispatcher) {
        if !self.state.is_bound() {
            return;
        }
        self.component.on_dismount();
        if let Some(body) = self.body.as_deref_mut() {
            body.dismount(dispatcher);
        }
        self.state.unbind();
    }
}
