//! The handle user code receives from the dispatcher.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::action::{Action, ActionBuilder};
use crate::component::{Component, Hook};
use crate::dispatcher::{Dispatch, DispatchMode, Dispatcher};
use crate::error::StateError;
use crate::node::NodeRef;
use crate::state::{Observer, StateOptions};
use crate::storage::BrowserStorage;

/// Access to the dispatcher on behalf of a node.
///
/// Inside a dispatch, the context also lends out the innermost component
/// enclosing the source node.
pub struct Context<'a> {
    dispatcher: Dispatcher,
    source: Option<NodeRef>,
    component: Option<&'a mut dyn Component>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        source: Option<NodeRef>,
        component: Option<&'a mut dyn Component>,
    ) -> Self {
        Self {
            dispatcher,
            source,
            component,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Node the context acts for.
    pub fn source(&self) -> Option<&NodeRef> {
        self.source.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.source.as_ref().is_some_and(NodeRef::is_mounted)
    }

    /// Whether the source node left the tree. Background work polls this to
    /// stop early.
    pub fn is_canceled(&self) -> bool {
        self.source.as_ref().is_some_and(NodeRef::is_canceled)
    }

    pub fn component<C: Component>(&self) -> Option<&C> {
        self.component.as_deref()?.downcast_ref()
    }

    pub fn component_mut<C: Component>(&mut self) -> Option<&mut C> {
        self.component.as_deref_mut()?.downcast_mut()
    }

    /// Lends the component as a `C` together with the context.
    pub fn with_component<C: Component, R>(
        &mut self,
        f: impl FnOnce(&mut C, &mut Context<'_>) -> R,
    ) -> Option<R> {
        let component = self.component.take()?;
        let result = component.downcast_mut::<C>().map(|c| f(c, self));
        self.component = Some(component);
        result
    }

    pub(crate) fn run_hook(&mut self, hook: &Hook) {
        let Some(component) = self.component.take() else {
            return;
        };
        hook.call(&mut *component, self);
        self.component = Some(component);
    }

    /// Runs `f` on behalf of the source, then re-renders its component.
    pub fn dispatch(&self, f: impl FnOnce(&mut Context<'_>) + Send + 'static) {
        self.dispatcher
            .dispatch(Dispatch::new(DispatchMode::Update, self.source.clone(), f));
    }

    /// Runs `f` after the current cycle, once components are rendered.
    pub fn defer(&self, f: impl FnOnce(&mut Context<'_>) + Send + 'static) {
        self.dispatcher.defer(self.source.clone(), f);
    }

    /// Runs `f` without re-rendering anything.
    pub fn next(&self, f: impl FnOnce(&mut Context<'_>) + Send + 'static) {
        self.dispatcher.next(self.source.clone(), f);
    }

    /// Runs `f`, then re-renders every component enclosing the source.
    pub fn emit(&self, f: impl FnOnce(&mut Context<'_>) + Send + 'static) {
        match &self.source {
            Some(source) => self.dispatcher.emit(source.clone(), f),
            None => self.dispatcher.next(None, f),
        }
    }

    pub fn run_async(&self, f: impl FnOnce() + Send + 'static) {
        self.dispatcher.run_async(f);
    }

    /// Listens to `name` for as long as the source is mounted.
    pub fn handle<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Context<'_>, &Action) + Send + Sync + 'static,
    {
        match self.owner() {
            Some(source) => self.dispatcher.handle(name, source, handler),
            None => log::warn!("ignoring action handler: context has no node"),
        }
    }

    /// Same as [`handle`](Self::handle), running the handler in the
    /// background.
    pub fn handle_async<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Context<'_>, &Action) + Send + Sync + 'static,
    {
        match self.owner() {
            Some(source) => self.dispatcher.handle_async(name, source, handler),
            None => log::warn!("ignoring action handler: context has no node"),
        }
    }

    pub fn post(&self, action: Action) {
        self.dispatcher.post(action);
    }

    pub fn new_action(&self, name: impl Into<String>) -> ActionBuilder {
        ActionBuilder::new(self.dispatcher.clone(), name)
    }

    pub fn set_state<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: StateOptions,
    ) -> Result<(), StateError> {
        self.dispatcher.set_state(key, value, options)
    }

    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        self.dispatcher.get_state(key)
    }

    pub fn del_state(&self, key: &str) {
        self.dispatcher.del_state(key);
    }

    /// Observes `key` for the source node, or the body without one.
    pub fn observe_state(&self, key: impl Into<String>) -> Option<Observer> {
        let source = self.owner()?;
        Some(self.dispatcher.observe_state(key, source))
    }

    pub fn local_storage(&self) -> &dyn BrowserStorage {
        self.dispatcher.local_storage()
    }

    pub fn session_storage(&self) -> &dyn BrowserStorage {
        self.dispatcher.session_storage()
    }

    pub fn navigate(&self, path: &str) {
        self.dispatcher.navigate(path);
    }

    fn owner(&self) -> Option<NodeRef> {
        self.source.clone().or_else(|| self.dispatcher.body_ref())
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("source", &self.source.as_ref().map(NodeRef::id))
            .field("has_component", &self.component.is_some())
            .finish()
    }
}
