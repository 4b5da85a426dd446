//! Named events and the handlers listening to them.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::collections::map::HashMap;
use crate::collections::OrderedMap;
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::node::{NodeId, NodeRef};

/// Callback invoked when an action is posted.
pub type ActionHandler = Arc<dyn Fn(&mut Context<'_>, &Action) + Send + Sync + 'static>;

/// Ordered string tags attached to an [`Action`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tags(OrderedMap<String, String>);

impl Tags {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.0.insert(name.into(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A named event carrying an optional value and tags.
#[derive(Clone)]
pub struct Action {
    pub name: String,
    pub value: Option<Arc<dyn Any + Send + Sync>>,
    pub tags: Tags,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            tags: Tags::default(),
        }
    }

    pub fn with_value<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.value = Some(Arc::new(value));
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.tags.set(name, value);
        self
    }

    /// Returns the value when it is a `T`.
    pub fn value<T: Any>(&self) -> Option<&T> {
        self.value.as_deref()?.downcast_ref()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("has_value", &self.value.is_some())
            .field("tags", &self.tags)
            .finish()
    }
}

/// Builds an action and posts it through the dispatcher it came from.
#[must_use = "the action is only posted by calling `post`"]
pub struct ActionBuilder {
    dispatcher: Dispatcher,
    action: Action,
}

impl ActionBuilder {
    pub(crate) fn new(dispatcher: Dispatcher, name: impl Into<String>) -> Self {
        Self {
            dispatcher,
            action: Action::new(name),
        }
    }

    pub fn value<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.action = self.action.with_value(value);
        self
    }

    pub fn tag(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.action = self.action.with_tag(name, value);
        self
    }

    pub fn post(self) {
        self.dispatcher.post(self.action);
    }
}

/// Handlers registered before a dispatcher exists.
///
/// The dispatcher takes them over when it is built and runs them
/// asynchronously, scoped to the lifetime of its root.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: Mutex<Vec<(String, TypeId, ActionHandler)>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle<F>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(&mut Context<'_>, &Action) + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.into(), TypeId::of::<F>(), Arc::new(handler)));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn drain(&self) -> Vec<(String, TypeId, ActionHandler)> {
        std::mem::take(&mut *self.handlers.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

/// A handler bound to the node that registered it.
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) is_async: bool,
    pub(crate) source: NodeRef,
    pub(crate) handler: ActionHandler,
}

/// Handlers keyed by the registering node and the handler's type, so a node
/// can listen with several closures and a closure can be shared by nodes.
type HandlerKey = (NodeId, TypeId);

#[derive(Default)]
pub(crate) struct ActionManager {
    handlers: Mutex<HashMap<String, OrderedMap<HandlerKey, Registration>>>,
}

impl ActionManager {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, OrderedMap<HandlerKey, Registration>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn handle(
        &self,
        name: impl Into<String>,
        handler_id: TypeId,
        registration: Registration,
    ) {
        let key = (registration.source.id(), handler_id);
        self.lock()
            .entry(name.into())
            .or_insert_with(OrderedMap::default)
            .insert(key, registration);
    }

    /// Returns the live handlers for `action`, in registration order, dropping
    /// the ones whose source was dismounted.
    pub(crate) fn scheduled(&self, action: &Action) -> Vec<Registration> {
        let mut handlers = self.lock();
        let Some(bucket) = handlers.get_mut(&action.name) else {
            return Vec::new();
        };
        bucket.retain(|_, registration| registration.source.is_mounted());
        let live = bucket.values().cloned().collect();
        if bucket.is_empty() {
            handlers.remove(&action.name);
        }
        live
    }

    /// Drops every handler whose source was dismounted, and empty buckets.
    pub(crate) fn close_unused_handlers(&self) {
        self.lock().retain(|_, bucket| {
            bucket.retain(|_, registration| registration.source.is_mounted());
            !bucket.is_empty()
        });
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.lock().get(name).map_or(0, OrderedMap::len)
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
#[path = "tests/action_tests.rs"]
mod tests;
