//! Keyed state shared across the tree, and observers keeping components in
//! sync with it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collections::map::HashMap;
use crate::component::Component;
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::StateError;
use crate::node::NodeRef;

/// How a state value is stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateOptions {
    persist: bool,
    expires_in: Option<Duration>,
}

impl StateOptions {
    /// Writes the value through to local storage. A later lookup that misses
    /// in memory reloads it from there.
    pub fn persist(mut self) -> Self {
        self.persist = true;
        self
    }

    pub fn expires_in(mut self, duration: Duration) -> Self {
        self.expires_in = Some(duration);
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.persist
    }

    pub(crate) fn ttl(&self) -> Option<Duration> {
        self.expires_in
    }
}

/// Shape of a value written to local storage.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedState {
    pub(crate) value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expires_at_ms: Option<u64>,
}

impl PersistedState {
    pub(crate) fn new(value: Value, expires_in: Option<Duration>) -> Self {
        let expires_at_ms = expires_in.map(|ttl| unix_millis(SystemTime::now() + ttl));
        Self {
            value,
            expires_at_ms,
        }
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.expires_at_ms
            .is_some_and(|at| at <= unix_millis(SystemTime::now()))
    }

    /// Remaining lifetime, when the value expires.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        let at = self.expires_at_ms?;
        Some(Duration::from_millis(
            at.saturating_sub(unix_millis(SystemTime::now())),
        ))
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

type Predicate = Arc<dyn Fn(&mut Context<'_>) -> bool + Send + Sync>;
type ChangeHook = Arc<dyn Fn(&mut Context<'_>) + Send + Sync>;
type Binding = Arc<dyn Fn(&mut Context<'_>, &Value) -> Result<(), StateError> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct ObserverEntry {
    id: u64,
    key: String,
    source: NodeRef,
    while_active: Vec<Predicate>,
    on_change: Vec<ChangeHook>,
    bind: Option<Binding>,
}

impl ObserverEntry {
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn source(&self) -> &NodeRef {
        &self.source
    }

    /// Delivers `value` to the observing component.
    ///
    /// Returns `false` when the observer should be dropped.
    pub(crate) fn deliver(&self, ctx: &mut Context<'_>, value: &Value) -> bool {
        if !self.while_active.iter().all(|active| active(ctx)) {
            return false;
        }
        for hook in &self.on_change {
            hook(ctx);
        }
        if let Some(bind) = &self.bind {
            if let Err(err) = bind(ctx, value) {
                log::error!("observing state {:?} failed: {err}", self.key);
            }
        }
        true
    }
}

struct StateEntry {
    value: Option<Value>,
    expires_at: Option<Instant>,
    persist: bool,
    observers: Vec<ObserverEntry>,
}

impl StateEntry {
    fn empty() -> Self {
        Self {
            value: None,
            expires_at: None,
            persist: false,
            observers: Vec::new(),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn prune(&mut self) {
        self.observers.retain(|observer| observer.source.is_mounted());
    }
}

/// A value waiting to be delivered to an observer.
pub(crate) type Delivery = (ObserverEntry, Value);

#[derive(Default)]
pub(crate) struct StateStore {
    entries: Mutex<HashMap<String, StateEntry>>,
    next_observer: AtomicU64,
}

impl StateStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, StateEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` and returns what its live observers should receive.
    pub(crate) fn set(&self, key: &str, value: Value, options: StateOptions) -> Vec<Delivery> {
        let now = Instant::now();
        let mut entries = self.lock();
        let entry = entries
            .entry(key.to_owned())
            .or_insert_with(StateEntry::empty);
        entry.value = Some(value.clone());
        entry.expires_at = options.expires_in.map(|ttl| now + ttl);
        entry.persist = options.persist;
        entry.prune();
        entry
            .observers
            .iter()
            .map(|observer| (observer.clone(), value.clone()))
            .collect()
    }

    /// Returns the live value for `key`. Expired values are dropped.
    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;
        if entry.is_expired(now) {
            entry.value = None;
            entry.expires_at = None;
            return None;
        }
        entry.value.clone()
    }

    pub(crate) fn is_persisted(&self, key: &str) -> bool {
        self.lock().get(key).is_some_and(|entry| entry.persist)
    }

    /// Removes the value and its observers.
    pub(crate) fn del(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub(crate) fn next_observer_id(&self) -> u64 {
        self.next_observer.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers `observer` and returns the current value, if any.
    pub(crate) fn observe(&self, observer: ObserverEntry) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.lock();
        let entry = entries
            .entry(observer.key.clone())
            .or_insert_with(StateEntry::empty);
        entry.prune();
        entry.observers.push(observer);
        if entry.is_expired(now) {
            return None;
        }
        entry.value.clone()
    }

    pub(crate) fn remove_observer(&self, key: &str, id: u64) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.observers.retain(|observer| observer.id != id);
        }
    }

    pub(crate) fn observer_count(&self, key: &str) -> usize {
        let mut entries = self.lock();
        entries.get_mut(key).map_or(0, |entry| {
            entry.prune();
            entry.observers.len()
        })
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }
}

/// Subscription to a state key, bound to the node that created it.
///
/// Nothing is registered until [`value`](Self::value) or
/// [`subscribe`](Self::subscribe) is called.
#[must_use = "observers are only registered by `value` or `subscribe`"]
pub struct Observer {
    dispatcher: Dispatcher,
    key: String,
    source: NodeRef,
    while_active: Vec<Predicate>,
    on_change: Vec<ChangeHook>,
}

impl Observer {
    pub(crate) fn new(dispatcher: Dispatcher, key: impl Into<String>, source: NodeRef) -> Self {
        Self {
            dispatcher,
            key: key.into(),
            source,
            while_active: Vec::new(),
            on_change: Vec::new(),
        }
    }

    /// Keeps the subscription only while `predicate` holds for the observing
    /// component. It is checked before every delivery.
    pub fn while_active<C>(mut self, predicate: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self
    where
        C: Component,
    {
        self.while_active.push(Arc::new(move |ctx: &mut Context<'_>| {
            ctx.component::<C>().is_some_and(|component| predicate(component))
        }));
        self
    }

    /// Runs `hook` each time a new value is delivered, before it is bound.
    pub fn on_change(mut self, hook: impl Fn(&mut Context<'_>) + Send + Sync + 'static) -> Self {
        self.on_change.push(Arc::new(hook));
        self
    }

    /// Registers the observer, storing every value of the key into the
    /// observing component with `bind`.
    pub fn value<C, T>(self, bind: impl Fn(&mut C, T) + Send + Sync + 'static)
    where
        C: Component,
        T: DeserializeOwned,
    {
        let key = self.key.clone();
        let binding: Binding = Arc::new(move |ctx: &mut Context<'_>, value: &Value| {
            let value = T::deserialize(value).map_err(|source| StateError::Decode {
                key: key.clone(),
                source,
            })?;
            if let Some(component) = ctx.component_mut::<C>() {
                bind(component, value);
            }
            Ok(())
        });
        self.register(Some(binding));
    }

    /// Registers the observer without binding the value anywhere.
    pub fn subscribe(self) {
        self.register(None);
    }

    fn register(self, bind: Option<Binding>) {
        let Self {
            dispatcher,
            key,
            source,
            while_active,
            on_change,
        } = self;
        if !source.is_mounted() {
            log::debug!("not observing state {key:?}: node {} is not mounted", source.id());
            return;
        }
        let observer = ObserverEntry {
            id: dispatcher.states().next_observer_id(),
            key,
            source,
            while_active,
            on_change,
            bind,
        };
        dispatcher.register_observer(observer);
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("key", &self.key)
            .field("source", &self.source.id())
            .finish()
    }
}

pub(crate) fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Value, StateError> {
    serde_json::to_value(value).map_err(|source| StateError::Encode {
        key: key.to_owned(),
        source,
    })
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, StateError> {
    serde_json::from_value(value).map_err(|source| StateError::Decode {
        key: key.to_owned(),
        source,
    })
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
