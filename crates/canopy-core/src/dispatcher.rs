//! The dispatcher owns a UI tree and serialises every change made to it.
//!
//! Work is queued as [`Dispatch`]es and executed one at a time by
//! [`Dispatcher::consume_next`]. A cycle runs the immediate queue in FIFO
//! order, then re-renders the components marked dirty along the way, from
//! the outermost to the innermost, then runs deferred work. Background work
//! started with [`Dispatcher::run_async`] escapes the queue; it is counted so
//! [`Dispatcher::wait`] can block until it is done.
//!
//! Locks are always taken in the order tree, states/actions, queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{
    Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak,
};
use std::thread::{self, ThreadId};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::action::{Action, ActionHandler, ActionManager, ActionRegistry, Registration};
use crate::collections::map::HashMap;
use crate::component::{component, Component, ComponentNode, Hook};
use crate::context::Context;
use crate::document::{Document, MemoryDocument, NativeHandle};
use crate::element::elem;
use crate::error::StateError;
use crate::node::{NodeId, NodeRef, Ui};
use crate::platform::{TaskSpawner, ThreadSpawner};
use crate::router::{Factory, NotFound, Router};
use crate::state::{self, Observer, ObserverEntry, PersistedState, StateOptions, StateStore};
use crate::storage::{BrowserStorage, MemoryStorage};
use crate::tasks::TaskTracker;

/// How a [`Dispatch`] is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Runs as soon as possible, then re-renders the enclosing component at
    /// the end of the cycle.
    Update,
    /// Runs once the current cycle is over, after re-renders.
    Defer,
    /// Runs as soon as possible without re-rendering anything.
    Next,
}

type RunFn = Box<dyn FnOnce(&mut Context<'_>) + Send + 'static>;
type TreeFn = Box<dyn FnOnce(&Dispatcher, &mut Tree) + Send + 'static>;

enum Work {
    Run(RunFn),
    Tree(TreeFn),
}

/// A unit of work executed by the dispatcher.
pub struct Dispatch {
    mode: DispatchMode,
    source: Option<NodeRef>,
    work: Work,
    emit: bool,
}

impl Dispatch {
    /// Creates a dispatch running `f` on behalf of `source`.
    ///
    /// A dispatch whose source is dismounted by the time it runs is dropped.
    pub fn new(
        mode: DispatchMode,
        source: Option<NodeRef>,
        f: impl FnOnce(&mut Context<'_>) + Send + 'static,
    ) -> Self {
        Self {
            mode,
            source,
            work: Work::Run(Box::new(f)),
            emit: false,
        }
    }

    fn tree(source: Option<NodeRef>, f: impl FnOnce(&Dispatcher, &mut Tree) + Send + 'static) -> Self {
        Self {
            mode: DispatchMode::Next,
            source,
            work: Work::Tree(Box::new(f)),
            emit: false,
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn source(&self) -> Option<&NodeRef> {
        self.source.as_ref()
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("mode", &self.mode)
            .field("source", &self.source.as_ref().map(NodeRef::id))
            .field("emit", &self.emit)
            .finish()
    }
}

/// The mounted tree, rooted at a `body` element.
pub(crate) struct Tree {
    root: Ui,
}

impl Tree {
    /// Child indices leading from the root to node `id`.
    fn path_to(&self, id: NodeId) -> Option<Vec<usize>> {
        fn search(node: &Ui, id: NodeId, path: &mut Vec<usize>) -> bool {
            if node.id() == Some(id) {
                return true;
            }
            for (index, child) in node.children().iter().enumerate() {
                path.push(index);
                if search(child, id, path) {
                    return true;
                }
                path.pop();
            }
            false
        }

        let mut path = Vec::new();
        search(&self.root, id, &mut path).then_some(path)
    }

    fn node_mut(&mut self, path: &[usize]) -> Option<&mut Ui> {
        let mut node = &mut self.root;
        for &index in path {
            node = node.children_mut().get_mut(index)?;
        }
        Some(node)
    }

    /// Components on the way to the end of `path`, the last node included,
    /// with their depth.
    fn components_on(&self, path: &[usize]) -> Vec<(NodeId, usize)> {
        let mut components = Vec::new();
        let mut node = &self.root;
        for depth in 0..=path.len() {
            if let (Ui::Component(_), Some(id)) = (node, node.id()) {
                components.push((id, depth));
            }
            match path.get(depth).and_then(|&index| node.children().get(index)) {
                Some(child) => node = child,
                None => break,
            }
        }
        components
    }

    /// The innermost component enclosing the end of `path`, itself included.
    fn enclosing_component_mut(&mut self, path: &[usize]) -> Option<&mut ComponentNode> {
        let (_, depth) = self.components_on(path).pop()?;
        match self.node_mut(&path[..depth])? {
            Ui::Component(node) => Some(node),
            _ => None,
        }
    }

    fn component_mut(&mut self, id: NodeId) -> Option<&mut ComponentNode> {
        let path = self.path_to(id)?;
        match self.node_mut(&path)? {
            Ui::Component(node) => Some(node),
            _ => None,
        }
    }

    fn collect_components(node: &Ui, into: &mut Vec<NodeRef>) {
        if let (Ui::Component(_), Some(node_ref)) = (node, node.node_ref()) {
            if node.is_mounted() {
                into.push(node_ref);
            }
        }
        for child in node.children() {
            Self::collect_components(child, into);
        }
    }

    fn find<C: Component>(node: &Ui) -> Option<&C> {
        if let Ui::Component(component) = node {
            if let Some(found) = component.component().downcast_ref::<C>() {
                return Some(found);
            }
        }
        node.children().iter().find_map(Self::find::<C>)
    }
}

#[derive(Default)]
struct Queue {
    immediate: VecDeque<Dispatch>,
    deferred: VecDeque<Dispatch>,
    dirty: HashMap<NodeId, usize>,
}

type Wake = Arc<dyn Fn() + Send + Sync + 'static>;

struct Body {
    node: NodeRef,
    native: NativeHandle,
}

pub(crate) struct DispatcherInner {
    document: Arc<dyn Document>,
    tree: Mutex<Tree>,
    queue: Mutex<Queue>,
    processing: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
    actions: ActionManager,
    states: StateStore,
    router: Arc<Router>,
    tasks: Arc<TaskTracker>,
    spawner: Arc<dyn TaskSpawner>,
    local_storage: Arc<dyn BrowserStorage>,
    session_storage: Arc<dyn BrowserStorage>,
    runs_in_server: bool,
    not_found: Factory,
    body: OnceLock<Body>,
    wake: RwLock<Option<Wake>>,
}

/// Weak reference from a mounted node to its dispatcher.
#[derive(Clone)]
pub(crate) struct DispatcherHandle(Weak<DispatcherInner>);

impl DispatcherHandle {
    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Builder for a [`Dispatcher`].
pub struct DispatcherConfig {
    document: Option<Arc<dyn Document>>,
    spawner: Arc<dyn TaskSpawner>,
    router: Arc<Router>,
    actions: Option<Arc<ActionRegistry>>,
    local_storage: Arc<dyn BrowserStorage>,
    session_storage: Arc<dyn BrowserStorage>,
    runs_in_server: bool,
    not_found: Factory,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            document: None,
            spawner: Arc::new(ThreadSpawner),
            router: Arc::new(Router::new()),
            actions: None,
            local_storage: Arc::new(MemoryStorage::new()),
            session_storage: Arc::new(MemoryStorage::new()),
            runs_in_server: false,
            not_found: Arc::new(|| component(NotFound)),
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document the tree is mounted into. Defaults to a fresh
    /// [`MemoryDocument`].
    pub fn with_document(mut self, document: Arc<dyn Document>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_router(mut self, router: Arc<Router>) -> Self {
        self.router = router;
        self
    }

    /// Handlers registered up front. They run asynchronously for as long as
    /// the dispatcher is open.
    pub fn with_actions(mut self, actions: Arc<ActionRegistry>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn with_local_storage(mut self, storage: Arc<dyn BrowserStorage>) -> Self {
        self.local_storage = storage;
        self
    }

    pub fn with_session_storage(mut self, storage: Arc<dyn BrowserStorage>) -> Self {
        self.session_storage = storage;
        self
    }

    pub fn runs_in_server(mut self, runs_in_server: bool) -> Self {
        self.runs_in_server = runs_in_server;
        self
    }

    /// UI shown by [`Dispatcher::navigate`] when no route matches.
    pub fn with_not_found(mut self, factory: impl Fn() -> Ui + Send + Sync + 'static) -> Self {
        self.not_found = Arc::new(factory);
        self
    }

    pub fn build(self) -> Dispatcher {
        let inner = Arc::new(DispatcherInner {
            document: self
                .document
                .unwrap_or_else(|| Arc::new(MemoryDocument::new())),
            tree: Mutex::new(Tree {
                root: elem("body").into(),
            }),
            queue: Mutex::new(Queue::default()),
            processing: Mutex::new(()),
            owner: Mutex::new(None),
            actions: ActionManager::default(),
            states: StateStore::default(),
            router: self.router,
            tasks: Arc::new(TaskTracker::default()),
            spawner: self.spawner,
            local_storage: self.local_storage,
            session_storage: self.session_storage,
            runs_in_server: self.runs_in_server,
            not_found: self.not_found,
            body: OnceLock::new(),
            wake: RwLock::new(None),
        });
        let dispatcher = Dispatcher { inner };
        dispatcher.mount_body();
        if let Some(registry) = self.actions {
            dispatcher.adopt_registry(&registry);
        }
        dispatcher
    }
}

impl fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("custom_document", &self.document.is_some())
            .field("router", &self.router)
            .field("runs_in_server", &self.runs_in_server)
            .finish()
    }
}

/// Serialising owner of a UI tree. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct ProcessingGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    owner: &'a Mutex<Option<ThreadId>>,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Dispatcher with the default configuration.
    pub fn new() -> Self {
        DispatcherConfig::default().build()
    }

    pub fn builder() -> DispatcherConfig {
        DispatcherConfig::default()
    }

    pub(crate) fn weak_handle(&self) -> DispatcherHandle {
        DispatcherHandle(Arc::downgrade(&self.inner))
    }

    pub fn document(&self) -> &dyn Document {
        &*self.inner.document
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn local_storage(&self) -> &dyn BrowserStorage {
        &*self.inner.local_storage
    }

    pub fn session_storage(&self) -> &dyn BrowserStorage {
        &*self.inner.session_storage
    }

    pub fn runs_in_server(&self) -> bool {
        self.inner.runs_in_server
    }

    pub(crate) fn states(&self) -> &StateStore {
        &self.inner.states
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.inner.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mount_body(&self) {
        let mut tree = self.tree();
        if let Err(err) = tree.root.mount(self, None) {
            log::error!("mounting body failed: {err}");
            return;
        }
        if let (Some(node), Some(native)) = (tree.root.node_ref(), tree.root.native()) {
            let _ = self.inner.body.set(Body { node, native });
        }
    }

    fn adopt_registry(&self, registry: &ActionRegistry) {
        let Some(body) = self.body_ref() else {
            return;
        };
        for (name, handler_id, handler) in registry.drain() {
            self.inner.actions.handle(
                name,
                handler_id,
                Registration {
                    is_async: true,
                    source: body.clone(),
                    handler,
                },
            );
        }
    }

    /// Reference to the root `body` element.
    pub fn body_ref(&self) -> Option<NodeRef> {
        self.inner.body.get().map(|body| body.node.clone())
    }

    /// Native handle of the root `body` element.
    pub fn body_handle(&self) -> Option<NativeHandle> {
        self.inner.body.get().map(|body| body.native)
    }

    /// Context that is not attached to any component.
    pub fn context(&self, source: Option<NodeRef>) -> Context<'static> {
        Context::new(self.clone(), source, None)
    }

    /// Installs a hook called whenever work is queued.
    pub fn set_wake(&self, wake: impl Fn() + Send + Sync + 'static) {
        *self
            .inner
            .wake
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(wake));
    }

    pub fn clear_wake(&self) {
        *self
            .inner
            .wake
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let wake = self
            .inner
            .wake
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(wake) = wake {
            wake();
        }
    }

    /// Queues `dispatch`.
    pub fn dispatch(&self, dispatch: Dispatch) {
        {
            let mut queue = self.queue();
            match dispatch.mode {
                DispatchMode::Defer => queue.deferred.push_back(dispatch),
                DispatchMode::Update | DispatchMode::Next => queue.immediate.push_back(dispatch),
            }
        }
        self.wake();
    }

    pub fn update(
        &self,
        source: Option<NodeRef>,
        f: impl FnOnce(&mut Context<'_>) + Send + 'static,
    ) {
        self.dispatch(Dispatch::new(DispatchMode::Update, source, f));
    }

    pub fn defer(
        &self,
        source: Option<NodeRef>,
        f: impl FnOnce(&mut Context<'_>) + Send + 'static,
    ) {
        self.dispatch(Dispatch::new(DispatchMode::Defer, source, f));
    }

    pub fn next(
        &self,
        source: Option<NodeRef>,
        f: impl FnOnce(&mut Context<'_>) + Send + 'static,
    ) {
        self.dispatch(Dispatch::new(DispatchMode::Next, source, f));
    }

    /// Runs `f`, then re-renders every component enclosing `source`.
    pub fn emit(&self, source: NodeRef, f: impl FnOnce(&mut Context<'_>) + Send + 'static) {
        let mut dispatch = Dispatch::new(DispatchMode::Next, Some(source), f);
        dispatch.emit = true;
        self.dispatch(dispatch);
    }

    /// Runs `f` in the background. [`wait`](Self::wait) blocks until it
    /// returns.
    pub fn run_async(&self, f: impl FnOnce() + Send + 'static) {
        let guard = self.inner.tasks.start();
        self.inner.spawner.spawn(Box::new(move || {
            let _guard = guard;
            f();
        }));
    }

    /// Blocks until all background work, including work it started, is done.
    pub fn wait(&self) {
        self.inner.tasks.wait();
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`. Returns whether
    /// all work finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.tasks.wait_timeout(timeout)
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.pending()
    }

    /// Registers a handler for `name`, alive as long as `source` is mounted.
    pub fn handle<F>(&self, name: impl Into<String>, source: NodeRef, handler: F)
    where
        F: Fn(&mut Context<'_>, &Action) + Send + Sync + 'static,
    {
        self.register_handler(name, source, false, handler);
    }

    /// Same as [`handle`](Self::handle), running the handler in the
    /// background.
    pub fn handle_async<F>(&self, name: impl Into<String>, source: NodeRef, handler: F)
    where
        F: Fn(&mut Context<'_>, &Action) + Send + Sync + 'static,
    {
        self.register_handler(name, source, true, handler);
    }

    fn register_handler<F>(&self, name: impl Into<String>, source: NodeRef, is_async: bool, handler: F)
    where
        F: Fn(&mut Context<'_>, &Action) + Send + Sync + 'static,
    {
        let handler_id = std::any::TypeId::of::<F>();
        let handler: ActionHandler = Arc::new(handler);
        self.inner.actions.handle(
            name,
            handler_id,
            Registration {
                is_async,
                source,
                handler,
            },
        );
    }

    /// Schedules every live handler of `action`.
    pub fn post(&self, action: Action) {
        for registration in self.inner.actions.scheduled(&action) {
            let action = action.clone();
            let Registration {
                is_async,
                source,
                handler,
            } = registration;
            if is_async {
                let dispatcher = self.clone();
                self.run_async(move || {
                    let mut ctx = dispatcher.context(Some(source));
                    handler(&mut ctx, &action);
                });
            } else {
                self.update(Some(source), move |ctx| handler(ctx, &action));
            }
        }
    }

    /// Number of handlers registered for `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.inner.actions.count(name)
    }

    /// Drops handlers whose node was dismounted.
    pub fn close_unused_handlers(&self) {
        self.inner.actions.close_unused_handlers();
    }

    /// Stores `value` under `key` and notifies its observers.
    pub fn set_state<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: StateOptions,
    ) -> Result<(), StateError> {
        let value = state::encode(key, value)?;
        if options.is_persisted() {
            let persisted = PersistedState::new(value.clone(), options.ttl());
            let json = serde_json::to_string(&persisted).map_err(|source| StateError::Encode {
                key: key.to_owned(),
                source,
            })?;
            self.local_storage()
                .set_json(key, json)
                .map_err(|source| StateError::Persist {
                    key: key.to_owned(),
                    source,
                })?;
        }
        for (observer, value) in self.inner.states.set(key, value, options) {
            self.deliver(observer, value);
        }
        Ok(())
    }

    /// Returns the value stored under `key`, `None` when missing or expired.
    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        if let Some(value) = self.inner.states.get(key) {
            return state::decode(key, value).map(Some);
        }
        let Some(json) = self.local_storage().get_json(key) else {
            return Ok(None);
        };
        let persisted: PersistedState =
            serde_json::from_str(&json).map_err(|source| StateError::Decode {
                key: key.to_owned(),
                source,
            })?;
        if persisted.is_expired() {
            self.local_storage().del(key);
            return Ok(None);
        }
        let mut options = StateOptions::default().persist();
        if let Some(remaining) = persisted.remaining() {
            options = options.expires_in(remaining);
        }
        let value = persisted.value;
        for (observer, value) in self.inner.states.set(key, value.clone(), options) {
            self.deliver(observer, value);
        }
        state::decode(key, value).map(Some)
    }

    /// Removes the value under `key`, its observers and its persisted copy.
    pub fn del_state(&self, key: &str) {
        let persisted = self.inner.states.is_persisted(key);
        self.inner.states.del(key);
        if persisted || self.local_storage().get_json(key).is_some() {
            self.local_storage().del(key);
        }
    }

    /// Starts observing `key` on behalf of `source`.
    pub fn observe_state(&self, key: impl Into<String>, source: NodeRef) -> Observer {
        Observer::new(self.clone(), key, source)
    }

    pub fn observer_count(&self, key: &str) -> usize {
        self.inner.states.observer_count(key)
    }

    pub(crate) fn register_observer(&self, observer: ObserverEntry) {
        if let Some(value) = self.inner.states.observe(observer.clone()) {
            self.deliver(observer, value);
        }
    }

    fn deliver(&self, observer: ObserverEntry, value: serde_json::Value) {
        let source = observer.source().clone();
        self.update(Some(source), move |ctx| {
            if !observer.deliver(ctx, &value) {
                ctx.dispatcher()
                    .states()
                    .remove_observer(observer.key(), observer.id());
            }
        });
    }

    /// Makes `ui` the content of the body, patching what was there.
    pub fn mount(&self, ui: Ui) {
        self.dispatch(Dispatch::tree(None, move |dispatcher, tree| {
            let Ui::Element(body) = &mut tree.root else {
                return;
            };
            if let Err(err) = body.reconcile_children(dispatcher, vec![ui]) {
                log::error!("mounting root failed: {err}");
            }
        }));
    }

    /// Shows the UI routed at `path`, then calls `on_nav` on every component.
    pub fn navigate(&self, path: &str) {
        let ui = self.inner.router.create_component(path).unwrap_or_else(|| {
            log::debug!("no route for {path:?}");
            (self.inner.not_found)()
        });
        self.mount(ui);
        self.fan_out(Hook::Nav(path.to_owned()));
    }

    /// Calls `on_app_update` on every component.
    pub fn app_update(&self) {
        self.fan_out(Hook::AppUpdate);
    }

    /// Calls `on_app_install_change` on every component.
    pub fn app_install_change(&self) {
        self.fan_out(Hook::AppInstallChange);
    }

    /// Calls `on_resize` on every component.
    pub fn app_resize(&self) {
        self.fan_out(Hook::Resize);
    }

    /// Calls `on_pre_render` on every component.
    pub fn pre_render(&self) {
        self.fan_out(Hook::PreRender);
    }

    fn fan_out(&self, hook: Hook) {
        self.dispatch(Dispatch::tree(None, move |dispatcher, tree| {
            let mut components = Vec::new();
            Tree::collect_components(&tree.root, &mut components);
            for node in components {
                dispatcher.schedule_hook(node, hook.clone());
            }
        }));
    }

    pub(crate) fn schedule_hook(&self, node: NodeRef, hook: Hook) {
        self.update(Some(node), move |ctx| ctx.run_hook(&hook));
    }

    /// Reference to the node mounted in the body.
    pub fn root(&self) -> Option<NodeRef> {
        self.tree().root.children().first().and_then(Ui::node_ref)
    }

    /// Looks up the first component of type `C`, depth first, and passes it
    /// to `f`.
    ///
    /// Takes the tree lock: must not be called from a dispatch.
    pub fn inspect<C: Component, R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
        let tree = self.tree();
        Tree::find::<C>(&tree.root).map(f)
    }

    /// Whether nothing is queued.
    pub fn is_idle(&self) -> bool {
        let queue = self.queue();
        queue.immediate.is_empty() && queue.deferred.is_empty() && queue.dirty.is_empty()
    }

    fn begin_processing(&self) -> Option<ProcessingGuard<'_>> {
        let current = thread::current().id();
        let owner = || self.inner.owner.lock().unwrap_or_else(PoisonError::into_inner);
        if *owner() == Some(current) {
            return None;
        }
        let lock = self
            .inner
            .processing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *owner() = Some(current);
        Some(ProcessingGuard {
            _lock: lock,
            owner: &self.inner.owner,
        })
    }

    /// Executes the next piece of work. Returns `false` when there was none,
    /// or when called from within a dispatch.
    pub fn consume_next(&self) -> bool {
        let Some(_processing) = self.begin_processing() else {
            return false;
        };

        let immediate = self.queue().immediate.pop_front();
        if let Some(dispatch) = immediate {
            self.execute(dispatch);
            return true;
        }

        let dirty: Vec<(NodeId, usize)> = self.queue().dirty.drain().collect();
        if !dirty.is_empty() {
            self.render_dirty(dirty);
            return true;
        }

        let deferred = self.queue().deferred.pop_front();
        if let Some(dispatch) = deferred {
            self.execute(dispatch);
            return true;
        }
        false
    }

    /// Runs queued work until the dispatcher is quiescent, waiting for
    /// background work before each step.
    pub fn consume(&self) {
        loop {
            self.wait();
            if !self.consume_next() {
                break;
            }
        }
    }

    /// Finishes pending work, then dismounts the tree and drops handlers and
    /// states.
    pub fn close(&self) {
        self.consume();
        {
            let mut tree = self.tree();
            tree.root.dismount(self);
        }
        {
            let mut queue = self.queue();
            queue.immediate.clear();
            queue.deferred.clear();
            queue.dirty.clear();
        }
        self.inner.actions.close_unused_handlers();
        self.inner.actions.clear();
        self.inner.states.clear();
    }

    fn execute(&self, dispatch: Dispatch) {
        let Dispatch {
            mode,
            source,
            work,
            emit,
        } = dispatch;
        if let Some(source) = &source {
            if !source.is_mounted() {
                log::debug!("dropping {mode:?} dispatch: node {} is dismounted", source.id());
                return;
            }
        }

        let mut tree = self.tree();
        match work {
            Work::Tree(f) => f(self, &mut tree),
            Work::Run(f) => {
                let path = source.as_ref().and_then(|source| tree.path_to(source.id()));
                let component = path
                    .as_deref()
                    .and_then(|path| tree.enclosing_component_mut(path))
                    .map(ComponentNode::component_mut);
                let mut ctx = Context::new(self.clone(), source.clone(), component);
                f(&mut ctx);
            }
        }

        let Some(source) = source else {
            return;
        };
        if !emit && mode != DispatchMode::Update {
            return;
        }
        let Some(path) = tree.path_to(source.id()) else {
            return;
        };
        let mut components = tree.components_on(&path);
        if !emit {
            components = components.pop().into_iter().collect();
        }
        drop(tree);

        let mut queue = self.queue();
        for (id, depth) in components {
            let entry = queue.dirty.entry(id).or_insert(depth);
            *entry = (*entry).min(depth);
        }
    }

    fn render_dirty(&self, mut dirty: Vec<(NodeId, usize)>) {
        dirty.sort_by_key(|&(id, depth)| (depth, id));
        let mut tree = self.tree();
        for (id, _) in dirty {
            let Some(node) = tree.component_mut(id) else {
                continue;
            };
            if let Err(err) = node.render(self) {
                log::error!("rendering component {:?} failed: {err}", node.name());
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue();
        f.debug_struct("Dispatcher")
            .field("immediate", &queue.immediate.len())
            .field("deferred", &queue.deferred.len())
            .field("dirty", &queue.dirty.len())
            .field("runs_in_server", &self.inner.runs_in_server)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
