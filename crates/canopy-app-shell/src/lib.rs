//! Turns routed pages into HTML on the server and memoizes the result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use canopy_cache::{PreRenderCache, PreRenderLru, PreRenderMap, PreRenderedItem};
use canopy_core::{
    ActionRegistry, Dispatcher, Document, DocumentError, MemoryDocument, Router, TaskSpawner,
};
use canopy_runtime_std::ThreadPool;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("server dispatcher has no body")]
    NoBody,
    #[error("building page for {path:?} failed: {source}")]
    Page {
        path: String,
        #[source]
        source: DocumentError,
    },
}

/// Settings of a [`PreRenderer`].
pub struct PreRenderConfig {
    router: Arc<Router>,
    actions: Option<Arc<ActionRegistry>>,
    cache: Option<Arc<dyn PreRenderCache>>,
    spawner: Option<Arc<dyn TaskSpawner>>,
    workers: usize,
    wait_timeout: Option<Duration>,
    lang: String,
    title: String,
}

impl PreRenderConfig {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            actions: None,
            cache: None,
            spawner: None,
            workers: DEFAULT_WORKERS,
            wait_timeout: None,
            lang: "en".into(),
            title: String::new(),
        }
    }

    /// Handlers installed in every server dispatcher.
    pub fn with_actions(mut self, actions: Arc<ActionRegistry>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn PreRenderCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Caches pages in a [`PreRenderLru`] of `max_size` bytes.
    pub fn with_lru(self, max_size: usize, item_ttl: Duration) -> Self {
        self.with_cache(Arc::new(PreRenderLru::new(max_size, item_ttl)))
    }

    /// Runs background work on `spawner` instead of the shell's own pool.
    pub fn with_spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Size of the shell's own pool.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Bounds how long a page waits for its background work. Pages are
    /// rendered as they are when it runs out.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Renders pages through a server-side dispatcher.
///
/// Each call to [`render`](Self::render) either returns the cached page for
/// the path or builds a fresh dispatcher over a [`MemoryDocument`], navigates
/// to the path, runs the pre-render hooks and waits for the background work
/// they start before serializing the body.
pub struct PreRenderer {
    router: Arc<Router>,
    actions: Option<Arc<ActionRegistry>>,
    cache: Arc<dyn PreRenderCache>,
    spawner: Arc<dyn TaskSpawner>,
    wait_timeout: Option<Duration>,
    lang: String,
    title: String,
    renders: AtomicUsize,
}

impl PreRenderer {
    pub fn new(config: PreRenderConfig) -> Self {
        let PreRenderConfig {
            router,
            actions,
            cache,
            spawner,
            workers,
            wait_timeout,
            lang,
            title,
        } = config;
        let cache = cache.unwrap_or_else(|| Arc::new(PreRenderMap::default()));
        let spawner = spawner.unwrap_or_else(|| Arc::new(ThreadPool::new(workers)));
        Self {
            router,
            actions,
            cache,
            spawner,
            wait_timeout,
            lang,
            title,
            renders: AtomicUsize::new(0),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Number of pages built so far, cache hits excluded.
    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::Relaxed)
    }

    /// Returns the page for `path`, from the cache when possible.
    pub fn render(&self, path: &str) -> Result<PreRenderedItem, ShellError> {
        let path = normalize(path);
        if let Some(item) = self.cache.get(path) {
            log::debug!("serving {path:?} from the pre-render cache");
            return Ok(item);
        }

        let started = Instant::now();
        let item = self.build(path)?;
        self.renders.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "pre-rendered {path:?} ({} bytes) in {:?}",
            item.body.len(),
            started.elapsed()
        );
        self.cache.set(item.clone());
        Ok(item)
    }

    fn build(&self, path: &str) -> Result<PreRenderedItem, ShellError> {
        let document = Arc::new(MemoryDocument::new());
        let mut config = Dispatcher::builder()
            .with_document(document.clone())
            .with_router(Arc::clone(&self.router))
            .with_spawner(Arc::clone(&self.spawner))
            .runs_in_server(true);
        if let Some(actions) = &self.actions {
            config = config.with_actions(Arc::clone(actions));
        }
        let dispatcher = config.build();

        dispatcher.navigate(path);
        let mut settled = self.settle(&dispatcher);
        if settled {
            dispatcher.pre_render();
            settled = self.settle(&dispatcher);
        }

        let body = dispatcher.body_handle().ok_or(ShellError::NoBody)?;
        let html = self
            .page(&document, body)
            .map_err(|source| ShellError::Page {
                path: path.to_owned(),
                source,
            })?;
        if settled {
            dispatcher.close();
        } else {
            log::warn!(
                "{path:?} rendered with {} background tasks still running",
                dispatcher.pending_tasks()
            );
        }

        Ok(PreRenderedItem::new(path, html.into_bytes()).with_content_type(HTML_CONTENT_TYPE))
    }

    /// Consumes the dispatcher. Returns `false` when the wait timed out.
    fn settle(&self, dispatcher: &Dispatcher) -> bool {
        let Some(timeout) = self.wait_timeout else {
            dispatcher.consume();
            return true;
        };
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if !dispatcher.wait_timeout(left) {
                return false;
            }
            if !dispatcher.consume_next() {
                return true;
            }
        }
    }

    fn page(
        &self,
        document: &MemoryDocument,
        body: canopy_core::NativeHandle,
    ) -> Result<String, DocumentError> {
        let html = document.create_element("html");
        document.set_attribute(html, "lang", &self.lang)?;
        let head = document.create_element("head");
        if !self.title.is_empty() {
            let title = document.create_element("title");
            let value = document.create_text_node(&self.title);
            document.append_child(title, value)?;
            document.append_child(head, title)?;
        }
        document.append_child(html, head)?;
        document.append_child(html, body)?;
        Ok(format!("<!DOCTYPE html>\n{}", document.markup(html)))
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

#[cfg(test)]
#[path = "tests/shell_tests.rs"]
mod tests;
