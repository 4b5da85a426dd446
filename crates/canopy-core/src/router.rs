//! Path to component routing.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regex::Regex;

use crate::collections::map::HashMap;
use crate::component::{component, Component};
use crate::element::elem;
use crate::error::RouteError;
use crate::node::Ui;

/// Builds the UI for a route. Called on every lookup, so each navigation gets
/// a fresh instance.
pub type Factory = Arc<dyn Fn() -> Ui + Send + Sync + 'static>;

#[derive(Default)]
struct Routes {
    exact: HashMap<String, Factory>,
    patterns: Vec<(Regex, Factory)>,
}

/// Route table mapping paths to component factories.
///
/// Exact paths win over patterns; patterns are tried in registration order.
#[derive(Default)]
pub struct Router {
    routes: RwLock<Routes>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Routes> {
        self.routes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Routes> {
        self.routes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes `path` to the UI built by `factory`.
    pub fn route(&self, path: impl Into<String>, factory: impl Fn() -> Ui + Send + Sync + 'static) {
        self.write().exact.insert(path.into(), Arc::new(factory));
    }

    /// Routes `path` to a default constructed `C`.
    pub fn route_default<C: Component + Default>(&self, path: impl Into<String>) {
        self.route(path, || component(C::default()));
    }

    /// Routes every path matching `pattern` to the UI built by `factory`.
    pub fn route_with_regexp(
        &self,
        pattern: &str,
        factory: impl Fn() -> Ui + Send + Sync + 'static,
    ) -> Result<(), RouteError> {
        let regex = Regex::new(pattern).map_err(|source| RouteError {
            pattern: pattern.to_owned(),
            source,
        })?;
        self.write().patterns.push((regex, Arc::new(factory)));
        Ok(())
    }

    /// Builds a fresh UI for `path`, or `None` when no route matches.
    pub fn create_component(&self, path: &str) -> Option<Ui> {
        let factory = {
            let routes = self.read();
            routes.exact.get(path).cloned().or_else(|| {
                routes
                    .patterns
                    .iter()
                    .find(|(regex, _)| regex.is_match(path))
                    .map(|(_, factory)| Arc::clone(factory))
            })
        }?;
        Some(factory())
    }

    /// Number of exact and pattern routes.
    pub fn len(&self) -> usize {
        let routes = self.read();
        routes.exact.len() + routes.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes = self.read();
        f.debug_struct("Router")
            .field("exact", &routes.exact.len())
            .field(
                "patterns",
                &routes
                    .patterns
                    .iter()
                    .map(|(regex, _)| regex.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Page shown when no route matches.
#[derive(Clone, Debug, Default)]
pub struct NotFound;

impl Component for NotFound {
    fn render(&self) -> Ui {
        elem("div")
            .attr("class", "canopy-not-found")
            .body([elem("h1").text("404").into(), elem("p").text("Not Found").into()])
            .into()
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
