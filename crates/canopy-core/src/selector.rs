//! Conditional and loop blocks.
//!
//! Selectors are resolved when they are built: they only hold the nodes of the
//! branch or iterations that were selected, and their parent expands them
//! before mounting. They are never mounted themselves.

use crate::node::{flatten, Ui};

pub struct Selector {
    name: &'static str,
    children: Vec<Ui>,
}

impl Selector {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn children(&self) -> &[Ui] {
        &self.children
    }

    pub(crate) fn into_children(self) -> Vec<Ui> {
        self.children
    }
}

/// `if` / `else if` / `else` chain evaluated once, at build time.
pub struct If {
    satisfied: bool,
    children: Vec<Ui>,
}

impl If {
    pub fn new(expr: bool, elems: impl IntoIterator<Item = Ui>) -> Self {
        Self {
            satisfied: expr,
            children: if expr { flatten(elems) } else { Vec::new() },
        }
    }

    /// Takes `elems` when no previous branch was taken and `expr` holds.
    pub fn else_if(mut self, expr: bool, elems: impl IntoIterator<Item = Ui>) -> Self {
        if !self.satisfied && expr {
            self.children = flatten(elems);
            self.satisfied = true;
        }
        self
    }

    pub fn else_(self, elems: impl IntoIterator<Item = Ui>) -> Self {
        self.else_if(true, elems)
    }
}

impl From<If> for Ui {
    fn from(condition: If) -> Self {
        Ui::Selector(Selector {
            name: "if.else",
            children: condition.children,
        })
    }
}

/// Loop blocks.
pub struct Range;

impl Range {
    /// Calls `f` for each index in `0..len`.
    pub fn slice(len: usize, f: impl FnMut(usize) -> Ui) -> Ui {
        Self::selector(flatten((0..len).map(f)))
    }

    /// Calls `f` for each key of `source`, in lexical order.
    pub fn map<K, V>(source: impl IntoIterator<Item = (K, V)>, mut f: impl FnMut(&str) -> Ui) -> Ui
    where
        K: AsRef<str>,
    {
        let mut keys: Vec<K> = source.into_iter().map(|(key, _)| key).collect();
        keys.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
        Self::selector(flatten(keys.iter().map(|key| f(key.as_ref()))))
    }

    fn selector(children: Vec<Ui>) -> Ui {
        Ui::Selector(Selector {
            name: "range",
            children,
        })
    }
}

#[cfg(test)]
#[path = "tests/selector_tests.rs"]
mod tests;
