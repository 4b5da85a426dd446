//! Native document abstraction.
//!
//! UI nodes never touch a document directly; they go through the
//! [`Document`] trait, which hands out opaque [`NativeHandle`]s. A browser
//! binding would wrap DOM nodes, while [`MemoryDocument`] keeps an arena of
//! nodes in memory for server side rendering and tests.

use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::collections::map::HashMap;
use crate::collections::OrderedMap;
use crate::error::DocumentError;

/// Opaque reference to a node owned by a [`Document`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Operations UI nodes need from the native document.
pub trait Document: Send + Sync {
    fn create_element(&self, tag: &str) -> NativeHandle;

    fn create_text_node(&self, value: &str) -> NativeHandle;

    /// Replaces the content of `node` with the given markup.
    fn set_inner_html(&self, node: NativeHandle, html: &str) -> Result<(), DocumentError>;

    fn first_child(&self, node: NativeHandle) -> Option<NativeHandle>;

    fn parent_node(&self, node: NativeHandle) -> Option<NativeHandle>;

    /// Appends `child` to `parent`, detaching it from its current parent first.
    fn append_child(&self, parent: NativeHandle, child: NativeHandle) -> Result<(), DocumentError>;

    fn remove_child(&self, parent: NativeHandle, child: NativeHandle) -> Result<(), DocumentError>;

    /// Puts `new` at the position of `old` under `parent`.
    fn replace_child(
        &self,
        parent: NativeHandle,
        new: NativeHandle,
        old: NativeHandle,
    ) -> Result<(), DocumentError>;

    fn set_node_value(&self, node: NativeHandle, value: &str) -> Result<(), DocumentError>;

    fn set_attribute(&self, node: NativeHandle, name: &str, value: &str)
        -> Result<(), DocumentError>;

    fn remove_attribute(&self, node: NativeHandle, name: &str) -> Result<(), DocumentError>;

    /// Signals that no UI node refers to `node` anymore.
    fn release(&self, _node: NativeHandle) {}
}

enum Content {
    Element {
        tag: String,
        attributes: OrderedMap<String, String>,
        children: Vec<NativeHandle>,
    },
    Text(String),
    Raw(String),
}

struct MemoryNode {
    parent: Option<NativeHandle>,
    content: Content,
}

/// Live nodes by handle. Handles are never handed out twice, so a stale one
/// stays invalid once its node is released.
#[derive(Default)]
struct Arena {
    nodes: HashMap<NativeHandle, MemoryNode>,
    next: u64,
}

impl Arena {
    fn insert(&mut self, content: Content) -> NativeHandle {
        let handle = NativeHandle(self.next);
        self.next += 1;
        self.nodes.insert(
            handle,
            MemoryNode {
                parent: None,
                content,
            },
        );
        handle
    }

    fn get(&self, handle: NativeHandle) -> Result<&MemoryNode, DocumentError> {
        self.nodes
            .get(&handle)
            .ok_or(DocumentError::Missing(handle))
    }

    fn get_mut(&mut self, handle: NativeHandle) -> Result<&mut MemoryNode, DocumentError> {
        self.nodes
            .get_mut(&handle)
            .ok_or(DocumentError::Missing(handle))
    }

    fn children_mut(&mut self, handle: NativeHandle) -> Result<&mut Vec<NativeHandle>, DocumentError> {
        match &mut self.get_mut(handle)?.content {
            Content::Element { children, .. } => Ok(children),
            _ => Err(DocumentError::NotAnElement(handle)),
        }
    }

    fn detach(&mut self, child: NativeHandle) -> Result<(), DocumentError> {
        let Some(parent) = self.get(child)?.parent else {
            return Ok(());
        };
        if let Ok(children) = self.children_mut(parent) {
            children.retain(|c| *c != child);
        }
        self.get_mut(child)?.parent = None;
        Ok(())
    }
}

/// In-memory [`Document`] backed by an arena of nodes.
#[derive(Default)]
pub struct MemoryDocument {
    arena: Mutex<Arena>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, node: NativeHandle) -> bool {
        self.lock().get(node).is_ok()
    }

    pub fn children(&self, node: NativeHandle) -> Vec<NativeHandle> {
        match self.lock().get(node).map(|n| &n.content) {
            Ok(Content::Element { children, .. }) => children.clone(),
            _ => Vec::new(),
        }
    }

    pub fn tag(&self, node: NativeHandle) -> Option<String> {
        match self.lock().get(node).map(|n| &n.content) {
            Ok(Content::Element { tag, .. }) => Some(tag.clone()),
            _ => None,
        }
    }

    /// Value of a text node, or the markup held by a raw node.
    pub fn node_value(&self, node: NativeHandle) -> Option<String> {
        match self.lock().get(node).map(|n| &n.content) {
            Ok(Content::Text(value)) | Ok(Content::Raw(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NativeHandle, name: &str) -> Option<String> {
        match self.lock().get(node).map(|n| &n.content) {
            Ok(Content::Element { attributes, .. }) => attributes.get(name).cloned(),
            _ => None,
        }
    }

    /// Serializes the subtree rooted at `node` into HTML-like markup.
    pub fn markup(&self, node: NativeHandle) -> String {
        let arena = self.lock();
        let mut output = String::new();
        write_markup(&arena, &mut output, node);
        output
    }

    pub fn dump_tree(&self, root: Option<NativeHandle>) -> String {
        let arena = self.lock();
        let mut output = String::new();
        match root {
            Some(root) => dump_node(&arena, &mut output, root, 0),
            None => output.push_str("(no root)\n"),
        }
        output
    }
}

fn write_markup(arena: &Arena, output: &mut String, node: NativeHandle) {
    let Ok(node) = arena.get(node) else {
        return;
    };
    match &node.content {
        Content::Element {
            tag,
            attributes,
            children,
        } => {
            let _ = write!(output, "<{tag}");
            for (name, value) in attributes {
                let _ = write!(output, " {name}=\"{}\"", escape(value));
            }
            output.push('>');
            for child in children {
                write_markup(arena, output, *child);
            }
            let _ = write!(output, "</{tag}>");
        }
        Content::Text(value) => output.push_str(&escape(value)),
        Content::Raw(html) => output.push_str(html),
    }
}

fn dump_node(arena: &Arena, output: &mut String, handle: NativeHandle, depth: usize) {
    let indent = "  ".repeat(depth);
    match arena.get(handle).map(|n| &n.content) {
        Ok(Content::Element { tag, children, .. }) => {
            let _ = writeln!(output, "{indent}[{}] <{tag}>", handle.0);
            for child in children {
                dump_node(arena, output, *child, depth + 1);
            }
        }
        Ok(Content::Text(value)) => {
            let _ = writeln!(output, "{indent}[{}] {value:?}", handle.0);
        }
        Ok(Content::Raw(html)) => {
            let _ = writeln!(output, "{indent}[{}] raw {html:?}", handle.0);
        }
        Err(_) => {
            let _ = writeln!(output, "{indent}[{}] (missing)", handle.0);
        }
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl Document for MemoryDocument {
    fn create_element(&self, tag: &str) -> NativeHandle {
        self.lock().insert(Content::Element {
            tag: tag.to_owned(),
            attributes: OrderedMap::default(),
            children: Vec::new(),
        })
    }

    fn create_text_node(&self, value: &str) -> NativeHandle {
        self.lock().insert(Content::Text(value.to_owned()))
    }

    fn set_inner_html(&self, node: NativeHandle, html: &str) -> Result<(), DocumentError> {
        let mut arena = self.lock();
        let previous = std::mem::take(arena.children_mut(node)?);
        for child in previous {
            if let Ok(child) = arena.get_mut(child) {
                child.parent = None;
            }
        }
        if html.is_empty() {
            return Ok(());
        }
        let raw = arena.insert(Content::Raw(html.to_owned()));
        arena.get_mut(raw)?.parent = Some(node);
        arena.children_mut(node)?.push(raw);
        Ok(())
    }

    fn first_child(&self, node: NativeHandle) -> Option<NativeHandle> {
        match self.lock().get(node).map(|n| &n.content) {
            Ok(Content::Element { children, .. }) => children.first().copied(),
            _ => None,
        }
    }

    fn parent_node(&self, node: NativeHandle) -> Option<NativeHandle> {
        self.lock().get(node).ok().and_then(|n| n.parent)
    }

    fn append_child(&self, parent: NativeHandle, child: NativeHandle) -> Result<(), DocumentError> {
        let mut arena = self.lock();
        arena.children_mut(parent)?;
        arena.detach(child)?;
        arena.children_mut(parent)?.push(child);
        arena.get_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn remove_child(&self, parent: NativeHandle, child: NativeHandle) -> Result<(), DocumentError> {
        let mut arena = self.lock();
        if arena.get(child)?.parent != Some(parent) {
            return Err(DocumentError::NotAChild { parent, child });
        }
        arena.detach(child)
    }

    fn replace_child(
        &self,
        parent: NativeHandle,
        new: NativeHandle,
        old: NativeHandle,
    ) -> Result<(), DocumentError> {
        let mut arena = self.lock();
        if arena.get(old)?.parent != Some(parent) {
            return Err(DocumentError::NotAChild { parent, child: old });
        }
        arena.detach(new)?;
        let children = arena.children_mut(parent)?;
        let Some(index) = children.iter().position(|c| *c == old) else {
            return Err(DocumentError::NotAChild { parent, child: old });
        };
        children[index] = new;
        arena.get_mut(old)?.parent = None;
        arena.get_mut(new)?.parent = Some(parent);
        Ok(())
    }

    fn set_node_value(&self, node: NativeHandle, value: &str) -> Result<(), DocumentError> {
        match &mut self.lock().get_mut(node)?.content {
            Content::Text(current) | Content::Raw(current) => {
                *current = value.to_owned();
                Ok(())
            }
            Content::Element { .. } => Err(DocumentError::NotAnElement(node)),
        }
    }

    fn set_attribute(
        &self,
        node: NativeHandle,
        name: &str,
        value: &str,
    ) -> Result<(), DocumentError> {
        match &mut self.lock().get_mut(node)?.content {
            Content::Element { attributes, .. } => {
                attributes.insert(name.to_owned(), value.to_owned());
                Ok(())
            }
            _ => Err(DocumentError::NotAnElement(node)),
        }
    }

    fn remove_attribute(&self, node: NativeHandle, name: &str) -> Result<(), DocumentError> {
        match &mut self.lock().get_mut(node)?.content {
            Content::Element { attributes, .. } => {
                attributes.shift_remove(name);
                Ok(())
            }
            _ => Err(DocumentError::NotAnElement(node)),
        }
    }

    fn release(&self, node: NativeHandle) {
        let mut arena = self.lock();
        if arena.detach(node).is_err() {
            return;
        }
        arena.nodes.remove(&node);
    }
}

#[cfg(test)]
#[path = "tests/document_tests.rs"]
mod tests;
