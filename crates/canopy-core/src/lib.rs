#![doc = r"Component tree, dispatcher, actions and states for the Canopy UI runtime."]

pub mod action;
pub mod collections;
pub mod component;
pub mod context;
pub mod dispatcher;
pub mod document;
pub mod element;
pub mod error;
pub mod node;
pub mod platform;
pub mod raw;
pub mod router;
pub mod selector;
pub mod state;
pub mod storage;
pub mod text;

mod tasks;

pub use action::{Action, ActionBuilder, ActionHandler, ActionRegistry, Tags};
pub use component::{component, AsAny, Component, ComponentNode};
pub use context::Context;
pub use dispatcher::{Dispatch, DispatchMode, Dispatcher, DispatcherConfig};
pub use document::{Document, MemoryDocument, NativeHandle};
pub use element::{elem, ElementNode};
pub use error::{DocumentError, NodeError, RouteError, StateError, StorageError};
pub use node::{Kind, NodeId, NodeRef, Ui};
pub use platform::{InlineSpawner, Task, TaskSpawner, ThreadSpawner};
pub use raw::{raw, RawNode};
pub use router::{Factory, NotFound, Router};
pub use selector::{If, Range, Selector};
pub use state::{Observer, StateOptions};
pub use storage::{BrowserStorage, BrowserStorageExt, MemoryStorage};
pub use text::{text, TextNode};
