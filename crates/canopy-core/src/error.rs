use crate::document::NativeHandle;
use crate::node::{Kind, Ui};

/// Failure of a node lifecycle transition.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("mounting {kind} {name:?} failed: already mounted")]
    AlreadyMounted { kind: Kind, name: String },
    #[error("{kind} {name:?} is not mountable")]
    NotMountable { kind: Kind, name: String },
    #[error("{kind} {name:?} cannot be updated")]
    NotUpdatable { kind: Kind, name: String },
    /// The candidate has to take the place of the node. The candidate is
    /// handed back so the owner can mount it.
    #[error("replacing {kind} {name:?}: {reason}")]
    Replace {
        kind: Kind,
        name: String,
        reason: &'static str,
        candidate: Box<Ui>,
    },
    #[error("component {name:?} renders {count} root elements")]
    MultipleRoots { name: String, count: usize },
    #[error("mounting {name:?} failed: {reason}")]
    Mount { name: String, reason: String },
    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl NodeError {
    pub fn is_replace(&self) -> bool {
        matches!(self, NodeError::Replace { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("node {0:?} does not exist")]
    Missing(NativeHandle),
    #[error("node {0:?} cannot have children")]
    NotAnElement(NativeHandle),
    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild {
        parent: NativeHandle,
        child: NativeHandle,
    },
    #[error("node {0:?} has no parent")]
    Detached(NativeHandle),
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("encoding state {key:?} failed: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("decoding state {key:?} failed: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("persisting state {key:?} failed: {source}")]
    Persist {
        key: String,
        #[source]
        source: StorageError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, thiserror::Error)]
#[error("invalid route pattern {pattern:?}: {source}")]
pub struct RouteError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}
