//! # Errors
//!
//! Error types for every stage of the editing and compilation pipeline.
//!
//! Validation and generation problems are *not* errors in this sense: they are
//! recorded on the offending node (see [`crate::validation`]) and surface as a
//! failed [`crate::CompilationResult`]. Runtime faults surface as
//! [`crate::RuntimeEvent::Fault`].

use crate::graph::{NodeId, PinDirection};
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a document on disk into a graph.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read graph document '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse graph document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("graph document version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("duplicate node id {0} in graph document")]
    DuplicateNode(NodeId),

    #[error("node registry must be initialized before a graph is loaded")]
    RegistryNotReady,
}

/// Failure to persist a graph document.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to write graph document '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize graph document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A mutation request the graph refused. The graph is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("pin '{pin}' not found on node {node}")]
    PinNotFound { node: NodeId, pin: String },

    #[error("pin '{pin}' on node {node} is an {found:?} pin")]
    WrongDirection {
        node: NodeId,
        pin: String,
        found: PinDirection,
    },

    #[error("no node ids left to allocate")]
    IdSpaceExhausted,
}

/// Illegal request to the execution controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("no compiled program loaded")]
    NoProgram,

    #[error("execution requires a tokio runtime")]
    NoRuntime,

    #[error("generated script failed to parse: {0}")]
    Script(String),
}

/// Errors surfaced by [`crate::EditorSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("compilation failed at node {node}: {message}")]
    Compile { node: NodeId, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}
