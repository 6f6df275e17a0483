//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the scenario engine (validation + queue build).
///
/// Per-node failures never surface here — they become failed steps in
/// the run result. Only faults that prevent a run from starting (or a
/// graph from being walked at all) use this type.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Graph validation errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the graph.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// The graph has no start node.
    #[error("scenario graph has no start node")]
    NoStartNode,

    /// The graph has more than one start node.
    #[error("scenario graph has {0} start nodes, expected exactly one")]
    MultipleStartNodes(usize),

    /// The stored definition is not a parsable graph.
    #[error("invalid scenario definition: {0}")]
    InvalidDefinition(String),

    // ------ Queue build errors ------

    /// None of the requested scenario ids resolved.
    #[error("no requested scenario could be resolved")]
    EmptyQueue,

    /// The request named no devices.
    #[error("execution request names no devices")]
    NoDevices,

    // ------ Collaborator errors ------

    /// Persistence error from the store crate.
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
}
