//! Error types for the dispatcher boundary.

use crate::NodeId;
use thiserror::Error;

/// Errors surfaced by the dispatcher's public API and by node handlers.
///
/// Structural violations raised inside a handler are caught by the worker
/// loop and logged; the same errors raised through the driver-facing API are
/// returned to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} is already registered")]
    DuplicateNode(NodeId),

    #[error("node {src} has no link to node {dst}")]
    NoLink { src: NodeId, dst: NodeId },

    #[error("no node id at or above {0}")]
    NoSuccessorId(NodeId),

    #[error("id space saturated: {registered} nodes in [0, {max_id})")]
    IdSpaceSaturated { registered: usize, max_id: NodeId },

    #[error("no nodes registered")]
    EmptyRegistry,

    #[error("edge endpoint {0} is out of range")]
    InvalidEdge(NodeId),

    #[error("failed to spawn worker thread")]
    WorkerSpawn(#[from] std::io::Error),
}
