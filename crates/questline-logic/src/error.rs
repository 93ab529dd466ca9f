//! Error types surfaced by the engine.
//!
//! Most malformed input degrades gracefully (a warning is logged and the
//! offending record is treated as satisfied). Only caller bugs and failed
//! store writes become errors.

/// Graph query errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Traversal requested on an id that was never merged.
    NodeNotFound(String),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::NodeNotFound(id) => write!(f, "Node not found: {}", id),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors reported by a [`ProgressStore`](crate::progress::ProgressStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store refused the patch (e.g. an update with an empty id).
    Rejected(String),
    /// The backing store could not be reached or written.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Rejected(reason) => write!(f, "Patch rejected: {}", reason),
            StoreError::Unavailable(reason) => write!(f, "Store unavailable: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

/// Top-level engine error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Graph(GraphError),
    /// A patch could not be applied. The whole batch must be treated as
    /// not applied.
    ProgressUpdateFailed(StoreError),
}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        EngineError::Graph(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::ProgressUpdateFailed(e)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Graph(e) => write!(f, "Graph error: {}", e),
            EngineError::ProgressUpdateFailed(e) => {
                write!(f, "Failed to update progress data: {}", e)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Graph(e) => Some(e),
            EngineError::ProgressUpdateFailed(e) => Some(e),
        }
    }
}
