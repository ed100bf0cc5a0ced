//! Synergos error types

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;
use crate::storage::StorageError;

/// Errors that can occur while coordinating a delegation hierarchy
#[derive(Debug, Error)]
pub enum SynergosError {
    /// Delegation would create a unit below the configured maximum depth
    #[error("delegation depth exceeded: {depth} (max: {max})")]
    DepthExceeded { depth: u32, max: u32 },

    /// Consumption ceiling reached for this run
    #[error("consumption budget exceeded: {used}/{budget}")]
    BudgetExceeded { used: u64, budget: u64 },

    /// Invocation name not in the operation menu
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Invocation arguments could not be parsed
    #[error("malformed invocation of `{operation}`: {reason}")]
    MalformedInvocation { operation: String, reason: String },

    /// The language-model client call failed
    #[error("language model call failed: {0}")]
    Upstream(#[from] LlmError),

    /// Storage boundary error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Node id already present in the session graph
    #[error("node already exists in session graph: {0}")]
    DuplicateNode(String),

    /// Edge names an endpoint that is not a recorded node
    #[error("edge {origin} -> {target} references unknown node `{missing}`")]
    DanglingEdge {
        origin: String,
        target: String,
        missing: String,
    },

    /// Session graph could not be written
    #[error("failed to persist session graph to {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },
}

/// Coarse classification of every failure the engine can report in-band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PathEscape,
    NotFound,
    NotAFile,
    NotADirectory,
    IoFailure,
    DepthExceeded,
    BudgetExceeded,
    UnknownOperation,
    MalformedInvocation,
    UpstreamFailure,
    DuplicateNode,
    DanglingEdge,
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SynergosError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SynergosError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            SynergosError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            SynergosError::UnknownOperation(_) => ErrorKind::UnknownOperation,
            SynergosError::MalformedInvocation { .. } => ErrorKind::MalformedInvocation,
            SynergosError::Upstream(_) => ErrorKind::UpstreamFailure,
            SynergosError::Storage(e) => e.kind(),
            SynergosError::DuplicateNode(_) => ErrorKind::DuplicateNode,
            SynergosError::DanglingEdge { .. } => ErrorKind::DanglingEdge,
            SynergosError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// Whether this error aborts the whole reasoning round rather than a
    /// single invocation
    pub fn aborts_round(&self) -> bool {
        matches!(
            self,
            SynergosError::DepthExceeded { .. }
                | SynergosError::BudgetExceeded { .. }
                | SynergosError::Upstream(_)
        )
    }

    /// Render the error as the text handed back to a caller in place of a result
    pub fn to_result_text(&self) -> String {
        format!("Error [{}]: {}", self.kind(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_maps_storage_errors() {
        let err: SynergosError = StorageError::NotFound("missing.txt".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.aborts_round());
    }

    #[test]
    fn test_ceiling_errors_abort_round() {
        let depth = SynergosError::DepthExceeded { depth: 4, max: 3 };
        let budget = SynergosError::BudgetExceeded { used: 10, budget: 10 };
        assert!(depth.aborts_round());
        assert!(budget.aborts_round());
        assert!(!SynergosError::UnknownOperation("x".into()).aborts_round());
    }

    #[test]
    fn test_result_text_carries_kind() {
        let err = SynergosError::DepthExceeded { depth: 4, max: 3 };
        assert_eq!(
            err.to_result_text(),
            "Error [DepthExceeded]: delegation depth exceeded: 4 (max: 3)"
        );
    }
}
