//! Error types for cluster management.

use std::fmt;
use thiserror::Error;

/// A failure reported by one node's own lifecycle operation.
#[derive(Debug)]
pub struct NodeFailure {
    /// Hostname of the node that failed.
    pub hostname: String,

    /// Error returned by the node.
    pub error: anyhow::Error,
}

impl NodeFailure {
    pub fn new(hostname: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            hostname: hostname.into(),
            error,
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.hostname, self.error)
    }
}

/// Which start hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    BeforeStart,
    AfterStart,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeStart => f.write_str("before-start"),
            Self::AfterStart => f.write_str("after-start"),
        }
    }
}

/// Cluster management errors.
#[derive(Error, Debug)]
pub enum Error {
    /// No node has the requested hostname.
    #[error("Node {hostname} not found; known hostnames: [{}]", .known.join(", "))]
    NodeNotFound { hostname: String, known: Vec<String> },

    /// No node has the requested IP.
    #[error("No node with ip {ip}; known ips: [{}]", .known.join(", "))]
    NodeIpNotFound { ip: String, known: Vec<String> },

    /// A search over the cluster found nothing on this evaluation.
    #[error("No {label} found")]
    NoMatchingNode { label: String },

    /// A predicate evaluated to false.
    #[error("Condition not met: {label}")]
    ConditionNotMet { label: String },

    /// Configuration error.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid node count.
    #[error("Invalid node count for prefix {prefix}: {count} (must be >= 1)")]
    InvalidNodeCount { prefix: String, count: usize },

    /// One or more nodes failed to start.
    #[error("{} node(s) failed to start: {}", .0.len(), join_failures(.0))]
    StartFailed(Vec<NodeFailure>),

    /// One or more nodes failed to stop.
    #[error("{} node(s) failed to stop: {}", .0.len(), join_failures(.0))]
    StopFailed(Vec<NodeFailure>),

    /// A start hook failed.
    #[error("{stage} hook failed: {error:#}")]
    Hook {
        stage: HookStage,
        error: anyhow::Error,
    },

    /// A deferred execution never succeeded.
    #[error("Gave up on {label} after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        last: Box<Error>,
    },

    /// Failure of an arbitrary operation wrapped in an execution.
    #[error(transparent)]
    Operation(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error is a lookup or search miss.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. } | Self::NodeIpNotFound { .. } | Self::NoMatchingNode { .. }
        )
    }

    /// Whether this error comes from builder or cluster configuration.
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_) | Self::InvalidNodeCount { .. }
        )
    }
}

fn join_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_known_hostnames() {
        let err = Error::NodeNotFound {
            hostname: "kafka-9".to_string(),
            known: vec!["kafka-0".to_string(), "kafka-1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Node kafka-9 not found; known hostnames: [kafka-0, kafka-1]"
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_start_failed_reports_every_node() {
        let err = Error::StartFailed(vec![
            NodeFailure::new("a-0", anyhow::anyhow!("port in use")),
            NodeFailure::new("a-2", anyhow::anyhow!("image missing")),
        ]);
        let message = err.to_string();
        assert!(message.starts_with("2 node(s) failed to start"));
        assert!(message.contains("a-0: port in use"));
        assert!(message.contains("a-2: image missing"));
    }

    #[test]
    fn test_classification() {
        assert!(Error::InvalidConfiguration("x".into()).is_invalid_configuration());
        assert!(
            Error::InvalidNodeCount {
                prefix: "p".into(),
                count: 0
            }
            .is_invalid_configuration()
        );
        assert!(!Error::ConditionNotMet { label: "x".into() }.is_not_found());
    }
}
