//! Error types for cluster management.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kindred_types::{IpFamily, KubeVersion, MinorVersion, NodeName, NodeRole};
use thiserror::Error;

use crate::agent::AgentError;

/// Cluster management errors.
///
/// Every node-scoped variant names the node it happened on. Errors are
/// `Clone` so a failed node can keep the error that stopped it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The discovered topology breaks a cluster invariant.
    #[error("invalid cluster topology: {0}")]
    InvariantViolation(String),

    /// A second node claims a role that admits only one node.
    #[error(
        "unable to add node {node} to the cluster: \
         a cluster can not have more than one node with role {role}"
    )]
    DuplicateRole { node: NodeName, role: NodeRole },

    /// An agent that can't be classified as a cluster node.
    #[error("node {node} is not a recognized cluster node: {reason}")]
    UnknownNode { node: NodeName, reason: String },

    /// A requested feature needs a newer kubeadm than the node has.
    #[error(
        "node {node}: {feature} can't be used with kubeadm older than {required} (found {found})"
    )]
    VersionSkew {
        node: NodeName,
        feature: &'static str,
        required: MinorVersion,
        found: KubeVersion,
    },

    /// The node did not report a version the workflow needs.
    #[error("node {node} does not report a {component} version")]
    UnknownVersion {
        node: NodeName,
        component: &'static str,
    },

    /// The node did not report an address in the cluster's IP family.
    #[error("node {node} has no {family} address")]
    MissingAddress { node: NodeName, family: IpFamily },

    /// A required container image is not preloaded on the node.
    #[error("node {node} is missing image {image}")]
    MissingImage { node: NodeName, image: String },

    /// Exec or copy through the node agent failed.
    #[error("node {node}: {operation} failed: {source}")]
    Agent {
        node: NodeName,
        operation: String,
        #[source]
        source: AgentError,
    },

    /// The node provider could not enumerate clusters or nodes.
    #[error("node provider failed to {operation}: {source}")]
    Provider {
        operation: String,
        #[source]
        source: AgentError,
    },

    /// The node answered, but with output that can't be understood.
    #[error("node {node}: unexpected output from {operation}: {message}")]
    UnexpectedOutput {
        node: NodeName,
        operation: String,
        message: String,
    },

    /// A readiness wait ran past its deadline.
    #[error("{target} did not become ready within {waited:?}")]
    ReadinessTimeout { target: String, waited: Duration },

    /// An `@`-selector outside the known set.
    #[error(
        "invalid node selector {selector:?}. Use one of [@all, @cp*, @cp1, @cpn, @w*, @lb, @etcd]"
    )]
    InvalidSelector { selector: String },

    /// A `selector:path` expression with more than one `:`.
    #[error("invalid nodes path {0:?}")]
    InvalidNodesPath(String),

    /// Reading or writing cluster settings on a node failed.
    #[error("failed to {operation} cluster settings on node {node}: {source}")]
    Settings {
        node: NodeName,
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// Local filesystem error while staging files for a node.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Name of the node the error is about, if it is node-scoped.
    pub fn node(&self) -> Option<&NodeName> {
        match self {
            Error::DuplicateRole { node, .. }
            | Error::UnknownNode { node, .. }
            | Error::VersionSkew { node, .. }
            | Error::UnknownVersion { node, .. }
            | Error::MissingAddress { node, .. }
            | Error::MissingImage { node, .. }
            | Error::Agent { node, .. }
            | Error::UnexpectedOutput { node, .. }
            | Error::Settings { node, .. } => Some(node),
            Error::InvariantViolation(_)
            | Error::ReadinessTimeout { .. }
            | Error::InvalidSelector { .. }
            | Error::InvalidNodesPath(_)
            | Error::Provider { .. }
            | Error::Io { .. } => None,
        }
    }
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;
