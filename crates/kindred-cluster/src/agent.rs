//! The node agent seam.
//!
//! Nodes are reached exclusively through a [`NodeAgent`]: something that can
//! run a command on the node, copy files in and out, and report the node's
//! labels and versions. A [`NodeProvider`] enumerates the agents that belong
//! to a cluster. Container runtimes, SSH hosts and the in-memory
//! [`sim`](crate::sim) fleet all plug in here.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use kindred_types::KubeVersion;
use thiserror::Error;

/// Failure reported by a node agent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AgentError {
    message: String,
}

impl AgentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// What a node agent reports about the node it hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMetadata {
    pub labels: BTreeMap<String, String>,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub kubernetes_version: Option<KubeVersion>,
    pub kubeadm_version: Option<KubeVersion>,
}

/// Blocking access to a single node.
pub trait NodeAgent: Debug + Send + Sync {
    /// Stable identity of the hosted node, e.g. the container name.
    fn name(&self) -> &str;

    /// Runs `command args...` on the node and returns its stdout.
    fn exec(&self, command: &str, args: &[String]) -> Result<String, AgentError>;

    /// Reports the node's labels, addresses and versions.
    fn inspect(&self) -> Result<NodeMetadata, AgentError>;

    /// Copies a local file to an absolute path on the node.
    fn copy_to(&self, local: &Path, remote: &str) -> Result<(), AgentError>;

    /// Copies a file from the node to a local path.
    fn copy_from(&self, remote: &str, local: &Path) -> Result<(), AgentError>;
}

/// Enumerates node agents by cluster.
pub trait NodeProvider {
    /// Names of every cluster that has at least one node, in any order.
    fn list_clusters(&self) -> Result<Vec<String>, AgentError>;

    /// Agents tagged with the given cluster name, in any order.
    fn list_nodes(&self, cluster: &str) -> Result<Vec<Arc<dyn NodeAgent>>, AgentError>;
}
