//! Cluster topology registry.
//!
//! A [`Cluster`] is built once per invocation by discovering the node agents
//! tagged with the cluster's name. Nodes are sorted by name so the bootstrap
//! control plane (the first control plane) is the same on every invocation.

use std::collections::BTreeSet;

use kindred_types::{NodeName, NodeRole};
use tracing::{debug, info};

use crate::agent::NodeProvider;
use crate::node::{JoinState, Node, NodeIndex};
use crate::settings::ClusterSettings;
use crate::{Error, Result};

/// An existing multi-node cluster and its derived role lists.
#[derive(Debug)]
pub struct Cluster {
    name: String,
    /// Cross-invocation settings; see [`Cluster::read_settings`].
    pub settings: ClusterSettings,
    nodes: Vec<Node>,
    kubernetes: Vec<NodeIndex>,
    control_planes: Vec<NodeIndex>,
    workers: Vec<NodeIndex>,
    external_etcd: Option<NodeIndex>,
    external_load_balancer: Option<NodeIndex>,
}

/// Names of every cluster known to the provider, sorted and de-duplicated.
pub fn list_clusters(provider: &dyn NodeProvider) -> Result<Vec<String>> {
    let names = provider.list_clusters().map_err(|source| Error::Provider {
        operation: "list clusters".to_string(),
        source,
    })?;
    Ok(names
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect())
}

/// Whether a cluster with the given name has any node.
pub fn is_known(provider: &dyn NodeProvider, name: &str) -> Result<bool> {
    Ok(list_clusters(provider)?.iter().any(|known| known == name))
}

impl Cluster {
    /// Discovers the nodes of `name` through the provider and classifies them.
    pub fn discover(provider: &dyn NodeProvider, name: &str) -> Result<Self> {
        debug!(cluster = name, "reading node list");
        let agents = provider.list_nodes(name).map_err(|source| Error::Provider {
            operation: format!("list nodes of cluster {name}"),
            source,
        })?;

        let nodes = agents
            .into_iter()
            .map(|agent| Node::from_agent(name, agent))
            .collect::<Result<Vec<_>>>()?;

        let cluster = Self::from_nodes(name, nodes)?;
        info!(
            cluster = name,
            nodes = cluster.nodes.len(),
            control_planes = cluster.control_planes.len(),
            workers = cluster.workers.len(),
            "cluster discovered"
        );
        Ok(cluster)
    }

    /// Builds a cluster from already classified nodes.
    ///
    /// Nodes are sorted by name before the role lists are derived.
    pub fn from_nodes(name: impl Into<String>, mut nodes: Vec<Node>) -> Result<Self> {
        nodes.sort_by(|a, b| a.name().cmp(b.name()));

        let mut cluster = Self {
            name: name.into(),
            settings: ClusterSettings::default(),
            nodes: Vec::with_capacity(nodes.len()),
            kubernetes: Vec::new(),
            control_planes: Vec::new(),
            workers: Vec::new(),
            external_etcd: None,
            external_load_balancer: None,
        };
        for node in nodes {
            cluster.add(node)?;
        }
        Ok(cluster)
    }

    /// Adds a node, filling the derived lists by role.
    fn add(&mut self, node: Node) -> Result<()> {
        let index = NodeIndex::new(self.nodes.len());
        debug!(cluster = %self.name, node = %node.name(), roles = %node.roles(), "adding node");

        if node.is_external_etcd() {
            if self.external_etcd.is_some() {
                return Err(Error::DuplicateRole {
                    node: node.name().clone(),
                    role: NodeRole::ExternalEtcd,
                });
            }
            self.external_etcd = Some(index);
        }

        if node.is_external_load_balancer() {
            if self.external_load_balancer.is_some() {
                return Err(Error::DuplicateRole {
                    node: node.name().clone(),
                    role: NodeRole::ExternalLoadBalancer,
                });
            }
            self.external_load_balancer = Some(index);
        }

        if node.is_kubernetes() {
            self.kubernetes.push(index);
        }
        if node.is_control_plane() {
            self.control_planes.push(index);
        }
        if node.is_worker() {
            self.workers.push(index);
        }

        self.nodes.push(node);
        Ok(())
    }

    /// Checks the cluster has a consistent set of nodes.
    pub fn validate(&self) -> Result<()> {
        if self.control_planes.is_empty() {
            return Err(Error::InvariantViolation(format!(
                "please add at least one node with role {:?}",
                NodeRole::ControlPlane.label_value()
            )));
        }

        if self.control_planes.len() > 1 && self.external_load_balancer.is_none() {
            return Err(Error::InvariantViolation(format!(
                "please add a node with role {:?} because in the cluster there are more than one \
                 node with role {:?}",
                NodeRole::ExternalLoadBalancer.label_value(),
                NodeRole::ControlPlane.label_value()
            )));
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.as_usize()]
    }

    pub fn index_of(&self, name: &NodeName) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .position(|n| n.name() == name)
            .map(NodeIndex::new)
    }

    /// Every node, including the external load balancer and etcd.
    pub fn all_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().collect()
    }

    /// Nodes hosting Kubernetes (control planes and workers).
    pub fn kubernetes_nodes(&self) -> Vec<&Node> {
        self.resolve(&self.kubernetes)
    }

    pub fn control_planes(&self) -> Vec<&Node> {
        self.resolve(&self.control_planes)
    }

    /// The first control plane by name; where `kubeadm init` runs.
    pub fn bootstrap_control_plane(&self) -> Option<&Node> {
        self.bootstrap_index().map(|i| self.node(i))
    }

    /// Every control plane except the bootstrap one.
    pub fn secondary_control_planes(&self) -> Vec<&Node> {
        self.resolve(self.secondary_control_plane_indices())
    }

    pub fn workers(&self) -> Vec<&Node> {
        self.resolve(&self.workers)
    }

    pub fn external_etcd(&self) -> Option<&Node> {
        self.external_etcd.map(|i| self.node(i))
    }

    pub fn external_load_balancer(&self) -> Option<&Node> {
        self.external_load_balancer.map(|i| self.node(i))
    }

    /// Holds a node back from automated workflows.
    ///
    /// Only a node that has not started joining can be held. Returns false
    /// if no node has that name or the node is past `Provisioned`.
    pub fn hold(&mut self, name: &NodeName) -> bool {
        let Some(index) = self.index_of(name) else {
            return false;
        };
        match self.node(index).state() {
            JoinState::Held => true,
            JoinState::Provisioned => {
                self.set_state(index, JoinState::Held);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn bootstrap_index(&self) -> Option<NodeIndex> {
        self.control_planes.first().copied()
    }

    pub(crate) fn secondary_control_plane_indices(&self) -> &[NodeIndex] {
        self.control_planes.get(1..).unwrap_or(&[])
    }

    pub(crate) fn worker_indices(&self) -> &[NodeIndex] {
        &self.workers
    }

    pub(crate) fn external_load_balancer_index(&self) -> Option<NodeIndex> {
        self.external_load_balancer
    }

    pub(crate) fn set_state(&mut self, index: NodeIndex, state: JoinState) {
        self.nodes[index.as_usize()].set_state(state);
    }

    fn resolve(&self, indices: &[NodeIndex]) -> Vec<&Node> {
        indices.iter().map(|i| self.node(*i)).collect()
    }
}
