//! Node roles and role sets.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Role a node plays in the cluster topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
    ExternalEtcd,
    ExternalLoadBalancer,
}

impl NodeRole {
    pub const ALL: [NodeRole; 4] = [
        NodeRole::ControlPlane,
        NodeRole::Worker,
        NodeRole::ExternalEtcd,
        NodeRole::ExternalLoadBalancer,
    ];

    /// Label value used by node agents to advertise this role.
    pub fn label_value(self) -> &'static str {
        match self {
            NodeRole::ControlPlane => "control-plane",
            NodeRole::Worker => "worker",
            NodeRole::ExternalEtcd => "external-etcd",
            NodeRole::ExternalLoadBalancer => "external-load-balancer",
        }
    }

    /// Control-plane and worker nodes host Kubernetes; the others are
    /// infrastructure around it.
    pub fn is_kubernetes(self) -> bool {
        matches!(self, NodeRole::ControlPlane | NodeRole::Worker)
    }

    fn bit(self) -> u8 {
        match self {
            NodeRole::ControlPlane => 0b0001,
            NodeRole::Worker => 0b0010,
            NodeRole::ExternalEtcd => 0b0100,
            NodeRole::ExternalLoadBalancer => 0b1000,
        }
    }
}

impl Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label_value())
    }
}

impl FromStr for NodeRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        NodeRole::ALL
            .into_iter()
            .find(|role| role.label_value().eq_ignore_ascii_case(value))
            .ok_or_else(|| ParseError::UnknownRole(value.to_string()))
    }
}

// ============================================================================
// Role Set - Copy (4-bit set)
// ============================================================================

/// Set of roles assigned to a single node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    pub fn empty() -> Self {
        Self(0)
    }

    /// Parses a comma-separated role label, e.g. `control-plane,worker`.
    ///
    /// Empty segments are ignored; an unknown role is an error.
    pub fn parse_label(label: &str) -> Result<Self, ParseError> {
        label
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .try_fold(Self::empty(), |set, segment| {
                Ok(set.with(segment.parse::<NodeRole>()?))
            })
    }

    #[must_use]
    pub fn with(self, role: NodeRole) -> Self {
        Self(self.0 | role.bit())
    }

    pub fn contains(&self, role: NodeRole) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if any role in the set hosts Kubernetes.
    pub fn is_kubernetes(&self) -> bool {
        self.iter().any(NodeRole::is_kubernetes)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeRole> + '_ {
        NodeRole::ALL.into_iter().filter(|role| self.contains(*role))
    }
}

impl FromIterator<NodeRole> for RoleSet {
    fn from_iter<I: IntoIterator<Item = NodeRole>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), RoleSet::with)
    }
}

impl Display for RoleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.iter().map(NodeRole::label_value).collect();
        write!(f, "{}", labels.join(","))
    }
}
