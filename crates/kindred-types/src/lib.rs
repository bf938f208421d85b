//! # kindred-types: Core types for `kindred`
//!
//! This crate contains shared types used across the `kindred` workspace:
//! - Node identity ([`NodeName`])
//! - Node roles ([`NodeRole`], [`RoleSet`])
//! - Versions ([`KubeVersion`], [`MinorVersion`])
//! - Cluster-wide settings values ([`IpFamily`])
//! - Join workflow vocabulary ([`DiscoveryMode`], [`JoinPhase`])

use std::fmt::{Debug, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod role;
mod version;

pub use role::{NodeRole, RoleSet};
pub use version::{KubeVersion, MinorVersion};

/// Errors produced while parsing `kindred` value types from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error(
        "unknown node role {0:?}, expected one of \
         [control-plane, worker, external-etcd, external-load-balancer]"
    )]
    UnknownRole(String),

    #[error("invalid version {input:?}: {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("unknown IP family {0:?}, expected ipv4 or ipv6")]
    UnknownIpFamily(String),
}

// ============================================================================
// Node Name - Clone (contains String, derived once per discovery)
// ============================================================================

/// Stable identity of a cluster node, e.g. `kind-control-plane2`.
///
/// Node names are derived from the agent that hosts the node and never change
/// within an invocation. Ordering is lexicographic and drives bootstrap
/// control-plane selection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<NodeName> for String {
    fn from(value: NodeName) -> Self {
        value.0
    }
}

// ============================================================================
// IP Family - Copy (simple enum, persisted in cluster settings)
// ============================================================================

/// Network IP family of the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl Display for IpFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpFamily::Ipv4 => write!(f, "ipv4"),
            IpFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

impl FromStr for IpFamily {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipv4" => Ok(IpFamily::Ipv4),
            "ipv6" => Ok(IpFamily::Ipv6),
            other => Err(ParseError::UnknownIpFamily(other.to_string())),
        }
    }
}

// ============================================================================
// Discovery Mode - Copy (selects the join configuration discovery section)
// ============================================================================

/// How a joining node discovers and trusts the cluster it joins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMode {
    /// Bootstrap token discovery against the API server endpoint.
    #[default]
    Token,
    /// Discovery through a kubeconfig file that embeds client certificates.
    ///
    /// The bootstrap control-plane's admin kubeconfig is copied to the joining
    /// node and used as the discovery file.
    FileWithEmbeddedClientCertificates,
}

impl Display for DiscoveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryMode::Token => write!(f, "token"),
            DiscoveryMode::FileWithEmbeddedClientCertificates => {
                write!(f, "file-with-embedded-client-certificates")
            }
        }
    }
}

// ============================================================================
// Join Phase - Copy (sub-phases of a phased kubeadm join)
// ============================================================================

/// Sub-phases of a phased join, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinPhase {
    Preflight,
    ControlPlanePrepare,
    KubeletStart,
    ControlPlaneJoin,
}

impl JoinPhase {
    /// Phases executed when joining a control-plane node.
    pub const CONTROL_PLANE: [JoinPhase; 4] = [
        JoinPhase::Preflight,
        JoinPhase::ControlPlanePrepare,
        JoinPhase::KubeletStart,
        JoinPhase::ControlPlaneJoin,
    ];

    /// Phases executed when joining a worker node.
    pub const WORKER: [JoinPhase; 2] = [JoinPhase::Preflight, JoinPhase::KubeletStart];

    /// Arguments following `kubeadm join` that select this phase.
    pub fn kubeadm_args(self) -> &'static [&'static str] {
        match self {
            JoinPhase::Preflight => &["phase", "preflight"],
            JoinPhase::ControlPlanePrepare => &["phase", "control-plane-prepare", "all"],
            JoinPhase::KubeletStart => &["phase", "kubelet-start"],
            JoinPhase::ControlPlaneJoin => &["phase", "control-plane-join", "all"],
        }
    }

    /// Whether preflight errors must be ignored for this phase.
    pub fn runs_preflight(self) -> bool {
        matches!(self, JoinPhase::Preflight)
    }

    /// Whether staged overlays and patches are passed to this phase.
    pub fn accepts_patches(self) -> bool {
        matches!(
            self,
            JoinPhase::ControlPlanePrepare | JoinPhase::ControlPlaneJoin
        )
    }
}

impl Display for JoinPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinPhase::Preflight => write!(f, "preflight"),
            JoinPhase::ControlPlanePrepare => write!(f, "control-plane-prepare"),
            JoinPhase::KubeletStart => write!(f, "kubelet-start"),
            JoinPhase::ControlPlaneJoin => write!(f, "control-plane-join"),
        }
    }
}
