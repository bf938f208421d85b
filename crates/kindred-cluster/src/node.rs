//! Cluster nodes and their join state.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use kindred_types::{IpFamily, JoinPhase, KubeVersion, NodeName, NodeRole, RoleSet};
use tracing::debug;

use crate::agent::{NodeAgent, NodeMetadata};
use crate::constants::{CLUSTER_LABEL_KEY, HOLD_LABEL_KEY, ROLE_LABEL_KEY};
use crate::{Error, Result};

/// Position of a node inside its [`Cluster`](crate::Cluster).
///
/// Indices are assigned once, after nodes are sorted by name, and stay valid
/// for the lifetime of the cluster value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Where a node stands in the join workflow.
///
/// Control planes move through
/// `Provisioned → ArtifactsStaged → CertsProvisioned → ConfigRendered →
/// Joining → LoadBalancerUpdated → Ready`; workers skip the staging,
/// certificate and load-balancer states. Any step can end in `Failed`.
#[derive(Debug, Clone)]
pub enum JoinState {
    /// Discovered and eligible, nothing done yet.
    Provisioned,
    /// Held back from automated workflows.
    Held,
    ArtifactsStaged,
    CertsProvisioned,
    ConfigRendered,
    /// Running `kubeadm join`; `phase` is `None` for the composite command.
    Joining { phase: Option<JoinPhase> },
    LoadBalancerUpdated,
    Ready,
    /// Stopped by the error that interrupted the workflow.
    Failed(Box<Error>),
}

impl JoinState {
    pub fn is_ready(&self) -> bool {
        matches!(self, JoinState::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JoinState::Failed(_))
    }

    pub fn is_held(&self) -> bool {
        matches!(self, JoinState::Held)
    }

    /// The error that failed the node, if it failed.
    pub fn error(&self) -> Option<&Error> {
        match self {
            JoinState::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for JoinState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinState::Provisioned => write!(f, "provisioned"),
            JoinState::Held => write!(f, "held"),
            JoinState::ArtifactsStaged => write!(f, "artifacts-staged"),
            JoinState::CertsProvisioned => write!(f, "certs-provisioned"),
            JoinState::ConfigRendered => write!(f, "config-rendered"),
            JoinState::Joining { phase: None } => write!(f, "joining"),
            JoinState::Joining { phase: Some(phase) } => write!(f, "joining/{phase}"),
            JoinState::LoadBalancerUpdated => write!(f, "load-balancer-updated"),
            JoinState::Ready => write!(f, "ready"),
            JoinState::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// A node of a cluster, materialized from its agent.
#[derive(Debug, Clone)]
pub struct Node {
    name: NodeName,
    roles: RoleSet,
    ipv4: Option<String>,
    ipv6: Option<String>,
    kubernetes_version: Option<KubeVersion>,
    kubeadm_version: Option<KubeVersion>,
    state: JoinState,
    agent: Arc<dyn NodeAgent>,
}

impl Node {
    /// Inspects an agent and classifies the node it hosts.
    ///
    /// Agents that belong to another cluster, carry no role label, or carry an
    /// unknown role are rejected.
    pub fn from_agent(cluster: &str, agent: Arc<dyn NodeAgent>) -> Result<Self> {
        let name = NodeName::new(agent.name());
        let metadata = agent.inspect().map_err(|source| Error::Agent {
            node: name.clone(),
            operation: "inspect".to_string(),
            source,
        })?;

        Self::from_metadata(name, cluster, metadata, agent)
    }

    fn from_metadata(
        name: NodeName,
        cluster: &str,
        metadata: NodeMetadata,
        agent: Arc<dyn NodeAgent>,
    ) -> Result<Self> {
        let unknown = |reason: String| Error::UnknownNode {
            node: name.clone(),
            reason,
        };

        match metadata.labels.get(CLUSTER_LABEL_KEY) {
            Some(owner) if owner == cluster => {}
            Some(owner) => return Err(unknown(format!("belongs to cluster {owner:?}"))),
            None => return Err(unknown(format!("missing label {CLUSTER_LABEL_KEY}"))),
        }

        let role_label = metadata
            .labels
            .get(ROLE_LABEL_KEY)
            .ok_or_else(|| unknown(format!("missing label {ROLE_LABEL_KEY}")))?;
        let roles = RoleSet::parse_label(role_label).map_err(|e| unknown(e.to_string()))?;
        if roles.is_empty() {
            return Err(unknown(format!("empty label {ROLE_LABEL_KEY}")));
        }

        let held = metadata
            .labels
            .get(HOLD_LABEL_KEY)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Ok(Self {
            name,
            roles,
            ipv4: metadata.ipv4,
            ipv6: metadata.ipv6,
            kubernetes_version: metadata.kubernetes_version,
            kubeadm_version: metadata.kubeadm_version,
            state: if held {
                JoinState::Held
            } else {
                JoinState::Provisioned
            },
            agent,
        })
    }

    pub fn name(&self) -> &NodeName {
        &self.name
    }

    pub fn roles(&self) -> RoleSet {
        self.roles
    }

    pub fn is_control_plane(&self) -> bool {
        self.roles.contains(NodeRole::ControlPlane)
    }

    pub fn is_worker(&self) -> bool {
        self.roles.contains(NodeRole::Worker)
    }

    pub fn is_external_etcd(&self) -> bool {
        self.roles.contains(NodeRole::ExternalEtcd)
    }

    pub fn is_external_load_balancer(&self) -> bool {
        self.roles.contains(NodeRole::ExternalLoadBalancer)
    }

    /// Control-plane or worker.
    pub fn is_kubernetes(&self) -> bool {
        self.roles.is_kubernetes()
    }

    pub fn state(&self) -> &JoinState {
        &self.state
    }

    /// Whether automated workflows may act on this node.
    pub fn is_eligible(&self) -> bool {
        !self.state.is_held()
    }

    pub fn kubernetes_version(&self) -> Result<&KubeVersion> {
        self.kubernetes_version
            .as_ref()
            .ok_or_else(|| Error::UnknownVersion {
                node: self.name.clone(),
                component: "kubernetes",
            })
    }

    pub fn kubeadm_version(&self) -> Result<&KubeVersion> {
        self.kubeadm_version
            .as_ref()
            .ok_or_else(|| Error::UnknownVersion {
                node: self.name.clone(),
                component: "kubeadm",
            })
    }

    /// The node's address in the given IP family.
    pub fn address(&self, family: IpFamily) -> Result<&str> {
        let address = match family {
            IpFamily::Ipv4 => self.ipv4.as_deref(),
            IpFamily::Ipv6 => self.ipv6.as_deref(),
        };
        address.ok_or_else(|| Error::MissingAddress {
            node: self.name.clone(),
            family,
        })
    }

    pub fn agent(&self) -> &Arc<dyn NodeAgent> {
        &self.agent
    }

    pub(crate) fn set_state(&mut self, state: JoinState) {
        debug!(node = %self.name, from = %self.state, to = %state, "join state changed");
        self.state = state;
    }

    /// Runs a command on the node, attaching the node to any failure.
    pub(crate) fn exec(&self, command: &str, args: &[String]) -> Result<String> {
        debug!(node = %self.name, command, args = ?args, "exec");
        self.agent
            .exec(command, args)
            .map_err(|source| Error::Agent {
                node: self.name.clone(),
                operation: format!("{command} {}", args.join(" ")).trim_end().to_string(),
                source,
            })
    }

    pub(crate) fn copy_to(&self, local: &Path, remote: &str) -> Result<()> {
        debug!(node = %self.name, local = %local.display(), remote, "copy to node");
        self.agent
            .copy_to(local, remote)
            .map_err(|source| Error::Agent {
                node: self.name.clone(),
                operation: format!("copy {} to {remote}", local.display()),
                source,
            })
    }

    pub(crate) fn copy_from(&self, remote: &str, local: &Path) -> Result<()> {
        debug!(node = %self.name, remote, local = %local.display(), "copy from node");
        self.agent
            .copy_from(remote, local)
            .map_err(|source| Error::Agent {
                node: self.name.clone(),
                operation: format!("copy {remote} from node"),
                source,
            })
    }

    /// Creates a directory (and its parents) on the node.
    pub(crate) fn mkdir_all(&self, remote_dir: &str) -> Result<()> {
        self.exec("mkdir", &args(&["-p", remote_dir])).map(|_| ())
    }

    /// Writes `contents` to an absolute path on the node.
    pub(crate) fn write_file(&self, remote: &str, contents: &[u8]) -> Result<()> {
        if let Some(parent) = Path::new(remote).parent().and_then(Path::to_str) {
            if !parent.is_empty() && parent != "/" {
                self.mkdir_all(parent)?;
            }
        }

        let mut staged = tempfile::NamedTempFile::new().map_err(|e| Error::io(remote, e))?;
        let local = staged.path().to_path_buf();
        staged
            .write_all(contents)
            .map_err(|e| Error::io(&local, e))?;
        staged.flush().map_err(|e| Error::io(&local, e))?;

        self.copy_to(staged.path(), remote)
    }
}

/// Owned argument list from string literals.
pub(crate) fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
