//! In-memory node fleet.
//!
//! [`SimWorld`] holds a set of simulated nodes with their labels, files,
//! preloaded images and join status. [`SimAgent`] implements [`NodeAgent`]
//! against it, answering the commands the join workflow issues, and every
//! call is recorded so tests can assert exactly what reached each node.
//!
//! ```
//! use kindred_cluster::sim::{SimNode, SimProvider, SimWorld};
//! use kindred_cluster::Cluster;
//!
//! let world = SimWorld::new();
//! world.add_node(SimNode::control_plane("kind", "kind-control-plane").initialized());
//! world.add_node(SimNode::worker("kind", "kind-worker"));
//!
//! let cluster = Cluster::discover(&SimProvider::new(world.clone()), "kind").unwrap();
//! assert_eq!(cluster.workers().len(), 1);
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kindred_types::{KubeVersion, NodeRole};
use serde_json::json;

use crate::agent::{AgentError, NodeAgent, NodeMetadata, NodeProvider};
use crate::constants::{
    ADMIN_KUBECONFIG_PATH, CLUSTER_LABEL_KEY, HOLD_LABEL_KEY, KUBEADM_CONFIG_PATH, PKI_DIR,
    ROLE_LABEL_KEY,
};
use crate::pki::{KubeadmPki, PkiProvider};

/// Kubernetes and kubeadm version of simulated nodes unless overridden.
pub const DEFAULT_VERSION: &str = "v1.29.2";

/// Images `kubeadm config images list` reports for a version.
pub fn required_images(version: &KubeVersion) -> Vec<String> {
    let mut images: Vec<String> = [
        "kube-apiserver",
        "kube-controller-manager",
        "kube-scheduler",
        "kube-proxy",
    ]
    .iter()
    .map(|component| format!("registry.k8s.io/{component}:{version}"))
    .collect();
    images.extend([
        "registry.k8s.io/pause:3.9".to_string(),
        "registry.k8s.io/etcd:3.5.12-0".to_string(),
        "registry.k8s.io/coredns/coredns:v1.11.1".to_string(),
    ]);
    images
}

// ============================================================================
// Call log
// ============================================================================

/// One call made through a [`SimAgent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    Inspect,
    /// `command args...` joined by spaces.
    Exec(String),
    CopyTo { remote: String },
    CopyFrom { remote: String },
}

impl SimCall {
    /// Whether the call reached the node beyond reading its metadata.
    pub fn touches_node(&self) -> bool {
        !matches!(self, SimCall::Inspect)
    }
}

// ============================================================================
// Node builder
// ============================================================================

/// A simulated node, built before it is added to a [`SimWorld`].
#[derive(Debug, Clone)]
pub struct SimNode {
    name: String,
    labels: BTreeMap<String, String>,
    ipv4: Option<String>,
    ipv6: Option<String>,
    kubernetes_version: Option<KubeVersion>,
    kubeadm_version: Option<KubeVersion>,
    files: BTreeMap<String, Vec<u8>>,
    missing_images: Vec<String>,
    fail_on: Vec<String>,
    joined: bool,
    never_ready: bool,
}

impl SimNode {
    /// A node carrying only the cluster label.
    pub fn new(cluster: &str, name: &str) -> Self {
        let version = KubeVersion::parse(DEFAULT_VERSION).ok();
        Self {
            name: name.to_string(),
            labels: BTreeMap::from([(CLUSTER_LABEL_KEY.to_string(), cluster.to_string())]),
            ipv4: None,
            ipv6: None,
            kubernetes_version: version.clone(),
            kubeadm_version: version,
            files: BTreeMap::new(),
            missing_images: Vec::new(),
            fail_on: Vec::new(),
            joined: false,
            never_ready: false,
        }
    }

    pub fn with_role(cluster: &str, name: &str, role: NodeRole) -> Self {
        Self::new(cluster, name).label(ROLE_LABEL_KEY, role.label_value())
    }

    pub fn control_plane(cluster: &str, name: &str) -> Self {
        Self::with_role(cluster, name, NodeRole::ControlPlane)
    }

    pub fn worker(cluster: &str, name: &str) -> Self {
        Self::with_role(cluster, name, NodeRole::Worker)
    }

    pub fn load_balancer(cluster: &str, name: &str) -> Self {
        Self::with_role(cluster, name, NodeRole::ExternalLoadBalancer)
    }

    pub fn etcd(cluster: &str, name: &str) -> Self {
        Self::with_role(cluster, name, NodeRole::ExternalEtcd)
    }

    #[must_use]
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn held(self) -> Self {
        self.label(HOLD_LABEL_KEY, "true")
    }

    #[must_use]
    pub fn ipv4(mut self, address: &str) -> Self {
        self.ipv4 = Some(address.to_string());
        self
    }

    #[must_use]
    pub fn ipv6(mut self, address: &str) -> Self {
        self.ipv6 = Some(address.to_string());
        self
    }

    /// Sets both the Kubernetes and the kubeadm version.
    ///
    /// An unparsable version is reported as unknown.
    #[must_use]
    pub fn versions(mut self, version: &str) -> Self {
        self.kubernetes_version = KubeVersion::parse(version).ok();
        self.kubeadm_version = self.kubernetes_version.clone();
        self
    }

    #[must_use]
    pub fn kubeadm_version(mut self, version: &str) -> Self {
        self.kubeadm_version = KubeVersion::parse(version).ok();
        self
    }

    #[must_use]
    pub fn without_versions(mut self) -> Self {
        self.kubernetes_version = None;
        self.kubeadm_version = None;
        self
    }

    /// Removes preloaded images whose reference contains `pattern`.
    #[must_use]
    pub fn missing_image(mut self, pattern: &str) -> Self {
        self.missing_images.push(pattern.to_string());
        self
    }

    /// Fails every call whose command line starts with `pattern`.
    ///
    /// Copies are matched as `copy-to <remote>` and `copy-from <remote>`,
    /// metadata reads as `inspect`.
    #[must_use]
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.fail_on.push(pattern.to_string());
        self
    }

    /// A control plane where `kubeadm init` already ran: it holds the
    /// cluster PKI and admin kubeconfig and reports Ready.
    #[must_use]
    pub fn initialized(mut self) -> Self {
        let bundles = KubeadmPki.shared_files(true).into_iter();
        for file in bundles.chain(KubeadmPki.shared_files(false)) {
            let path = format!("{PKI_DIR}/{file}");
            let contents = format!("pem of {file}").into_bytes();
            self.files.insert(path, contents);
        }
        self.files.insert(
            ADMIN_KUBECONFIG_PATH.to_string(),
            format!("kubeconfig of {}", self.name).into_bytes(),
        );
        self.joined = true;
        self
    }

    /// Joins successfully but never reports Ready.
    #[must_use]
    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    fn cluster(&self) -> Option<&str> {
        self.labels.get(CLUSTER_LABEL_KEY).map(String::as_str)
    }

    fn images(&self) -> Vec<String> {
        let Some(version) = &self.kubernetes_version else {
            return Vec::new();
        };
        required_images(version)
            .into_iter()
            .filter(|image| !self.missing_images.iter().any(|m| image.contains(m.as_str())))
            .collect()
    }

    fn is_ready(&self) -> bool {
        self.joined && !self.never_ready
    }
}

// ============================================================================
// World
// ============================================================================

#[derive(Debug, Default)]
struct WorldState {
    nodes: Vec<SimNode>,
    calls: Vec<(String, SimCall)>,
}

impl WorldState {
    fn node(&self, name: &str) -> Result<&SimNode, AgentError> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| AgentError::new(format!("no such container: {name}")))
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut SimNode, AgentError> {
        self.nodes
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or_else(|| AgentError::new(format!("no such container: {name}")))
    }

    /// Logs a call and applies injected failures.
    fn record(&mut self, name: &str, call: SimCall, line: &str) -> Result<(), AgentError> {
        self.calls.push((name.to_string(), call));
        let node = self.node(name)?;
        if node.fail_on.iter().any(|p| line.starts_with(p.as_str())) {
            return Err(AgentError::new(format!("injected failure: {line}")));
        }
        Ok(())
    }
}

/// Shared state of the simulated fleet.
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    state: Arc<Mutex<WorldState>>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a node; nodes without an IPv4 address get one by position.
    pub fn add_node(&self, mut node: SimNode) {
        let mut state = self.lock();
        if node.ipv4.is_none() {
            node.ipv4 = Some(format!("172.18.0.{}", state.nodes.len() + 2));
        }
        state.nodes.push(node);
    }

    /// An agent for the named node; operations fail if it doesn't exist.
    pub fn agent(&self, name: &str) -> Arc<dyn NodeAgent> {
        Arc::new(SimAgent {
            name: name.to_string(),
            world: self.clone(),
        })
    }

    pub fn file(&self, node: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.lock();
        state.node(node).ok()?.files.get(path).cloned()
    }

    /// Places a file on a node, creating or replacing it.
    pub fn put_file(&self, node: &str, path: &str, contents: &[u8]) {
        if let Ok(n) = self.lock().node_mut(node) {
            n.files.insert(path.to_string(), contents.to_vec());
        }
    }

    /// Every call across the fleet, in order, with the node it went to.
    pub fn history(&self) -> Vec<(String, SimCall)> {
        self.lock().calls.clone()
    }

    /// Every call made to the node, in order.
    pub fn calls(&self, node: &str) -> Vec<SimCall> {
        self.lock()
            .calls
            .iter()
            .filter(|(n, _)| n == node)
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Exec and copy calls made to the node, in order.
    pub fn node_calls(&self, node: &str) -> Vec<SimCall> {
        self.calls(node)
            .into_iter()
            .filter(SimCall::touches_node)
            .collect()
    }

    /// Command lines executed on the node, in order.
    pub fn command_lines(&self, node: &str) -> Vec<String> {
        self.calls(node)
            .into_iter()
            .filter_map(|call| match call {
                SimCall::Exec(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    /// Whether the node reports Ready to the API server.
    pub fn is_ready(&self, node: &str) -> bool {
        self.lock().node(node).is_ok_and(SimNode::is_ready)
    }

    fn exec(&self, name: &str, command: &str, args: &[String]) -> Result<String, AgentError> {
        let line = std::iter::once(command)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        let mut state = self.lock();
        state.record(name, SimCall::Exec(line.clone()), &line)?;

        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        match command {
            "cat" => {
                let path = argv.first().copied().unwrap_or_default();
                let node = state.node(name)?;
                node.files
                    .get(path)
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .ok_or_else(|| {
                        AgentError::new(format!("cat: {path}: No such file or directory"))
                    })
            }
            "mkdir" | "kill" => Ok(String::new()),
            "kubeadm" => kubeadm(&mut state, name, &argv),
            "kubectl" => kubectl(&state, name, &argv),
            "crictl" => crictl(&state, name, &argv),
            other => Err(AgentError::new(format!("{other}: command not found"))),
        }
    }
}

fn kubeadm(state: &mut WorldState, name: &str, argv: &[&str]) -> Result<String, AgentError> {
    match argv {
        ["version", ..] => {
            let node = state.node(name)?;
            node.kubeadm_version
                .as_ref()
                .map(|v| format!("{v}\n"))
                .ok_or_else(|| AgentError::new("kubeadm: unknown version"))
        }
        ["config", "images", "list", rest @ ..] => {
            let version = rest
                .windows(2)
                .find(|w| w[0] == "--kubernetes-version")
                .map(|w| w[1])
                .ok_or_else(|| AgentError::new("kubeadm: missing --kubernetes-version"))?;
            let version = KubeVersion::parse(version).map_err(|e| AgentError::new(e.to_string()))?;
            Ok(required_images(&version).join("\n") + "\n")
        }
        ["join", rest @ ..] => {
            let node = state.node_mut(name)?;
            let config = node
                .files
                .get(KUBEADM_CONFIG_PATH)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .ok_or_else(|| {
                    AgentError::new(format!(
                        "open {KUBEADM_CONFIG_PATH}: no such file or directory"
                    ))
                })?;

            let phase = match rest {
                ["phase", phase, ..] => Some(*phase),
                _ => None,
            };

            let prepares_control_plane = matches!(phase, None | Some("control-plane-prepare"))
                && config.contains("\"controlPlane\"");
            if prepares_control_plane
                && !config.contains("certificateKey")
                && !node.files.contains_key(&format!("{PKI_DIR}/ca.crt"))
            {
                return Err(AgentError::new(format!(
                    "failure loading certificate for CA: {PKI_DIR}/ca.crt: \
                     no such file or directory"
                )));
            }

            if matches!(phase, None | Some("kubelet-start")) {
                node.joined = true;
            }
            Ok(String::new())
        }
        _ => Err(AgentError::new(format!("kubeadm: unknown command {argv:?}"))),
    }
}

fn kubectl(state: &WorldState, name: &str, argv: &[&str]) -> Result<String, AgentError> {
    let via = state.node(name)?;
    if !via.files.contains_key(ADMIN_KUBECONFIG_PATH) {
        return Err(AgentError::new("the connection to the server was refused"));
    }
    let cluster = via.cluster();
    let status = |n: &SimNode| if n.is_ready() { "True" } else { "False" };

    match argv {
        [_, "get", "nodes", target, ..] if !target.starts_with('-') => {
            let node = state
                .nodes
                .iter()
                .find(|n| n.name == *target && n.cluster() == cluster && n.joined)
                .ok_or_else(|| AgentError::new(format!("nodes {target:?} not found")))?;
            Ok(status(node).to_string())
        }
        [_, "get", "nodes", ..] => Ok(state
            .nodes
            .iter()
            .filter(|n| n.cluster() == cluster && n.joined)
            .map(|n| format!("{} {}\n", n.name, status(n)))
            .collect()),
        _ => Err(AgentError::new(format!("kubectl: unknown command {argv:?}"))),
    }
}

fn crictl(state: &WorldState, name: &str, argv: &[&str]) -> Result<String, AgentError> {
    match argv {
        ["images", "-o", "json"] => {
            let node = state.node(name)?;
            let images: Vec<_> = node
                .images()
                .into_iter()
                .enumerate()
                .map(|(i, tag)| json!({ "id": format!("sha256:{i:064x}"), "repoTags": [tag] }))
                .collect();
            Ok(json!({ "images": images }).to_string())
        }
        _ => Err(AgentError::new(format!("crictl: unknown command {argv:?}"))),
    }
}

// ============================================================================
// Agent and provider
// ============================================================================

/// A [`NodeAgent`] backed by a [`SimWorld`] node.
#[derive(Debug, Clone)]
pub struct SimAgent {
    name: String,
    world: SimWorld,
}

impl NodeAgent for SimAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn exec(&self, command: &str, args: &[String]) -> Result<String, AgentError> {
        self.world.exec(&self.name, command, args)
    }

    fn inspect(&self) -> Result<NodeMetadata, AgentError> {
        let mut state = self.world.lock();
        state.record(&self.name, SimCall::Inspect, "inspect")?;
        let node = state.node(&self.name)?;
        Ok(NodeMetadata {
            labels: node.labels.clone(),
            ipv4: node.ipv4.clone(),
            ipv6: node.ipv6.clone(),
            kubernetes_version: node.kubernetes_version.clone(),
            kubeadm_version: node.kubeadm_version.clone(),
        })
    }

    fn copy_to(&self, local: &Path, remote: &str) -> Result<(), AgentError> {
        let mut state = self.world.lock();
        state.record(
            &self.name,
            SimCall::CopyTo {
                remote: remote.to_string(),
            },
            &format!("copy-to {remote}"),
        )?;
        let contents = fs::read(local)
            .map_err(|e| AgentError::new(format!("reading {}: {e}", local.display())))?;
        state
            .node_mut(&self.name)?
            .files
            .insert(remote.to_string(), contents);
        Ok(())
    }

    fn copy_from(&self, remote: &str, local: &Path) -> Result<(), AgentError> {
        let mut state = self.world.lock();
        state.record(
            &self.name,
            SimCall::CopyFrom {
                remote: remote.to_string(),
            },
            &format!("copy-from {remote}"),
        )?;
        let node = state.node(&self.name)?;
        let contents = node
            .files
            .get(remote)
            .ok_or_else(|| AgentError::new(format!("{remote}: no such file or directory")))?;
        fs::write(local, contents)
            .map_err(|e| AgentError::new(format!("writing {}: {e}", local.display())))
    }
}

/// A [`NodeProvider`] over every node of a [`SimWorld`], in insertion order.
#[derive(Debug, Clone)]
pub struct SimProvider {
    world: SimWorld,
}

impl SimProvider {
    pub fn new(world: SimWorld) -> Self {
        Self { world }
    }
}

impl NodeProvider for SimProvider {
    fn list_clusters(&self) -> Result<Vec<String>, AgentError> {
        Ok(self
            .world
            .lock()
            .nodes
            .iter()
            .filter_map(|n| n.cluster().map(String::from))
            .collect())
    }

    fn list_nodes(&self, cluster: &str) -> Result<Vec<Arc<dyn NodeAgent>>, AgentError> {
        let names: Vec<String> = self
            .world
            .lock()
            .nodes
            .iter()
            .filter(|n| n.cluster() == Some(cluster))
            .map(|n| n.name.clone())
            .collect();
        Ok(names.iter().map(|n| self.world.agent(n)).collect())
    }
}
