//! The `kubeadm join` workflow.
//!
//! Secondary control planes join first, strictly one after another: each one
//! is added to the load balancer before the next starts. Workers follow.
//! The first failing node stops its role group and is left `Failed`; nodes
//! that already reached `Ready` stay joined.

mod config;
mod control_plane;
mod steps;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kindred_config::KindredConfig;
use kindred_types::{DiscoveryMode, NodeName};
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::node::{JoinState, NodeIndex};
use crate::pki::{KubeadmPki, PkiProvider};
use crate::readiness::ReadinessWaiter;
use crate::Result;

pub use config::{kubeadm_api_version, render_join_config};
pub use steps::{check_version_gates, kubeadm_join_args};

/// Options of one join run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOptions {
    /// Run the join as separate kubeadm phases.
    pub use_phases: bool,
    /// kubeadm distributes control-plane certificates via the certificate key.
    pub automatic_copy_certs: bool,
    pub discovery: DiscoveryMode,
    /// Manifest overlay directory staged on control planes.
    pub kustomize_dir: Option<PathBuf>,
    /// Patch directory staged on control planes.
    pub patches_dir: Option<PathBuf>,
    /// Readiness deadline per node; zero means don't wait.
    pub wait: Duration,
    pub poll_interval: Duration,
    /// kubeadm `--v` level.
    pub verbosity: u8,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self::from_config(&KindredConfig::default())
    }
}

impl JoinOptions {
    pub fn from_config(config: &KindredConfig) -> Self {
        let join = &config.join;
        Self {
            use_phases: join.use_phases,
            automatic_copy_certs: join.automatic_copy_certs,
            discovery: join.discovery,
            kustomize_dir: join.kustomize_dir.clone(),
            patches_dir: join.patches_dir.clone(),
            wait: join.wait(),
            poll_interval: join.poll_interval(),
            verbosity: join.verbosity,
        }
    }
}

/// Nodes handled by a join run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Control planes that reached `Ready`, in join order.
    pub control_planes: Vec<NodeName>,
    /// Workers that reached `Ready`, in join order.
    pub workers: Vec<NodeName>,
    /// Held nodes that were left alone.
    pub skipped: Vec<NodeName>,
}

/// Drives `kubeadm join` across a cluster.
#[derive(Debug, Clone)]
pub struct JoinOrchestrator {
    options: JoinOptions,
    pki: Arc<dyn PkiProvider>,
}

impl JoinOrchestrator {
    pub fn new(options: JoinOptions) -> Self {
        Self {
            options,
            pki: Arc::new(KubeadmPki),
        }
    }

    /// Replaces the certificate bundle used for manual certificate copy.
    pub fn with_pki(mut self, pki: Arc<dyn PkiProvider>) -> Self {
        self.pki = pki;
        self
    }

    pub fn options(&self) -> &JoinOptions {
        &self.options
    }

    /// Joins secondary control planes, then workers.
    pub fn join(&self, cluster: &mut Cluster) -> Result<JoinReport> {
        cluster.validate()?;
        let mut report = JoinReport::default();
        self.join_control_planes_into(cluster, &mut report)?;
        self.join_workers_into(cluster, &mut report)?;
        info!(
            cluster = %cluster.name(),
            control_planes = report.control_planes.len(),
            workers = report.workers.len(),
            skipped = report.skipped.len(),
            "join completed"
        );
        Ok(report)
    }

    /// Joins the eligible secondary control planes in name order.
    pub fn join_control_planes(&self, cluster: &mut Cluster) -> Result<JoinReport> {
        cluster.validate()?;
        let mut report = JoinReport::default();
        self.join_control_planes_into(cluster, &mut report)?;
        Ok(report)
    }

    /// Joins the eligible workers in name order.
    pub fn join_workers(&self, cluster: &mut Cluster) -> Result<JoinReport> {
        cluster.validate()?;
        let mut report = JoinReport::default();
        self.join_workers_into(cluster, &mut report)?;
        Ok(report)
    }

    fn join_control_planes_into(
        &self,
        cluster: &mut Cluster,
        report: &mut JoinReport,
    ) -> Result<()> {
        // Load balancer backends: the bootstrap control plane plus each joined one.
        let mut members: Vec<NodeIndex> = cluster.bootstrap_index().into_iter().collect();

        for index in cluster.secondary_control_plane_indices().to_vec() {
            let node = cluster.node(index);
            if !node.is_eligible() {
                info!(node = %node.name(), "skipping held control plane");
                report.skipped.push(node.name().clone());
                continue;
            }

            members.push(index);
            control_plane::join(self, cluster, index, &members)?;
            report.control_planes.push(cluster.node(index).name().clone());
        }
        Ok(())
    }

    fn join_workers_into(&self, cluster: &mut Cluster, report: &mut JoinReport) -> Result<()> {
        for index in cluster.worker_indices().to_vec() {
            let node = cluster.node(index);
            if !node.is_eligible() {
                info!(node = %node.name(), "skipping held worker");
                report.skipped.push(node.name().clone());
                continue;
            }

            worker::join(self, cluster, index)?;
            report.workers.push(cluster.node(index).name().clone());
        }
        Ok(())
    }

    fn waiter(&self) -> ReadinessWaiter {
        ReadinessWaiter::new(self.options.poll_interval)
    }
}

/// Runs one step against the cluster and records its outcome on the node:
/// `next` on success, `Failed` with the step's error otherwise.
fn advance<T>(
    cluster: &mut Cluster,
    index: NodeIndex,
    next: JoinState,
    step: impl FnOnce(&Cluster) -> Result<T>,
) -> Result<T> {
    match step(cluster) {
        Ok(value) => {
            cluster.set_state(index, next);
            Ok(value)
        }
        Err(err) => {
            warn!(node = %cluster.node(index).name(), error = %err, "join step failed");
            cluster.set_state(index, JoinState::Failed(Box::new(err.clone())));
            Err(err)
        }
    }
}
