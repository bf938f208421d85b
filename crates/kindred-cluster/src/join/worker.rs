//! Joining a worker.

use kindred_types::JoinPhase;
use tracing::info;

use super::config::write_join_config;
use super::steps::{kubeadm_join_args, run_kubeadm};
use super::{advance, JoinOrchestrator};
use crate::cluster::Cluster;
use crate::images::check_images;
use crate::node::{JoinState, NodeIndex};
use crate::readiness::NodeReadyProbe;
use crate::{Error, Result};

/// Joins the worker at `index` and waits for it to be ready.
///
/// Workers get no overlays, patches, certificates or load balancer changes.
pub(super) fn join(
    orchestrator: &JoinOrchestrator,
    cluster: &mut Cluster,
    index: NodeIndex,
) -> Result<()> {
    let options = &orchestrator.options;
    info!(node = %cluster.node(index).name(), phases = options.use_phases, "joining worker");

    advance(cluster, index, JoinState::ConfigRendered, |c| {
        let node = c.node(index);
        check_images(node)?;
        write_join_config(c, node, options)
    })?;

    if options.use_phases {
        for phase in JoinPhase::WORKER {
            advance(cluster, index, JoinState::Joining { phase: Some(phase) }, |c| {
                run_kubeadm(c.node(index), &kubeadm_join_args(Some(phase), options, None))
            })?;
        }
    } else {
        advance(cluster, index, JoinState::Joining { phase: None }, |c| {
            run_kubeadm(c.node(index), &kubeadm_join_args(None, options, None))
        })?;
    }

    advance(cluster, index, JoinState::Ready, |c| {
        let via = c
            .bootstrap_control_plane()
            .ok_or_else(|| Error::InvariantViolation("no bootstrap control plane".to_string()))?;
        let probe = NodeReadyProbe::new(via, c.node(index).name().clone());
        orchestrator.waiter().wait(&probe, options.wait)?;
        Ok(())
    })
}
