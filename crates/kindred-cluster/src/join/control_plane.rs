//! Joining a secondary control plane.

use kindred_types::JoinPhase;
use tracing::info;

use super::config::write_join_config;
use super::steps::{check_version_gates, kubeadm_join_args, run_kubeadm, stage_directory};
use super::{advance, JoinOrchestrator};
use crate::cluster::Cluster;
use crate::images::check_images;
use crate::loadbalancer::{LoadBalancerConfig, LoadBalancerReconfigurer};
use crate::node::{JoinState, NodeIndex};
use crate::pki::copy_certificates;
use crate::readiness::NodeReadyProbe;
use crate::{Error, Result};

/// Joins the control plane at `index`, then points the load balancer at
/// `members` (which include it) and waits for it to be ready.
pub(super) fn join(
    orchestrator: &JoinOrchestrator,
    cluster: &mut Cluster,
    index: NodeIndex,
    members: &[NodeIndex],
) -> Result<()> {
    let options = &orchestrator.options;
    info!(node = %cluster.node(index).name(), phases = options.use_phases, "joining control plane");

    advance(cluster, index, JoinState::ArtifactsStaged, |c| {
        let node = c.node(index);
        check_version_gates(node, options)?;
        for dir in [&options.kustomize_dir, &options.patches_dir].into_iter().flatten() {
            stage_directory(node, dir)?;
        }
        Ok(())
    })?;

    advance(cluster, index, JoinState::CertsProvisioned, |c| {
        if options.automatic_copy_certs {
            return Ok(());
        }
        let bootstrap = c
            .bootstrap_control_plane()
            .ok_or_else(|| Error::InvariantViolation("no bootstrap control plane".to_string()))?;
        copy_certificates(
            orchestrator.pki.as_ref(),
            c.external_etcd().is_some(),
            bootstrap,
            c.node(index),
        )
    })?;

    advance(cluster, index, JoinState::ConfigRendered, |c| {
        let node = c.node(index);
        check_images(node)?;
        write_join_config(c, node, options)
    })?;

    if options.use_phases {
        for phase in JoinPhase::CONTROL_PLANE {
            advance(cluster, index, JoinState::Joining { phase: Some(phase) }, |c| {
                let node = c.node(index);
                let args = kubeadm_join_args(Some(phase), options, Some(node.kubeadm_version()?));
                run_kubeadm(node, &args)
            })?;
        }
    } else {
        advance(cluster, index, JoinState::Joining { phase: None }, |c| {
            let node = c.node(index);
            let args = kubeadm_join_args(None, options, Some(node.kubeadm_version()?));
            run_kubeadm(node, &args)
        })?;
    }

    if let Some(lb_index) = cluster.external_load_balancer_index() {
        advance(cluster, index, JoinState::LoadBalancerUpdated, |c| {
            let config = LoadBalancerConfig::from_nodes(
                c.settings.ip_family,
                members.iter().map(|i| c.node(*i)),
            )?;
            LoadBalancerReconfigurer::new(c.node(lb_index)).apply(&config)?;
            Ok(())
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
