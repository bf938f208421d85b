//! Multi-node test cluster management for kindred.
//!
//! Works on clusters whose nodes already exist and whose first control plane
//! already ran `kubeadm init`:
//! - Node discovery and role classification ([`Cluster::discover`])
//! - Node selectors such as `@cp1` or `@w*` ([`Selector`])
//! - Cluster settings persisted on the nodes
//! - The `kubeadm join` workflow for control planes and workers
//!   ([`JoinOrchestrator`]), with load balancer reconfiguration and
//!   readiness waits
//!
//! Nodes are reached only through a [`NodeAgent`]; [`sim`] provides an
//! in-memory fleet.

pub mod agent;
pub mod cluster;
pub mod constants;
pub mod error;
pub mod images;
pub mod join;
pub mod loadbalancer;
pub mod node;
pub mod pki;
pub mod readiness;
pub mod selector;
pub mod settings;
pub mod sim;

pub use agent::{AgentError, NodeAgent, NodeMetadata, NodeProvider};
pub use cluster::{is_known, list_clusters, Cluster};
pub use error::{Error, Result};
pub use join::{JoinOptions, JoinOrchestrator, JoinReport};
pub use loadbalancer::{LoadBalancerConfig, LoadBalancerReconfigurer, LoadBalancerUpdate};
pub use node::{JoinState, Node, NodeIndex};
pub use pki::{KubeadmPki, PkiProvider};
pub use readiness::{ClusterReadyProbe, NodeReadyProbe, Readiness, ReadinessProbe, ReadinessWaiter};
pub use selector::Selector;
pub use settings::ClusterSettings;

use kindred_config::KindredConfig;
use tracing::info;

/// Discovers the configured cluster, loads its settings and joins every
/// eligible node with the configured defaults.
pub fn join_cluster(
    provider: &dyn NodeProvider,
    config: &KindredConfig,
) -> Result<(Cluster, JoinReport)> {
    let mut cluster = Cluster::discover(provider, &config.cluster.name)?;
    cluster.validate()?;
    cluster.read_settings()?;

    info!(cluster = %cluster.name(), ip_family = %cluster.settings.ip_family, "joining nodes");
    let report = JoinOrchestrator::new(JoinOptions::from_config(config)).join(&mut cluster)?;
    Ok((cluster, report))
}

#[cfg(test)]
mod tests {
    use kindred_types::NodeName;

    use super::*;
    use crate::constants::CLUSTER_SETTINGS_PATH;
    use crate::sim::{SimNode, SimProvider, SimWorld};

    #[test]
    fn join_cluster_uses_configured_name_and_settings() {
        let world = SimWorld::new();
        world.add_node(SimNode::control_plane("dev", "dev-control-plane").initialized());
        world.add_node(SimNode::worker("dev", "dev-worker"));
        world.put_file("dev-control-plane", CLUSTER_SETTINGS_PATH, br#"{"ipFamily":"ipv4"}"#);

        let mut config = KindredConfig::default();
        config.cluster.name = "dev".to_string();
        config.join.wait_seconds = 5;
        config.join.poll_interval_ms = 1;

        let (cluster, report) = join_cluster(&SimProvider::new(world.clone()), &config).unwrap();
        assert_eq!(report.workers, vec![NodeName::from("dev-worker")]);
        assert!(cluster.workers()[0].state().is_ready());
        assert!(world.is_ready("dev-worker"));
    }

    #[test]
    fn join_cluster_requires_settings_on_bootstrap() {
        let world = SimWorld::new();
        world.add_node(SimNode::control_plane("kind", "kind-control-plane").initialized());
        world.add_node(SimNode::worker("kind", "kind-worker"));

        let err =
            join_cluster(&SimProvider::new(world.clone()), &KindredConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Settings { .. }));
        assert!(world.node_calls("kind-worker").is_empty());
    }
}
